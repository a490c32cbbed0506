use askama::Template;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::db::models::{User, UserSummary};
use crate::db::RequestDb;
use crate::error::AppResult;
use crate::extractors::CurrentUser;

#[derive(Template)]
#[template(path = "posts/index.html")]
pub struct IndexTemplate {
    pub nav_user: Option<String>,
    pub users: Vec<UserSummary>,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET / — every registered user, linking to their profile
pub async fn index(user: CurrentUser, db: RequestDb) -> AppResult<Html<IndexTemplate>> {
    let users = db.with(|conn| Ok(User::list(conn)?))?;

    Ok(Html(IndexTemplate {
        nav_user: Some(user.username),
        users,
    }))
}
