use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::db::models::User;
use crate::db::RequestDb;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::state::AppState;

/// Runs before every handler: turns the session cookie into a
/// [`MaybeUser`] extension. Must sit inside [`crate::db::connection_scope`].
pub async fn resolve_current_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match load_user(&state, &request) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    request.extensions_mut().insert(MaybeUser(user));
    next.run(request).await
}

fn load_user(state: &AppState, request: &Request) -> AppResult<Option<CurrentUser>> {
    let Some(user_id) = state.sessions.read(request.headers()) else {
        return Ok(None);
    };

    let db = request
        .extensions()
        .get::<RequestDb>()
        .ok_or_else(|| AppError::Internal("Missing connection scope".into()))?;

    let user = db.with(|conn| Ok(User::find_by_id(conn, user_id)?))?;
    if user.is_none() {
        tracing::debug!("Session references unknown user {}", user_id);
    }

    Ok(user.map(|u| CurrentUser {
        id: u.id,
        username: u.username,
    }))
}

/// Gate for routes that need a logged-in user: anonymous requests are
/// redirected to the login form instead of reaching the handler.
pub async fn require_login(request: Request, next: Next) -> Response {
    let logged_in = request
        .extensions()
        .get::<MaybeUser>()
        .is_some_and(|m| m.0.is_some());

    if !logged_in {
        return AppError::LoginRequired.into_response();
    }
    next.run(request).await
}
