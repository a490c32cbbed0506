use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::db::RequestDb;
use crate::error::AppError;

/// The user bound to the current request by the session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
}

/// Result of current-user resolution, stored in the request extensions
/// before any handler runs.
#[derive(Debug, Clone, Default)]
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    pub fn username(&self) -> Option<String> {
        self.0.as_ref().map(|u| u.username.clone())
    }
}

/// Optional user extractor. Resolves to `MaybeUser(None)` when the
/// resolution middleware did not run or found nobody.
impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<MaybeUser>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Extractor that requires a logged-in user and redirects to the login
/// form otherwise.
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.ok_or(AppError::LoginRequired)
    }
}

/// Hands the request's connection to a handler.
impl<S: Send + Sync> FromRequestParts<S> for RequestDb {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestDb>()
            .cloned()
            .ok_or_else(|| AppError::Internal("Missing connection scope".into()))
    }
}
