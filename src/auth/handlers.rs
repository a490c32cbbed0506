use askama::Template;
use axum::extract::State;
use axum::http::header;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use rusqlite::{Connection, ErrorCode};
use serde::Deserialize;

use crate::auth::password;
use crate::db::models::User;
use crate::db::RequestDb;
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template, Default)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub nav_user: Option<String>,
    pub error: Option<String>,
    pub username: String,
}

#[derive(Template, Default)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub nav_user: Option<String>,
    pub error: Option<String>,
    pub username: String,
    pub email: String,
}

// -- Forms --

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub conf_password: String,
}

// -- Validation --

/// First failing registration check, in the order fields, username,
/// email, password confirmation.
pub fn registration_error(conn: &Connection, form: &RegisterForm) -> AppResult<Option<String>> {
    if form.username.is_empty()
        || form.email.is_empty()
        || form.password.is_empty()
        || form.conf_password.is_empty()
    {
        return Ok(Some("All fields are required".into()));
    }
    if User::username_taken(conn, &form.username)? {
        return Ok(Some(format!(
            "The username '{}' is already in use",
            form.username
        )));
    }
    if User::email_taken(conn, &form.email)? {
        return Ok(Some(format!("The email '{}' is already in use", form.email)));
    }
    if form.password != form.conf_password {
        return Ok(Some("Your passwords do not match".into()));
    }
    Ok(None)
}

// -- Register handlers --

/// GET /auth/register
pub async fn register_page(maybe_user: MaybeUser) -> Html<RegisterTemplate> {
    Html(RegisterTemplate {
        nav_user: maybe_user.username(),
        ..Default::default()
    })
}

/// POST /auth/register — create the account, then send the user to log in
pub async fn register(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    db: RequestDb,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    if let Some(error) = db.with(|conn| registration_error(conn, &form))? {
        return Ok(register_failed(&maybe_user, form, error));
    }

    let hashed = password::hash(form.password.clone(), state.config.auth.bcrypt_cost).await?;

    // Another request may have taken the username or email while we hashed.
    let created = db.with(|conn| create_user(conn, &form, &hashed))?;
    let user_id = match created {
        Ok(id) => id,
        Err(error) => return Ok(register_failed(&maybe_user, form, error)),
    };
    tracing::info!("Registered user '{}' ({})", form.username, user_id);

    Ok(Redirect::to("/auth/login").into_response())
}

/// Insert the account. A UNIQUE violation is turned back into the
/// registration message it corresponds to.
fn create_user(
    conn: &Connection,
    form: &RegisterForm,
    hashed: &str,
) -> AppResult<Result<i64, String>> {
    match User::create(conn, &form.username, &form.email, hashed) {
        Ok(id) => Ok(Ok(id)),
        Err(e) if is_constraint_violation(&e) => match registration_error(conn, form)? {
            Some(error) => Ok(Err(error)),
            None => Err(e.into()),
        },
        Err(e) => Err(e.into()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn register_failed(maybe_user: &MaybeUser, form: RegisterForm, error: String) -> Response {
    tracing::info!("Registration rejected for '{}': {}", form.username, error);
    Html(RegisterTemplate {
        nav_user: maybe_user.username(),
        error: Some(error),
        username: form.username,
        email: form.email,
    })
    .into_response()
}

// -- Login handlers --

/// GET /auth/login
pub async fn login_page(maybe_user: MaybeUser) -> Html<LoginTemplate> {
    Html(LoginTemplate {
        nav_user: maybe_user.username(),
        ..Default::default()
    })
}

/// POST /auth/login — check credentials and bind the session
pub async fn login(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    db: RequestDb,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let user = db.with(|conn| Ok(User::find_by_username(conn, &form.username)?))?;

    let Some(user) = user else {
        return Ok(login_failed(&maybe_user, form.username, "That user does not exist"));
    };
    if !password::verify(form.password, user.password.clone()).await? {
        return Ok(login_failed(&maybe_user, form.username, "Your password is incorrect"));
    }

    // A fresh cookie replaces whatever session the client held before.
    let cookie = state.sessions.session_cookie(user.id)?;
    tracing::info!("User '{}' logged in", user.username);

    Ok((
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Redirect::to("/"),
    )
        .into_response())
}

fn login_failed(maybe_user: &MaybeUser, username: String, error: &str) -> Response {
    tracing::warn!("Failed login for '{}': {}", username, error);
    Html(LoginTemplate {
        nav_user: maybe_user.username(),
        error: Some(error.to_string()),
        username,
    })
    .into_response()
}

// -- Logout handler --

/// GET /auth/logout — clear the session unconditionally
pub async fn logout(State(state): State<AppState>, maybe_user: MaybeUser) -> Response {
    if let Some(user) = maybe_user.0 {
        tracing::info!("User '{}' logged out", user.username);
    }

    (
        AppendHeaders([(header::SET_COOKIE, state.sessions.clear_cookie())]),
        Redirect::to("/"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn_with_alice() -> (tempfile::TempDir, Connection) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("auth.sqlite");
        crate::db::init(&path).unwrap();
        let conn = crate::db::open_connection(&path).unwrap();
        User::create(&conn, "alice", "a@x.com", "hash").unwrap();
        (tmp, conn)
    }

    fn form(username: &str, email: &str, password: &str, conf: &str) -> RegisterForm {
        RegisterForm {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            conf_password: conf.into(),
        }
    }

    #[test]
    fn valid_registration_passes() {
        let (_tmp, conn) = conn_with_alice();
        let err = registration_error(&conn, &form("bob", "b@x.com", "pw", "pw")).unwrap();
        assert_eq!(err, None);
    }

    #[test]
    fn empty_field_wins_over_everything_else() {
        let (_tmp, conn) = conn_with_alice();
        let err = registration_error(&conn, &form("alice", "a@x.com", "pw", "")).unwrap();
        assert_eq!(err.as_deref(), Some("All fields are required"));
    }

    #[test]
    fn duplicate_username_checked_before_email() {
        let (_tmp, conn) = conn_with_alice();
        let err = registration_error(&conn, &form("alice", "a@x.com", "pw", "pw")).unwrap();
        assert_eq!(
            err.as_deref(),
            Some("The username 'alice' is already in use")
        );
    }

    #[test]
    fn duplicate_email_checked_before_password_match() {
        let (_tmp, conn) = conn_with_alice();
        let err = registration_error(&conn, &form("bob", "a@x.com", "pw", "other")).unwrap();
        assert_eq!(err.as_deref(), Some("The email 'a@x.com' is already in use"));
    }

    #[test]
    fn password_mismatch() {
        let (_tmp, conn) = conn_with_alice();
        let err = registration_error(&conn, &form("bob", "b@x.com", "pw", "other")).unwrap();
        assert_eq!(err.as_deref(), Some("Your passwords do not match"));
    }

    #[test]
    fn create_user_reports_a_lost_race_as_a_message() {
        let (_tmp, conn) = conn_with_alice();

        let taken = create_user(&conn, &form("alice", "other@x.com", "pw", "pw"), "hash").unwrap();
        assert_eq!(
            taken,
            Err("The username 'alice' is already in use".to_string())
        );

        let taken = create_user(&conn, &form("bob", "a@x.com", "pw", "pw"), "hash").unwrap();
        assert_eq!(taken, Err("The email 'a@x.com' is already in use".to_string()));

        let created = create_user(&conn, &form("bob", "b@x.com", "pw", "pw"), "hash").unwrap();
        assert!(created.is_ok());
    }
}
