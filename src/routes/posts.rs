use askama::Template;
use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use chrono::{NaiveDateTime, Utc};

use crate::db::models::Post;
use crate::db::RequestDb;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::assets::file_response;
use crate::routes::home::Html;
use crate::state::AppState;
use crate::storage::UploadStore;

pub const CAPTION_REQUIRED: &str = "A caption is required.";
pub const IMAGE_REQUIRED: &str = "An image is required.";
pub const UNSUPPORTED_TYPE: &str = "Only JPG and PNG are accepted.";

// --- View structs ---

pub struct PostCard {
    pub img_path: String,
    pub caption: String,
    pub created_at: String,
}

impl From<Post> for PostCard {
    fn from(post: Post) -> Self {
        PostCard {
            created_at: parse_and_format_time(&post.created),
            img_path: post.img_path,
            caption: post.caption,
        }
    }
}

// --- Templates ---

#[derive(Template, Default)]
#[template(path = "posts/upload.html")]
pub struct UploadTemplate {
    pub nav_user: Option<String>,
    pub error: Option<String>,
    pub caption: String,
}

#[derive(Template)]
#[template(path = "posts/user.html")]
pub struct UserTemplate {
    pub nav_user: Option<String>,
    pub username: String,
    pub posts: Vec<PostCard>,
}

// --- Router ---

/// Routes that need a logged-in user; the caller adds the gate.
pub fn gated_router() -> Router<AppState> {
    Router::new()
        .route("/upload", get(upload_page).post(upload))
        .route("/user/{username}", get(user_profile))
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/uploads/{filename}", get(uploaded_file))
}

// --- Validation ---

/// Checks an upload in order (caption, presence, extension); when several
/// fail, the last one is reported. Returns the extension to store under.
pub fn validate_upload(
    uploads: &UploadStore,
    caption: &str,
    filename: Option<&str>,
) -> Result<String, &'static str> {
    let mut error = None;

    if caption.is_empty() {
        error = Some(CAPTION_REQUIRED);
    }

    let filename = filename.filter(|name| !name.is_empty());
    if filename.is_none() {
        error = Some(IMAGE_REQUIRED);
    }

    let ext = filename.and_then(|name| uploads.allowed_extension(name));
    if filename.is_some() && ext.is_none() {
        error = Some(UNSUPPORTED_TYPE);
    }

    match (error, ext) {
        (None, Some(ext)) => Ok(ext),
        (Some(error), _) => Err(error),
        (None, None) => Err(IMAGE_REQUIRED),
    }
}

// --- Handlers ---

async fn upload_page(user: CurrentUser) -> Html<UploadTemplate> {
    Html(UploadTemplate {
        nav_user: Some(user.username),
        ..Default::default()
    })
}

async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    db: RequestDb,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut caption = String::new();
    let mut image: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("caption") => caption = field.text().await?,
            Some("img") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                image = Some((filename, field.bytes().await?));
            }
            _ => {}
        }
    }

    let filename = image.as_ref().map(|(name, _)| name.as_str());
    let ext = match validate_upload(&state.uploads, &caption, filename) {
        Ok(ext) => ext,
        Err(error) => {
            tracing::info!("Upload by '{}' rejected: {}", user.username, error);
            return Ok(Html(UploadTemplate {
                nav_user: Some(user.username),
                error: Some(error.to_string()),
                caption,
            })
            .into_response());
        }
    };

    let bytes = image.map(|(_, bytes)| bytes).unwrap_or_default();
    let stored = state.uploads.save(user.id, &ext, &bytes).await?;
    let post_id = match db.with(|conn| Ok(Post::create(conn, user.id, &stored, &caption)?)) {
        Ok(id) => id,
        Err(e) => {
            state.uploads.remove(&stored).await;
            return Err(e);
        }
    };
    tracing::info!(
        "User '{}' uploaded post {} as {} ({} bytes)",
        user.username,
        post_id,
        stored,
        bytes.len()
    );

    Ok(Redirect::to("/").into_response())
}

async fn user_profile(
    user: CurrentUser,
    db: RequestDb,
    Path(username): Path<String>,
) -> AppResult<Html<UserTemplate>> {
    let posts = db.with(|conn| Ok(Post::by_username(conn, &username)?))?;

    Ok(Html(UserTemplate {
        nav_user: Some(user.username),
        username,
        posts: posts.into_iter().map(PostCard::from).collect(),
    }))
}

async fn uploaded_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    let path = state.uploads.resolve(&filename).ok_or(AppError::NotFound)?;

    match tokio::fs::read(&path).await {
        Ok(body) => Ok(file_response(&filename, body, "public, max-age=31536000, immutable")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound),
        Err(e) => Err(e.into()),
    }
}

// --- Time formatting ---

fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, "%Y-%m-%d %H:%M:%S")
        .map(|dt| format_relative_time(&dt))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime) -> String {
    let diff = Utc::now().naive_utc().signed_duration_since(*dt);

    if diff.num_seconds() < 60 {
        return "just now".to_string();
    }
    if diff.num_minutes() < 60 {
        return format!("{}m ago", diff.num_minutes());
    }
    if diff.num_hours() < 24 {
        return format!("{}h ago", diff.num_hours());
    }
    if diff.num_days() < 7 {
        return format!("{}d ago", diff.num_days());
    }

    dt.format("%b %-d, %Y").to_string()
}

// --- Tests ---
