pub mod assets;
pub mod auth;
pub mod home;
pub mod posts;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{require_login, resolve_current_user};
use crate::db::connection_scope;
use crate::state::AppState;

/// Assemble the whole application.
///
/// Layers run outermost first: tracing, the per-request connection scope,
/// current-user resolution, then (for gated routes only) the login gate.
pub fn app(state: AppState) -> Router {
    let gated = Router::new()
        .route("/", get(home::index))
        .merge(posts::gated_router())
        .route_layer(middleware::from_fn(require_login));

    Router::new()
        .merge(gated)
        .merge(auth::router())
        .merge(posts::public_router())
        .route("/assets/{*path}", get(assets::serve))
        .layer(DefaultBodyLimit::max(state.config.upload_limit_bytes()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            resolve_current_user,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            connection_scope,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
