pub mod gate;
pub mod handlers;
pub mod password;
pub mod session;

pub use gate::{require_login, resolve_current_user};
