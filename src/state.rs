use crate::auth::session::SessionSigner;
use crate::config::Config;
use crate::storage::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionSigner,
    pub uploads: UploadStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionSigner::new(&config.auth.secret_key, &config.auth.cookie_name);
        let uploads = UploadStore::new(
            config.uploads_path(),
            config.storage.allowed_extensions.clone(),
        );
        Self {
            config,
            sessions,
            uploads,
        }
    }
}
