use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use instaclone::config::{Cli, Command, Config};
use instaclone::db;
use instaclone::routes;
use instaclone::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    if cli.command == Some(Command::InitDb) {
        db::reset(&config.db_path())?;
        tracing::info!("Initialized the database at {}", config.db_path().display());
        return Ok(());
    }

    if config.uses_dev_secret() {
        tracing::warn!("Using the development secret key; set [auth] secret_key in production");
    }

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;
    tracing::info!("Uploads directory: {}", config.uploads_path().display());

    // Initialize database
    db::init(&config.db_path())?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(AppState::new(config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
