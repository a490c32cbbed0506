pub mod models;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::AppResult;
use crate::state::AppState;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Open a connection with the settings every request relies on.
pub fn open_connection(db_path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(conn)
}

/// Create the database file if needed and bring the schema up to date.
pub fn init(db_path: &Path) -> anyhow::Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = open_connection(db_path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    run_migrations(&conn)
}

pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    // Create migrations tracking table
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Drop every table and rebuild the schema from scratch.
pub fn reset(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = open_connection(db_path)?;
    conn.execute_batch(
        "
        DROP TABLE IF EXISTS post;
        DROP TABLE IF EXISTS user;
        DROP TABLE IF EXISTS schema_version;
        ",
    )?;
    tracing::warn!("Dropped existing tables in {}", db_path.display());
    run_migrations(&conn)
}

/// The store connection belonging to one request.
///
/// Opened on first use, shared by everything that runs for the request
/// (current-user resolution and the handler), and closed when the
/// [`connection_scope`] middleware finishes.
#[derive(Clone)]
pub struct RequestDb {
    path: Arc<PathBuf>,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl RequestDb {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            conn: Arc::new(Mutex::new(None)),
        }
    }

    /// Run `f` against the request's connection, opening it if this is the first use.
    pub fn with<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let mut slot = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let conn = match slot.take() {
            Some(conn) => conn,
            None => {
                tracing::debug!("Opening connection to {}", self.path.display());
                open_connection(&self.path)?
            }
        };
        let conn: &Connection = slot.insert(conn);
        f(conn)
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn close(&self) {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Failed to close connection: {}", e);
            }
        }
    }
}

/// Closes the request's connection when dropped, whether the handler
/// returned normally, failed, or unwound.
struct ConnectionGuard(RequestDb);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Middleware giving each request its own [`RequestDb`].
pub async fn connection_scope(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let db = RequestDb::new(state.config.db_path());
    let _guard = ConnectionGuard(db.clone());
    request.extensions_mut().insert(db);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated(path: &Path) -> Connection {
        init(path).unwrap();
        open_connection(path).unwrap()
    }

    #[test]
    fn init_creates_db_file_in_wal_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("sub/dir/test.sqlite");
        init(&db_path).unwrap();
        assert!(db_path.exists());

        let conn = open_connection(&db_path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn migrations_are_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.sqlite");
        init(&db_path).unwrap();
        init(&db_path).unwrap();

        let conn = open_connection(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn username_and_email_are_unique() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = migrated(&tmp.path().join("test.sqlite"));
        conn.execute(
            "INSERT INTO user (username, email, password) VALUES ('alice', 'a@x.com', 'h')",
            [],
        )
        .unwrap();

        let same_name = conn.execute(
            "INSERT INTO user (username, email, password) VALUES ('alice', 'b@x.com', 'h')",
            [],
        );
        assert!(same_name.is_err());

        let same_email = conn.execute(
            "INSERT INTO user (username, email, password) VALUES ('bob', 'a@x.com', 'h')",
            [],
        );
        assert!(same_email.is_err());
    }

    #[test]
    fn foreign_keys_enforced() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = migrated(&tmp.path().join("test.sqlite"));
        let result = conn.execute(
            "INSERT INTO post (author_id, img_path, caption) VALUES (42, 'x.png', 'hi')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn reset_clears_existing_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.sqlite");
        let conn = migrated(&db_path);
        conn.execute(
            "INSERT INTO user (username, email, password) VALUES ('alice', 'a@x.com', 'h')",
            [],
        )
        .unwrap();
        drop(conn);

        reset(&db_path).unwrap();
        let conn = open_connection(&db_path).unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM user", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
    }

    #[test]
    fn request_db_opens_lazily_and_reuses_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.sqlite");
        init(&db_path).unwrap();

        let db = RequestDb::new(db_path);
        assert!(!db.is_open());

        db.with(|conn| {
            conn.execute_batch("CREATE TEMP TABLE scratch (n INTEGER)")?;
            Ok(())
        })
        .unwrap();
        assert!(db.is_open());

        // Temp tables only exist on the connection that created them.
        let n: i64 = db
            .with(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM scratch", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn guard_closes_connection_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("test.sqlite");
        init(&db_path).unwrap();

        let db = RequestDb::new(db_path);
        {
            let _guard = ConnectionGuard(db.clone());
            db.with(|_| Ok(())).unwrap();
            assert!(db.is_open());
        }
        assert!(!db.is_open());
    }
}
