use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
}

/// A post joined with its author's username.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub username: String,
    pub img_path: String,
    pub caption: String,
    pub created: String,
}

/// Row in the feed index.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

impl User {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password: row.get(3)?,
        })
    }

    pub fn find_by_id(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            "SELECT id, username, email, password FROM user WHERE id = ?1",
            params![id],
            User::from_row,
        )
        .optional()
    }

    pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
        conn.query_row(
            "SELECT id, username, email, password FROM user WHERE username = ?1",
            params![username],
            User::from_row,
        )
        .optional()
    }

    pub fn username_taken(conn: &Connection, username: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM user WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )
    }

    pub fn email_taken(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT COUNT(*) > 0 FROM user WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )
    }

    /// Insert a user whose password is already hashed. Returns the new id.
    pub fn create(
        conn: &Connection,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO user (username, email, password) VALUES (?1, ?2, ?3)",
            params![username, email, password_hash],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list(conn: &Connection) -> rusqlite::Result<Vec<UserSummary>> {
        let mut stmt = conn.prepare("SELECT id, username FROM user ORDER BY id")?;
        let users = stmt
            .query_map([], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }
}

impl Post {
    pub fn create(
        conn: &Connection,
        author_id: i64,
        img_path: &str,
        caption: &str,
    ) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO post (author_id, img_path, caption) VALUES (?1, ?2, ?3)",
            params![author_id, img_path, caption],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Posts by `username`, newest first.
    pub fn by_username(conn: &Connection, username: &str) -> rusqlite::Result<Vec<Post>> {
        let mut stmt = conn.prepare(
            "SELECT p.id, p.author_id, u.username, p.img_path, p.caption, p.created
             FROM post p
             JOIN user u ON p.author_id = u.id
             WHERE u.username = ?1
             ORDER BY p.created DESC, p.id DESC",
        )?;

        let posts = stmt
            .query_map(params![username], |row| {
                Ok(Post {
                    id: row.get(0)?,
                    author_id: row.get(1)?,
                    username: row.get(2)?,
                    img_path: row.get(3)?,
                    caption: row.get(4)?,
                    created: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(posts)
    }
}
