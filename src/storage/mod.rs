use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// The directory uploaded images live in, plus the extensions it accepts.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    allowed_extensions: Vec<String>,
}

impl UploadStore {
    pub fn new(dir: PathBuf, allowed_extensions: Vec<String>) -> Self {
        Self {
            dir,
            allowed_extensions,
        }
    }

    /// Lowercased extension of `filename` when it is in the allowed set.
    pub fn allowed_extension(&self, filename: &str) -> Option<String> {
        let (_, ext) = filename.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions
            .iter()
            .any(|allowed| *allowed == ext)
            .then_some(ext)
    }

    /// Write `bytes` under a freshly generated name and return that name.
    pub async fn save(&self, user_id: i64, ext: &str, bytes: &[u8]) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let filename = generate_filename(user_id, ext);
        tokio::fs::write(self.dir.join(&filename), bytes).await?;
        Ok(filename)
    }

    /// Delete a stored file that no post refers to.
    pub async fn remove(&self, filename: &str) {
        let Some(path) = self.resolve(filename) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove orphaned upload {}: {}", path.display(), e);
        }
    }

    /// Path of a stored file, or `None` when `filename` could escape the directory.
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        is_safe_filename(filename).then(|| self.dir.join(filename))
    }
}

/// Name for a new upload: hex SHA-256 of the user id, the current time and a
/// random salt. Nothing the client sent goes into it except the validated
/// extension.
pub fn generate_filename(user_id: i64, ext: &str) -> String {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let mut hasher = Sha256::new();
    hasher.update(format!("{} {}", user_id, Utc::now().to_rfc3339()).as_bytes());
    hasher.update(salt);
    format!("{}.{}", hex::encode(hasher.finalize()), ext)
}

fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains("..")
        && !filename.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn store(dir: &Path) -> UploadStore {
        UploadStore::new(
            dir.to_path_buf(),
            vec!["png".into(), "jpg".into(), "jpeg".into()],
        )
    }

    #[test]
    fn allowed_extensions_are_case_insensitive() {
        let s = store(Path::new("/tmp"));
        assert_eq!(s.allowed_extension("photo.png"), Some("png".into()));
        assert_eq!(s.allowed_extension("photo.JPG"), Some("jpg".into()));
        assert_eq!(s.allowed_extension("my.holiday.jpeg"), Some("jpeg".into()));
    }

    #[test]
    fn disallowed_extensions_are_rejected() {
        let s = store(Path::new("/tmp"));
        assert_eq!(s.allowed_extension("anim.gif"), None);
        assert_eq!(s.allowed_extension("png"), None);
        assert_eq!(s.allowed_extension("photo.png.exe"), None);
        assert_eq!(s.allowed_extension("photo."), None);
    }

    #[test]
    fn generated_names_are_hex_and_unique() {
        let a = generate_filename(1, "png");
        let b = generate_filename(1, "png");
        assert_ne!(a, b);

        let (stem, ext) = a.split_once('.').unwrap();
        assert_eq!(ext, "png");
        assert_eq!(stem.len(), 64);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let s = store(Path::new("/srv/uploads"));
        assert_eq!(
            s.resolve("abc.png"),
            Some(PathBuf::from("/srv/uploads/abc.png"))
        );
        assert_eq!(s.resolve(""), None);
        assert_eq!(s.resolve(".."), None);
        assert_eq!(s.resolve("../secret"), None);
        assert_eq!(s.resolve("a/b.png"), None);
        assert_eq!(s.resolve("a\\b.png"), None);
        assert_eq!(s.resolve(".hidden"), None);
    }

    #[tokio::test]
    async fn save_writes_bytes_under_generated_name() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp.path().join("uploads"));

        let name = s.save(3, "jpg", b"not really a jpeg").await.unwrap();
        assert!(name.ends_with(".jpg"));

        let written = std::fs::read(tmp.path().join("uploads").join(&name)).unwrap();
        assert_eq!(written, b"not really a jpeg");
    }

    #[tokio::test]
    async fn remove_deletes_a_saved_file() {
        let tmp = tempfile::tempdir().unwrap();
        let s = store(&tmp.path().join("uploads"));

        let name = s.save(3, "png", b"bytes").await.unwrap();
        s.remove(&name).await;
        assert!(!tmp.path().join("uploads").join(&name).exists());

        // Unsafe or missing names are ignored
        s.remove("../escape.png").await;
        s.remove(&name).await;
    }
}
