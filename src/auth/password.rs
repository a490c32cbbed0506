use crate::error::{AppError, AppResult};

/// Hash a password with bcrypt off the async runtime.
pub async fn hash(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

/// Check a password against a stored bcrypt hash.
pub async fn verify(password: String, stored_hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let hashed = hash("secret".into(), 4).await.unwrap();
        assert_ne!(hashed, "secret");
        assert!(verify("secret".into(), hashed.clone()).await.unwrap());
        assert!(!verify("Secret".into(), hashed).await.unwrap());
    }

    #[tokio::test]
    async fn same_password_gets_different_salts() {
        let a = hash("secret".into(), 4).await.unwrap();
        let b = hash("secret".into(), 4).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        assert!(verify("secret".into(), "not-a-hash".into()).await.is_err());
    }
}
