use axum::http::{header, HeaderMap};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies the session cookie.
///
/// The cookie value is `<user_id>.<hex hmac-sha256 of user_id>`, so the
/// client holds the session but cannot forge another user's id without the
/// server secret.
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
    cookie_name: String,
}

impl SessionSigner {
    pub fn new(secret: &str, cookie_name: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            cookie_name: cookie_name.to_string(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn sign(&self, user_id: i64) -> AppResult<String> {
        let payload = user_id.to_string();
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        Ok(format!(
            "{}.{}",
            payload,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    /// Returns the user id carried by a correctly signed value.
    pub fn verify(&self, value: &str) -> Option<i64> {
        let (payload, signature) = value.split_once('.')?;
        let signature = hex::decode(signature).ok()?;

        let mut mac = self.mac().ok()?;
        mac.update(payload.as_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(&signature).ok()?;

        payload.parse().ok()
    }

    /// The user id of a valid session cookie on the request, if any.
    pub fn read(&self, headers: &HeaderMap) -> Option<i64> {
        get_cookie_value(headers, &self.cookie_name).and_then(|v| self.verify(v))
    }

    pub fn session_cookie(&self, user_id: i64) -> AppResult<String> {
        Ok(format!(
            "{}={}; HttpOnly; SameSite=Lax; Path=/",
            self.cookie_name,
            self.sign(user_id)?
        ))
    }

    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
            self.cookie_name
        )
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(format!("HMAC error: {}", e)))
    }
}

pub fn get_cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}
