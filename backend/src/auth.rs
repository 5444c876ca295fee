use crate::{
    cache::Cache,
    config::JwtConfig,
    error::{AppError, AuthFailure, Result},
};
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::warn;

/// Guest counters outlive any single chat session.
const GUEST_WINDOW: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user ID
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            jwt_secret: config.secret.clone(),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map(|token_data| token_data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Auth(AuthFailure::TokenExpired),
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AppError::Auth(AuthFailure::InvalidToken),
            _ => AppError::Auth(AuthFailure::AuthError),
        })
    }

    /// `Ok(None)` for guests. A header that is present but unusable is an
    /// error rather than a silent downgrade to guest.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Option<String>> {
        let Some(header) = header.map(str::trim).filter(|h| !h.is_empty()) else {
            return Ok(None);
        };
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Auth(AuthFailure::InvalidAuthHeader))?;
        let claims = self.verify_token(token)?;
        Ok(Some(claims.sub))
    }
}

/// Counts guest questions per device. Redis when configured, otherwise a
/// process-local map.
pub struct GuestLimiter {
    cache: Option<Arc<Cache>>,
    local: Mutex<HashMap<String, i64>>,
    limit: u32,
}

impl GuestLimiter {
    pub fn new(cache: Option<Arc<Cache>>, limit: u32) -> Self {
        Self {
            cache,
            local: Mutex::new(HashMap::new()),
            limit,
        }
    }

    /// Raw fingerprints never reach storage.
    pub fn key(fingerprint: &str) -> String {
        let digest = Sha256::digest(fingerprint.as_bytes());
        format!("guest_questions:{}", hex::encode(digest))
    }

    async fn increment_local(&self, key: String) -> i64 {
        let mut counts = self.local.lock().await;
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        *count
    }

    /// Counts one question; refuses once the limit has been used up.
    pub async fn check(&self, fingerprint: Option<&str>) -> Result<i64> {
        let key = Self::key(fingerprint.unwrap_or("anonymous"));
        let count = match &self.cache {
            Some(cache) => match cache.increment(&key, GUEST_WINDOW).await {
                Ok(count) => count,
                Err(e) => {
                    warn!("Guest counter unavailable, counting locally: {}", e);
                    self.increment_local(key).await
                }
            },
            None => self.increment_local(key).await,
        };
        if count > i64::from(self.limit) {
            return Err(AppError::GuestLimit);
        }
        Ok(count)
    }
}
