use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";

/// API key verification. Only the SHA-256 digest of the configured key is
/// kept in memory; comparison is over digests in fixed time.
pub struct ApiKeyAuth {
    digest: Option<[u8; 32]>,
}

impl ApiKeyAuth {
    /// Reads SCAMTRAP_API_KEY. An absent key disables authentication, which
    /// is only acceptable for local development and is logged loudly.
    pub fn from_env() -> Self {
        match std::env::var("SCAMTRAP_API_KEY") {
            Ok(key) if !key.trim().is_empty() => Self {
                digest: Some(sha256(key.trim().as_bytes())),
            },
            _ => {
                tracing::warn!("SCAMTRAP_API_KEY is not set; API authentication is DISABLED");
                Self { digest: None }
            }
        }
    }

    #[cfg(test)]
    pub fn with_key(key: &str) -> Self {
        Self {
            digest: Some(sha256(key.as_bytes())),
        }
    }

    pub fn verify(&self, presented: Option<&str>) -> bool {
        let Some(expected) = &self.digest else {
            return true;
        };
        let Some(presented) = presented else {
            return false;
        };
        constant_time_eq(&sha256(presented.as_bytes()), expected)
    }
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware guarding the analysis routes.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !state.auth.verify(presented) {
        tracing::warn!("rejected request with missing or invalid API key");
        return Err(AppError::Unauthorized);
    }

    Ok(next.run(request).await)
}
