//! OAuth token caching for Firestore authentication.
//!
//! Tokens are cached with a refresh margin so a token never expires in the
//! middle of a request. Refreshes are single-flight: concurrent callers wait
//! on one refresh rather than stampeding the metadata server. If a refresh
//! fails while the cached token is still technically usable, the stale token
//! is returned instead of failing the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when gcp_auth reports no usable expiry. OAuth access tokens
/// are normally good for 60 minutes.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

/// Datastore scope covers the Firestore REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Valid for handing out: expiry is still beyond the refresh margin.
    fn is_fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    /// Not yet expired, even if past the refresh margin.
    fn is_usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token. Called after a 401 so the next request
    /// forces a refresh.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Get an access token, refreshing if needed.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        // Fast path under the read lock.
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh(&mut cache).await
    }

    async fn refresh(&self, cache: &mut Option<CachedToken>) -> FirestoreResult<String> {
        match self.provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();

                let expires_at = {
                    let now = Utc::now();
                    let exp = token.expires_at();
                    if exp > now {
                        match (exp - now).to_std() {
                            Ok(ttl) => Instant::now() + ttl,
                            Err(_) => Instant::now() + FALLBACK_TTL,
                        }
                    } else {
                        // Already expired per the provider; force a refresh on
                        // the next call.
                        Instant::now()
                    }
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });

                debug!("Refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => {
                if let Some(cached) = cache.as_ref() {
                    if cached.is_usable() {
                        warn!("Token refresh failed, reusing current token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }

                Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_margin_shorter_than_fallback_ttl() {
        assert!(REFRESH_MARGIN < FALLBACK_TTL);
    }

    #[test]
    fn test_fresh_token_is_usable() {
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(600),
        };
        assert!(token.is_fresh());
        assert!(token.is_usable());
    }

    #[test]
    fn test_token_inside_margin_is_usable_but_not_fresh() {
        let token = CachedToken {
            access_token: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(10),
        };
        assert!(!token.is_fresh());
        assert!(token.is_usable());
    }
}
