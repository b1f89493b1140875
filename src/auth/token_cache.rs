//! Cached bearer token shared by all requests made with one credential.

use std::future::Future;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;

use crate::error::Result;

/// Tokens are treated as expired this long before their real expiry, so a
/// header handed out now is still valid when the request reaches the server.
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A ready-to-use `Authorization` header value and when it stops working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub value: String,
    pub expiration: SystemTime,
}

impl BearerToken {
    fn is_usable_at(&self, now: SystemTime) -> bool {
        !self.value.is_empty() && now + TOKEN_EXPIRY_MARGIN < self.expiration
    }
}

/// Holds one token and refreshes it on demand.
///
/// The lock is held across the refresh call, so concurrent callers wait for
/// the in-flight refresh instead of starting their own.
#[derive(Debug, Default)]
pub struct RefreshingCredentialsWrapper {
    token: Mutex<Option<BearerToken>>,
}

impl RefreshingCredentialsWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached header if it is still good at `now`, otherwise call
    /// `refresh` and cache what it returns. A failed refresh leaves the cache
    /// untouched.
    pub async fn authorization_header<F, Fut>(&self, now: SystemTime, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<BearerToken>>,
    {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_usable_at(now) {
                return Ok(token.value.clone());
            }
        }

        let fresh = refresh().await?;
        let header = fresh.value.clone();
        *cached = Some(fresh);
        Ok(header)
    }

    /// The currently cached token, if any.
    pub async fn current(&self) -> Option<BearerToken> {
        self.token.lock().await.clone()
    }
}
