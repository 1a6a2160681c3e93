//! Cached OAuth access token with an early-expiry margin.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::Provider;
use crate::clock::Clock;
use crate::error::{ProviderError, ProviderResult};

/// A token is dropped this long before the provider says it expires.
pub const SAFETY_MARGIN: TimeDelta = TimeDelta::seconds(60);

/// The client-credentials response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> ProviderResult<Self> {
        let expires_at = TimeDelta::try_seconds(grant.expires_in)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .and_then(|expiry| expiry.checked_sub_signed(SAFETY_MARGIN))
            .ok_or_else(|| ProviderError::Decode {
                provider: Provider::SendPulse,
                message: format!("expires_in out of range: {}", grant.expires_in),
            })?;

        Ok(Self {
            value: grant.access_token,
            expires_at,
        })
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Holds at most one token. The lock is held across a refresh, so concurrent
/// callers that find the token stale wait for a single exchange and then
/// reuse its result.
#[derive(Debug)]
pub struct TokenCache {
    slot: Mutex<Option<AccessToken>>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            slot: Mutex::new(None),
            clock,
        }
    }

    /// Returns the cached token while it is fresh, otherwise runs `refresh`
    /// and caches what it grants. A failed refresh, or a grant whose lifetime
    /// cannot be represented, leaves the cache empty.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> ProviderResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<TokenGrant>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref()
            && token.is_fresh(self.clock.now())
        {
            debug!(expires_at = %token.expires_at, "reusing cached access token");
            return Ok(token.value.clone());
        }

        *slot = None;
        let grant = refresh().await?;
        let token = AccessToken::from_grant(grant, self.clock.now())?;
        info!(expires_at = %token.expires_at, "access token acquired");
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    pub async fn current(&self) -> Option<AccessToken> {
        self.slot.lock().await.clone()
    }
}
