//! Error types for provider calls.

use serde_json::{Value, json};
use thiserror::Error;

use crate::Provider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} is not configured: set {missing}")]
    NotConfigured {
        provider: Provider,
        missing: &'static str,
    },
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} returned status {status}: {body}")]
    Remote {
        provider: Provider,
        status: u16,
        body: Value,
    },
    #[error("{provider} response could not be decoded: {message}")]
    Decode { provider: Provider, message: String },
    #[error("No Instagram bot configured")]
    NoInstagramBot,
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl ProviderError {
    /// HTTP status to report for this failure. Remote failures keep the
    /// provider's own status.
    pub fn status(&self) -> u16 {
        match self {
            Self::Remote { status, .. } => *status,
            Self::NoInstagramBot => 400,
            Self::NotConfigured { .. }
            | Self::Transport { .. }
            | Self::Decode { .. }
            | Self::ClientBuild(_) => 500,
        }
    }

    /// Caller-facing detail: the provider's response body when it sent one,
    /// otherwise `{"error": <message>}`.
    pub fn detail(&self) -> Value {
        match self {
            Self::Remote { body, .. } => body.clone(),
            Self::NoInstagramBot => Value::String(self.to_string()),
            _ => json!({ "error": self.to_string() }),
        }
    }

    pub fn provider(&self) -> Option<Provider> {
        match self {
            Self::NotConfigured { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Remote { provider, .. }
            | Self::Decode { provider, .. } => Some(*provider),
            Self::NoInstagramBot => Some(Provider::SendPulse),
            Self::ClientBuild(_) => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;
