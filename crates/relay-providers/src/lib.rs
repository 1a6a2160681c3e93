//! # relay-providers: outbound provider APIs
//!
//! One client per upstream service:
//!
//! - [`ultramsg`]: WhatsApp sends through an UltraMSG instance
//! - [`sendpulse`]: Instagram bots, contacts and sends through SendPulse,
//!   authenticated with a cached client-credentials token ([`token`])
//! - [`bale`]: the Bale bot API (`getMe`, `sendMessage`, webhook management)
//!
//! Clients return the provider's JSON response untouched on success and a
//! [`ProviderError`] otherwise. Nothing here retries; every call is bounded by
//! the timeout of the shared [`reqwest::Client`].

pub mod bale;
pub mod clock;
pub mod error;
pub mod http;
pub mod sendpulse;
pub mod token;
pub mod ultramsg;

use std::fmt;

use relay_protocol::Platform;

pub use bale::{BaleClient, BaleConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ProviderError, ProviderResult};
pub use http::{DEFAULT_TIMEOUT, http_client};
pub use sendpulse::{Bot, InstagramSubscriber, SendPulseClient, SendPulseConfig};
pub use token::{AccessToken, SAFETY_MARGIN, TokenCache, TokenGrant};
pub use ultramsg::{UltraMsgClient, UltraMsgConfig};

/// The upstream service behind a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    UltraMsg,
    SendPulse,
    Bale,
}

impl Provider {
    pub fn platform(self) -> Platform {
        match self {
            Self::UltraMsg => Platform::WhatsApp,
            Self::SendPulse => Platform::Instagram,
            Self::Bale => Platform::Bale,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::UltraMsg => "UltraMSG",
            Self::SendPulse => "SendPulse",
            Self::Bale => "Bale",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
