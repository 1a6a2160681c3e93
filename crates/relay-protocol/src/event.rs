//! The canonical relay event.
//!
//! Inbound webhooks and outbound sends from every provider collapse into one
//! [`Event`]. The JSON produced here is exactly what live viewers receive on
//! the event stream, so field names follow the viewer contract (`type`,
//! `providerResponse`) rather than Rust naming.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::platform::Platform;

/// Body placeholder when no candidate field carried text.
pub const NO_TEXT: &str = "[No text]";
/// Sender placeholder when no candidate field identified the sender.
pub const UNKNOWN_SENDER: &str = "Unknown";
/// Sender recorded on events the relay itself sent.
pub const OPERATOR: &str = "operator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A normalized chat message, immutable once published.
///
/// `from` and `body` are never empty: construction substitutes
/// [`UNKNOWN_SENDER`] and [`NO_TEXT`]. `raw` is only set on incoming events and
/// `provider_response` only on outgoing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub direction: Direction,
    pub platform: Platform,
    pub from: String,
    pub to: Option<String>,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
    #[serde(with = "iso_millis")]
    pub at: DateTime<Utc>,
}

impl Event {
    /// An inbound message. Missing or empty sender and body fall back to the
    /// placeholders.
    pub fn incoming(platform: Platform, from: Option<String>, body: Option<String>) -> Self {
        Self {
            direction: Direction::Incoming,
            platform,
            from: non_empty_or(from, UNKNOWN_SENDER),
            to: None,
            body: non_empty_or(body, NO_TEXT),
            kind: None,
            username: None,
            photo: None,
            raw: None,
            provider_response: None,
            at: now(),
        }
    }

    /// A message the relay delivered to `to`, carrying the provider's reply.
    pub fn outgoing(
        platform: Platform,
        to: impl Into<String>,
        body: impl Into<String>,
        provider_response: Value,
    ) -> Self {
        Self {
            direction: Direction::Outgoing,
            platform,
            from: OPERATOR.to_owned(),
            to: Some(to.into()),
            body: non_empty_or(Some(body.into()), NO_TEXT),
            kind: None,
            username: None,
            photo: None,
            raw: None,
            provider_response: Some(provider_response),
            at: now(),
        }
    }

    pub fn with_to(mut self, to: Option<String>) -> Self {
        self.to = to;
        self
    }

    pub fn with_kind(mut self, kind: Option<String>) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    pub fn with_photo(mut self, photo: Option<String>) -> Self {
        self.photo = photo;
        self
    }

    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn is_incoming(&self) -> bool {
        self.direction == Direction::Incoming
    }
}

fn non_empty_or(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_owned())
}

/// Current time at the millisecond precision the wire format carries.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }
}
