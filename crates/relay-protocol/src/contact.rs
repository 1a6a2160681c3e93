//! Directory entries learned from inbound traffic.

use serde::{Deserialize, Serialize};

/// A chat the relay has heard from. Keyed by `id` within one provider's
/// namespace; listed to operators as `{contact_id, name, username}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(rename = "contact_id")]
    pub id: String,
    pub name: String,
    pub username: Option<String>,
}

impl Contact {
    /// Builds an entry whose display name falls back to the username, then to
    /// the id itself, so `name` is never empty.
    pub fn new(id: impl Into<String>, name: Option<String>, username: Option<String>) -> Self {
        let id = id.into();
        let name = name
            .filter(|name| !name.is_empty())
            .or_else(|| username.clone())
            .unwrap_or_else(|| id.clone());
        Self { id, name, username }
    }
}
