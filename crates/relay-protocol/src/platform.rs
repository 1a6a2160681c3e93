//! The chat providers a relay speaks to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A provider integration. Serialized lowercase (`"whatsapp"`, `"instagram"`,
/// `"bale"`), which is also the tag viewers filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    WhatsApp,
    Instagram,
    Bale,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::WhatsApp => "whatsapp",
            Platform::Instagram => "instagram",
            Platform::Bale => "bale",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::WhatsApp).unwrap();
        assert_eq!(json, "\"whatsapp\"");
        let back: Platform = serde_json::from_str("\"bale\"").unwrap();
        assert_eq!(back, Platform::Bale);
    }

    #[test]
    fn platform_displays_its_wire_tag() {
        assert_eq!(Platform::Instagram.to_string(), "instagram");
        assert_eq!(Platform::Bale.as_str(), "bale");
    }
}
