//! # relay-normalize: webhook payloads to canonical events
//!
//! Providers post loosely specified JSON that has drifted across versions.
//! Each provider module evaluates ordered fallback chains (see [`extract`])
//! over the payload and never fails: fields that cannot be found become the
//! `"Unknown"` / `"[No text]"` placeholders or stay absent.
//!
//! Normalizers are pure. The one side effect a webhook implies (learning a
//! Bale contact) is returned in [`Normalized::contact`] for the caller to
//! apply.

pub mod bale;
pub mod extract;
pub mod instagram;
pub mod whatsapp;

use relay_protocol::{Contact, Event, Platform};
use serde_json::Value;

pub use instagram::is_instagram_batch;

/// The outcome of normalizing one webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub event: Event,
    /// Directory entry to upsert, when the payload identified a Bale chat.
    pub contact: Option<Contact>,
}

/// Normalizes a payload received on the endpoint for `platform`.
///
/// Payloads posted to the WhatsApp endpoint that are really SendPulse
/// Instagram batches are routed to the Instagram normalizer.
pub fn normalize(raw: Value, platform: Platform) -> Normalized {
    match platform {
        Platform::WhatsApp if is_instagram_batch(&raw) => event_only(instagram::normalize(raw)),
        Platform::WhatsApp => event_only(whatsapp::normalize(raw)),
        Platform::Instagram => event_only(instagram::normalize(raw)),
        Platform::Bale => {
            let (event, contact) = bale::normalize(raw);
            Normalized { event, contact }
        }
    }
}

fn event_only(event: Event) -> Normalized {
    Normalized {
        event,
        contact: None,
    }
}

#[cfg(test)]
mod tests {
    use relay_protocol::Direction;
    use serde_json::json;

    use super::*;

    #[test]
    fn whatsapp_endpoint_serializes_to_viewer_shape() {
        let normalized = normalize(json!({ "from": "+1555", "body": "hi" }), Platform::WhatsApp);
        assert!(normalized.contact.is_none());

        let wire = serde_json::to_value(&normalized.event).unwrap();
        assert_eq!(wire["direction"], "incoming");
        assert_eq!(wire["platform"], "whatsapp");
        assert_eq!(wire["from"], "+1555");
        assert_eq!(wire["body"], "hi");
        assert_eq!(wire["to"], Value::Null);
        assert_eq!(wire["type"], Value::Null);
    }

    #[test]
    fn instagram_batch_on_whatsapp_endpoint_is_sniffed() {
        let raw = json!([{
            "service": "instagram",
            "contact": { "name": "Ann" },
            "info": { "message": { "channel_data": { "message": { "text": "yo" } } } }
        }]);

        let sniffed = normalize(raw.clone(), Platform::WhatsApp);
        assert_eq!(sniffed.event.platform, Platform::Instagram);
        assert_eq!(sniffed.event.from, "Ann");
        assert_eq!(sniffed.event.body, "yo");

        let dedicated = normalize(raw, Platform::Instagram);
        assert_eq!(dedicated.event.from, sniffed.event.from);
        assert_eq!(dedicated.event.body, sniffed.event.body);
        assert_eq!(dedicated.event.kind, sniffed.event.kind);
    }

    #[test]
    fn plain_array_on_whatsapp_endpoint_stays_whatsapp() {
        let normalized = normalize(json!([{ "service": "sms" }]), Platform::WhatsApp);
        assert_eq!(normalized.event.platform, Platform::WhatsApp);
        assert_eq!(normalized.event.direction, Direction::Incoming);
    }

    #[test]
    fn bale_returns_the_contact_to_learn() {
        let normalized = normalize(
            json!({
                "message": {
                    "chat": { "id": 31 },
                    "from": { "id": 31, "username": "omid" },
                    "text": "x"
                }
            }),
            Platform::Bale,
        );
        let contact = normalized.contact.unwrap();
        assert_eq!(contact.id, "31");
        assert_eq!(contact.name, "omid");
        assert_eq!(normalized.event.from, "omid");
    }
}
