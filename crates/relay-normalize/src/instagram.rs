//! SendPulse Instagram webhooks.
//!
//! SendPulse posts a JSON array of deliveries. Only the first entry is read;
//! a bare object is accepted as its own entry. The same normalizer serves the
//! dedicated Instagram endpoint and batches that arrive on the WhatsApp one.

use relay_protocol::{Event, Platform};
use serde_json::Value;

use crate::extract::{Candidate, at, first_text};

#[derive(Debug, Clone, Copy)]
enum Scope {
    Entry,
}

use Scope::Entry;

const CONTACT_ID: &[Candidate<Scope>] = &[
    at(Entry, &["contact_id"]),
    at(Entry, &["from"]),
    at(Entry, &["sender_id"]),
    at(Entry, &["user_id"]),
    at(Entry, &["contact", "id"]),
    at(Entry, &["sender", "id"]),
];

const BODY: &[Candidate<Scope>] = &[
    at(Entry, &["message"]),
    at(Entry, &["text"]),
    at(Entry, &["body"]),
    at(Entry, &["content"]),
    at(Entry, &["message_data", "text"]),
    at(Entry, &["data", "message"]),
    at(Entry, &["info", "message", "channel_data", "message", "text"]),
    at(Entry, &["contact", "last_message"]),
];

const TYPE: &[Candidate<Scope>] = &[
    at(Entry, &["message_type"]),
    at(Entry, &["type"]),
    at(Entry, &["event_type"]),
];

const USERNAME: &[Candidate<Scope>] = &[
    at(Entry, &["username"]),
    at(Entry, &["contact", "username"]),
    at(Entry, &["sender", "username"]),
];

const NAME: &[Candidate<Scope>] = &[
    at(Entry, &["name"]),
    at(Entry, &["contact", "name"]),
    at(Entry, &["sender", "name"]),
];

const PHOTO: &[Candidate<Scope>] = &[
    at(Entry, &["photo"]),
    at(Entry, &["contact", "photo"]),
    at(Entry, &["sender", "photo"]),
];

const DEFAULT_TYPE: &str = "text";

/// Whether a payload posted to the WhatsApp endpoint is really a SendPulse
/// Instagram batch.
pub fn is_instagram_batch(raw: &Value) -> bool {
    let Some(first) = raw.as_array().and_then(|entries| entries.first()) else {
        return false;
    };
    first.get("service").and_then(Value::as_str) == Some("instagram")
        || first
            .get("bot")
            .and_then(|bot| bot.get("channel"))
            .and_then(Value::as_str)
            == Some("INSTAGRAM")
}

pub fn normalize(raw: Value) -> Event {
    let entry = match raw.as_array() {
        Some(entries) => entries.first(),
        None => Some(&raw),
    };
    let resolve = |_: Scope| entry;

    let contact_id = first_text(CONTACT_ID, resolve);
    let body = first_text(BODY, resolve);
    let kind = first_text(TYPE, resolve).unwrap_or_else(|| DEFAULT_TYPE.to_owned());
    let username = first_text(USERNAME, resolve);
    let name = first_text(NAME, resolve);
    let photo = first_text(PHOTO, resolve);

    let from = name.or_else(|| username.clone()).or(contact_id);

    Event::incoming(Platform::Instagram, from, body)
        .with_kind(Some(kind))
        .with_username(username)
        .with_photo(photo)
        .with_raw(raw)
}
