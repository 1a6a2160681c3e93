//! UltraMSG (WhatsApp gateway) webhooks.
//!
//! UltraMSG has shipped several payload layouts: flat fields, fields under a
//! `data`/`message`/`payload` object, and a `messages` array. All three are
//! read through the same chains.

use relay_protocol::{Event, Platform};
use serde_json::Value;

use crate::extract::{Candidate, at, first_object, first_text};

#[derive(Debug, Clone, Copy)]
enum Scope {
    Payload,
    Nested,
    FirstMessage,
}

use Scope::{FirstMessage, Nested, Payload};

const NESTED: &[Candidate<Scope>] = &[
    at(Payload, &["data"]),
    at(Payload, &["message"]),
    at(Payload, &["payload"]),
];

const FROM: &[Candidate<Scope>] = &[
    at(Payload, &["from"]),
    at(Payload, &["sender"]),
    at(Payload, &["phone"]),
    at(Nested, &["from"]),
    at(FirstMessage, &["from"]),
    at(FirstMessage, &["sender"]),
];

const TO: &[Candidate<Scope>] = &[
    at(Payload, &["to"]),
    at(Payload, &["receiver"]),
    at(Nested, &["to"]),
    at(FirstMessage, &["to"]),
    at(FirstMessage, &["receiver"]),
];

const BODY: &[Candidate<Scope>] = &[
    at(Payload, &["body"]),
    at(Payload, &["message"]),
    at(Payload, &["text"]),
    at(Payload, &["caption"]),
    at(Nested, &["body"]),
    at(Nested, &["message"]),
    at(Nested, &["text"]),
    at(FirstMessage, &["body"]),
    at(FirstMessage, &["text"]),
    at(FirstMessage, &["message"]),
];

const TYPE: &[Candidate<Scope>] = &[
    at(Payload, &["type"]),
    at(Payload, &["event"]),
    at(Nested, &["type"]),
    at(FirstMessage, &["type"]),
];

pub fn normalize(raw: Value) -> Event {
    let first_message = raw
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| messages.first());
    let nested = first_object(NESTED, |_| Some(&raw));

    let resolve = |scope: Scope| match scope {
        Payload => Some(&raw),
        Nested => nested,
        FirstMessage => first_message,
    };

    let from = first_text(FROM, resolve);
    let to = first_text(TO, resolve);
    let body = first_text(BODY, resolve);
    let kind = first_text(TYPE, resolve);

    Event::incoming(Platform::WhatsApp, from, body)
        .with_to(to)
        .with_kind(kind)
        .with_raw(raw)
}
