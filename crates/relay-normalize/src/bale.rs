//! Bale bot updates (Telegram-compatible shape).

use relay_protocol::{Contact, Event, Platform};
use serde_json::Value;

use crate::extract::{Candidate, at, first_object, first_text, text_field};

#[derive(Debug, Clone, Copy)]
enum Scope {
    Update,
    Message,
    Chat,
    Sender,
}

use Scope::{Chat, Message, Sender, Update};

const MESSAGE: &[Candidate<Scope>] = &[
    at(Update, &["message"]),
    at(Update, &["edited_message"]),
    at(Update, &["callback_query", "message"]),
];

const CHAT: &[Candidate<Scope>] = &[at(Message, &["chat"]), at(Update, &["chat"])];

const SENDER: &[Candidate<Scope>] = &[at(Message, &["from"]), at(Update, &["from"])];

const BODY: &[Candidate<Scope>] = &[
    at(Message, &["text"]),
    at(Update, &["text"]),
    at(Message, &["caption"]),
];

const CHAT_ID: &[Candidate<Scope>] = &[
    at(Chat, &["id"]),
    at(Update, &["chat_id"]),
    at(Update, &["user_id"]),
    at(Sender, &["id"]),
];

const NAME: &[Candidate<Scope>] = &[
    at(Sender, &["first_name"]),
    at(Sender, &["last_name"]),
    at(Chat, &["title"]),
    at(Sender, &["name"]),
];

const USERNAME: &[Candidate<Scope>] = &[at(Sender, &["username"]), at(Chat, &["username"])];

const KIND: &str = "text";

pub fn normalize(raw: Value) -> (Event, Option<Contact>) {
    let update = &raw;
    let message = first_object(MESSAGE, |_| Some(update));
    let scoped = |scope: Scope| match scope {
        Update => Some(update),
        Message => message,
        Chat | Sender => None,
    };
    let chat = first_object(CHAT, scoped);
    let sender = first_object(SENDER, scoped);

    let resolve = |scope: Scope| match scope {
        Update => Some(update),
        Message => message,
        Chat => chat,
        Sender => sender,
    };

    let body = first_text(BODY, resolve);
    let chat_id = first_text(CHAT_ID, resolve);
    let name = full_name(sender).or_else(|| first_text(NAME, resolve));
    let username = first_text(USERNAME, resolve);

    let contact = chat_id
        .clone()
        .map(|id| Contact::new(id, name.clone(), username.clone()));
    let from = name.or_else(|| username.clone()).or(chat_id);

    let event = Event::incoming(Platform::Bale, from, body)
        .with_kind(Some(KIND.to_owned()))
        .with_username(username)
        .with_raw(raw);
    (event, contact)
}

fn full_name(sender: Option<&Value>) -> Option<String> {
    let sender = sender?;
    let first = text_field(sender, "first_name")?;
    let last = text_field(sender, "last_name")?;
    Some(format!("{first} {last}"))
}
