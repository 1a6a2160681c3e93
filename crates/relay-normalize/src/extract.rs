//! Ordered fallback chains over loosely shaped JSON.
//!
//! A chain is a static table of [`Candidate`]s. Each candidate names a scope
//! (which sub-object of the payload to start from) and a key path inside it.
//! Evaluation walks the table in order and keeps the first candidate that
//! resolves to usable text. Provider modules define their own scope enums and
//! a resolver that maps each scope onto the payload they were given.

use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct Candidate<S> {
    pub scope: S,
    pub path: &'static [&'static str],
}

pub const fn at<S>(scope: S, path: &'static [&'static str]) -> Candidate<S> {
    Candidate { scope, path }
}

/// First candidate in `chain` that resolves to text.
pub fn first_text<'a, S: Copy>(
    chain: &[Candidate<S>],
    resolve: impl Fn(S) -> Option<&'a Value>,
) -> Option<String> {
    chain.iter().find_map(|candidate| {
        resolve(candidate.scope)
            .and_then(|root| lookup(root, candidate.path))
            .and_then(text_of)
    })
}

/// First candidate in `chain` that resolves to a JSON object.
pub fn first_object<'a, S: Copy>(
    chain: &[Candidate<S>],
    resolve: impl Fn(S) -> Option<&'a Value>,
) -> Option<&'a Value> {
    chain.iter().find_map(|candidate| {
        resolve(candidate.scope)
            .and_then(|root| lookup(root, candidate.path))
            .filter(|value| value.is_object())
    })
}

pub fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, key| value.get(*key))
}

/// Reads a scalar as display text.
///
/// Non-empty strings are kept verbatim and non-zero numbers are rendered
/// (chat ids often arrive as integers). Everything else counts as absent:
/// null, booleans, zero, the empty string, objects and arrays.
pub fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Number(number) if number.as_f64() != Some(0.0) => Some(number.to_string()),
        _ => None,
    }
}

/// Text under a top-level `key` of an object payload.
pub fn text_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(text_of)
}
