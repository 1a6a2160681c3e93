use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::Provider;
use crate::error::{ProviderError, ProviderResult};

/// Upper bound on every outbound provider call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn http_client(timeout: Duration) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ProviderError::ClientBuild)
}

/// Reads a provider response into JSON.
///
/// Non-2xx statuses become [`ProviderError::Remote`] carrying the body. Bodies
/// that are not JSON are kept as a string and an empty body reads as `null`.
pub(crate) async fn read_json(
    provider: Provider,
    response: reqwest::Response,
) -> ProviderResult<Value> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|source| ProviderError::Transport { provider, source })?;
    let body = lenient_json(text);
    debug!(%provider, status = status.as_u16(), "provider responded");

    if status.is_success() {
        Ok(body)
    } else {
        Err(ProviderError::Remote {
            provider,
            status: status.as_u16(),
            body,
        })
    }
}

pub(crate) fn decode<T: DeserializeOwned>(provider: Provider, body: Value) -> ProviderResult<T> {
    serde_json::from_value(body).map_err(|error| ProviderError::Decode {
        provider,
        message: error.to_string(),
    })
}

pub(crate) fn transport(provider: Provider) -> impl FnOnce(reqwest::Error) -> ProviderError {
    move |source| ProviderError::Transport { provider, source }
}

fn lenient_json(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
