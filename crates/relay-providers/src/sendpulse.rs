//! SendPulse chatbot API, used for Instagram.
//!
//! Every call carries a bearer token from the client-credentials exchange;
//! see [`TokenCache`] for reuse and expiry. Instagram operations first pick
//! the account's Instagram bot from `/chatbots/bots`.

use std::sync::Arc;

use relay_normalize::extract::text_of;
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

use crate::Provider;
use crate::clock::Clock;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{decode, read_json, transport};
use crate::token::{TokenCache, TokenGrant};

pub const DEFAULT_BASE_URL: &str = "https://api.sendpulse.com";

#[derive(Debug, Clone)]
pub struct SendPulseConfig {
    pub base_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for SendPulseConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// A chatbot as listed by `/chatbots/bots`. Fields other than the ones used
/// for selection are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(
        rename = "type",
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bot {
    /// Channel or type equal to `instagram`, or a name containing it, ignoring
    /// case.
    pub fn is_instagram(&self) -> bool {
        let equals = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case("instagram"))
        };
        equals(&self.channel)
            || equals(&self.kind)
            || self
                .name
                .as_deref()
                .is_some_and(|name| name.to_lowercase().contains("instagram"))
    }
}

/// First Instagram bot in listing order.
pub fn select_instagram_bot(bots: &[Bot]) -> Option<&Bot> {
    bots.iter().find(|bot| bot.is_instagram())
}

/// An Instagram contact of a bot, projected for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstagramSubscriber {
    pub contact_id: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub follower_count: u64,
    pub last_activity: Option<Value>,
}

impl InstagramSubscriber {
    /// Projects one `/instagram/contacts` entry. A field that is missing or
    /// of an unexpected type falls back to its default.
    pub fn from_contact(contact: &Value) -> Self {
        let data = contact.get("channel_data").unwrap_or(&Value::Null);
        let text = |key: &str| data.get(key).and_then(text_of);

        let full_name = [text("first_name"), text("last_name")]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let name = text("name").or((!full_name.is_empty()).then_some(full_name));

        Self {
            contact_id: contact.get("id").and_then(text_of).unwrap_or_default(),
            name,
            username: text("user_name"),
            avatar: text("profile_pic"),
            is_verified: data
                .get("is_verified_user")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            follower_count: data
                .get("follower_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            last_activity: contact
                .get("last_activity_at")
                .filter(|value| !value.is_null())
                .cloned(),
        }
    }
}

/// Items of a SendPulse list response, which wraps them in `data`. A missing
/// or non-array `data` lists nothing.
fn listing_items(listing: Value) -> Vec<Value> {
    match listing {
        Value::Object(mut fields) => match fields.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[derive(Debug)]
pub struct SendPulseClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    tokens: TokenCache,
}

impl SendPulseClient {
    pub fn new(http: reqwest::Client, config: SendPulseConfig, clock: Arc<dyn Clock>) -> Self {
        let credentials = config.client_id.zip(config.client_secret);
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            credentials,
            tokens: TokenCache::new(clock),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    /// A valid bearer token, exchanging credentials when the cached one is
    /// missing or inside its safety margin.
    pub async fn access_token(&self) -> ProviderResult<String> {
        self.tokens.get_or_refresh(|| self.exchange_credentials()).await
    }

    #[instrument(skip(self), fields(provider = %Provider::SendPulse))]
    async fn exchange_credentials(&self) -> ProviderResult<TokenGrant> {
        let (client_id, client_secret) =
            self.credentials
                .as_ref()
                .ok_or(ProviderError::NotConfigured {
                    provider: Provider::SendPulse,
                    missing: "SENDPULSE_CLIENT_ID and SENDPULSE_CLIENT_SECRET",
                })?;

        let response = self
            .http
            .post(format!("{}/oauth/access_token", self.base_url))
            .json(&json!({
                "grant_type": "client_credentials",
                "client_id": client_id,
                "client_secret": client_secret,
            }))
            .send()
            .await
            .map_err(transport(Provider::SendPulse))?;

        match read_json(Provider::SendPulse, response).await {
            Ok(body) => decode(Provider::SendPulse, body),
            Err(error) => {
                warn!(%error, "sendpulse token exchange failed");
                Err(error)
            }
        }
    }

    /// An authenticated API call. `endpoint` starts with `/`.
    #[instrument(skip(self, body), fields(provider = %Provider::SendPulse))]
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> ProviderResult<Value> {
        let token = self.access_token().await?;
        let mut request = self
            .http
            .request(method, format!("{}{endpoint}", self.base_url))
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport(Provider::SendPulse))?;
        read_json(Provider::SendPulse, response).await
    }

    /// Every chatbot on the account.
    pub async fn bots(&self) -> ProviderResult<Vec<Bot>> {
        let listing = self.request(Method::GET, "/chatbots/bots", None).await?;
        let bots: Vec<Bot> = listing_items(listing)
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(bot) => Some(bot),
                Err(error) => {
                    warn!(%error, "skipping unreadable sendpulse bot");
                    None
                }
            })
            .collect();
        debug!(bots = bots.len(), "sendpulse bots listed");
        Ok(bots)
    }

    pub async fn instagram_bots(&self) -> ProviderResult<Vec<Bot>> {
        let bots = self.bots().await?;
        Ok(bots.into_iter().filter(Bot::is_instagram).collect())
    }

    pub async fn instagram_bot(&self) -> ProviderResult<Option<Bot>> {
        let bots = self.bots().await?;
        Ok(select_instagram_bot(&bots).cloned())
    }

    /// Contacts of `bot_id`, fetched live.
    pub async fn instagram_contacts(
        &self,
        bot_id: &str,
    ) -> ProviderResult<Vec<InstagramSubscriber>> {
        let endpoint = format!("/instagram/contacts?bot_id={}", urlencoding::encode(bot_id));
        let listing = self.request(Method::GET, &endpoint, None).await?;
        Ok(listing_items(listing)
            .iter()
            .map(InstagramSubscriber::from_contact)
            .collect())
    }

    /// Sends a text message through the account's Instagram bot. Fails with
    /// [`ProviderError::NoInstagramBot`] without sending when there is none.
    pub async fn send_instagram(&self, contact_id: &str, text: &str) -> ProviderResult<Value> {
        let bot = self.instagram_bot().await?.ok_or(ProviderError::NoInstagramBot)?;
        let payload = json!({
            "contact_id": contact_id,
            "messages": [{ "type": "text", "message": { "text": text } }],
            "bot_id": bot.id,
        });
        let result = self
            .request(Method::POST, "/instagram/contacts/send", Some(&payload))
            .await?;
        info!(contact_id, bot_id = %bot.id, "instagram message sent");
        Ok(result)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(text_of(&Value::deserialize(deserializer)?))
}
