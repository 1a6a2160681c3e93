//! Bale bot API (`{api_base}/bot{token}/{method}`).

use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::Provider;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{read_json, transport};

pub const DEFAULT_API_BASE: &str = "https://tapi.bale.ai";

#[derive(Debug, Clone)]
pub struct BaleConfig {
    pub api_base: String,
    pub token: Option<String>,
}

impl Default for BaleConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_owned(),
            token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BaleClient {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl BaleClient {
    pub fn new(http: reqwest::Client, config: BaleConfig) -> Self {
        Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            token: config.token,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    fn method_url(&self, method: &str) -> ProviderResult<String> {
        let token = self.token.as_deref().ok_or(ProviderError::NotConfigured {
            provider: Provider::Bale,
            missing: "BALE_TOKEN",
        })?;
        Ok(format!(
            "{}/bot{}/{method}",
            self.api_base,
            urlencoding::encode(token)
        ))
    }

    /// Invokes a bot API method with a JSON payload and returns the reply.
    #[instrument(skip(self, payload), fields(provider = %Provider::Bale))]
    pub async fn call(&self, method: &str, payload: &Value) -> ProviderResult<Value> {
        let url = self.method_url(method)?;
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(transport(Provider::Bale))?;
        read_json(Provider::Bale, response).await
    }

    pub async fn get_me(&self) -> ProviderResult<Value> {
        self.call("getMe", &json!({})).await
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> ProviderResult<Value> {
        let result = self
            .call("sendMessage", &json!({ "chat_id": chat_id, "text": text }))
            .await?;
        info!(chat_id, "bale message sent");
        Ok(result)
    }

    pub async fn set_webhook(&self, url: &str) -> ProviderResult<Value> {
        let result = self.call("setWebhook", &json!({ "url": url })).await?;
        info!(url, "bale webhook registered");
        Ok(result)
    }

    pub async fn webhook_info(&self) -> ProviderResult<Value> {
        self.call("getWebhookInfo", &json!({})).await
    }
}
