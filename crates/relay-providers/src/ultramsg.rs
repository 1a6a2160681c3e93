//! UltraMSG WhatsApp gateway.

use serde_json::Value;
use tracing::{info, instrument};

use crate::Provider;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{read_json, transport};

pub const DEFAULT_BASE_URL: &str = "https://api.ultramsg.com";

#[derive(Debug, Clone)]
pub struct UltraMsgConfig {
    pub base_url: String,
    pub instance_id: Option<String>,
    pub token: Option<String>,
}

impl Default for UltraMsgConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            instance_id: None,
            token: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UltraMsgClient {
    http: reqwest::Client,
    base_url: String,
    instance_id: Option<String>,
    token: Option<String>,
}

impl UltraMsgClient {
    pub fn new(http: reqwest::Client, config: UltraMsgConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            instance_id: config.instance_id,
            token: config.token,
        }
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// Sends a text message. The instance's JSON reply is returned as-is.
    #[instrument(skip(self, body), fields(provider = %Provider::UltraMsg))]
    pub async fn send_chat(&self, to: &str, body: &str) -> ProviderResult<Value> {
        let instance_id = self.instance_id.as_deref().ok_or(ProviderError::NotConfigured {
            provider: Provider::UltraMsg,
            missing: "ULTRAMSG_INSTANCE_ID",
        })?;
        let token = self.token.as_deref().ok_or(ProviderError::NotConfigured {
            provider: Provider::UltraMsg,
            missing: "ULTRAMSG_TOKEN",
        })?;

        let url = format!("{}/{instance_id}/messages/chat", self.base_url);
        let response = self
            .http
            .post(url)
            .form(&[("token", token), ("to", to), ("body", body)])
            .send()
            .await
            .map_err(transport(Provider::UltraMsg))?;

        let result = read_json(Provider::UltraMsg, response).await?;
        info!(to, "whatsapp message sent");
        Ok(result)
    }
}
