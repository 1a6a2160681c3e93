//! # relay-kernel: the relay as one value
//!
//! [`RelayBuilder`] wires the event buffer, the provider clients and the Bale
//! contact directory into a cheaply cloneable [`Relay`]. Inbound webhooks go
//! through [`Relay::ingest`]; outbound sends go through the `send_*` adapters,
//! which publish an outgoing event only after the provider accepted it.

pub mod directory;
pub mod error;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use relay_events::{DEFAULT_CAPACITY, EventBuffer, Subscription};
use relay_normalize::{Normalized, normalize};
use relay_protocol::{Contact, Event, Platform};
use relay_providers::{
    BaleClient, BaleConfig, Bot, Clock, DEFAULT_TIMEOUT, InstagramSubscriber, Provider,
    ProviderResult, SendPulseClient, SendPulseConfig, SystemClock, UltraMsgClient, UltraMsgConfig,
    http_client,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

pub use directory::ContactDirectory;
pub use error::{RelayError, RelayResult};

#[derive(Debug, Clone)]
pub struct RelayBuilder {
    buffer_capacity: usize,
    request_timeout: Duration,
    ultramsg: UltraMsgConfig,
    sendpulse: SendPulseConfig,
    bale: BaleConfig,
    bale_webhook_url: Option<String>,
    clock: Arc<dyn Clock>,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayBuilder {
    pub fn new() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            request_timeout: DEFAULT_TIMEOUT,
            ultramsg: UltraMsgConfig::default(),
            sendpulse: SendPulseConfig::default(),
            bale: BaleConfig::default(),
            bale_webhook_url: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn ultramsg(mut self, config: UltraMsgConfig) -> Self {
        self.ultramsg = config;
        self
    }

    pub fn sendpulse(mut self, config: SendPulseConfig) -> Self {
        self.sendpulse = config;
        self
    }

    pub fn bale(mut self, config: BaleConfig) -> Self {
        self.bale = config;
        self
    }

    /// Public URL of this relay's Bale webhook. When set it is registered at
    /// startup and overrides any URL passed to [`Relay::set_bale_webhook`].
    pub fn bale_webhook_url(mut self, url: Option<String>) -> Self {
        self.bale_webhook_url = url.filter(|url| !url.is_empty());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> RelayResult<Relay> {
        let http = http_client(self.request_timeout)?;
        let inner = RelayInner {
            buffer: EventBuffer::new(self.buffer_capacity),
            contacts: ContactDirectory::default(),
            ultramsg: UltraMsgClient::new(http.clone(), self.ultramsg),
            sendpulse: SendPulseClient::new(http.clone(), self.sendpulse, self.clock),
            bale: BaleClient::new(http, self.bale),
            bale_webhook_url: self.bale_webhook_url,
        };
        Ok(Relay {
            inner: Arc::new(inner),
        })
    }
}

#[derive(Debug)]
struct RelayInner {
    buffer: EventBuffer,
    contacts: ContactDirectory,
    ultramsg: UltraMsgClient,
    sendpulse: SendPulseClient,
    bale: BaleClient,
    bale_webhook_url: Option<String>,
}

/// Live Instagram contacts of the account's Instagram bot.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramSubscribers {
    pub bot: Option<Bot>,
    pub subscribers: Vec<InstagramSubscriber>,
}

#[derive(Debug, Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

impl Relay {
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }

    /// Normalizes a webhook delivery received on `platform`'s endpoint,
    /// records any Bale contact it names and publishes the event.
    #[instrument(skip(self, platform, raw), fields(endpoint = %platform))]
    pub fn ingest(&self, platform: Platform, raw: Value) -> Arc<Event> {
        let Normalized { event, contact } = normalize(raw, platform);
        if let Some(contact) = contact {
            let id = contact.id.clone();
            if self.inner.contacts.upsert(contact) {
                info!(contact_id = %id, known = self.inner.contacts.len(), "bale contact learned");
            }
        }

        let event = self.inner.buffer.publish(event);
        info!(
            platform = %event.platform,
            from = %event.from,
            body = %event.body,
            kind = event.kind.as_deref().unwrap_or_default(),
            viewers = self.inner.buffer.subscriber_count(),
            "webhook received"
        );
        if let Some(raw) = &event.raw {
            debug!(%raw, "webhook payload");
        }
        event
    }

    #[instrument(skip(self, body))]
    pub async fn send_whatsapp(&self, to: &str, body: &str) -> RelayResult<Value> {
        require(to, body, "Parameters 'to' and 'body' are required.")?;
        self.deliver(Provider::UltraMsg, to, body, self.inner.ultramsg.send_chat(to, body))
            .await
    }

    #[instrument(skip(self, message))]
    pub async fn send_instagram(&self, contact_id: &str, message: &str) -> RelayResult<Value> {
        require(contact_id, message, CONTACT_AND_MESSAGE)?;
        let call = self.inner.sendpulse.send_instagram(contact_id, message);
        self.deliver(Provider::SendPulse, contact_id, message, call)
            .await
    }

    #[instrument(skip(self, message))]
    pub async fn send_bale(&self, contact_id: &str, message: &str) -> RelayResult<Value> {
        require(contact_id, message, CONTACT_AND_MESSAGE)?;
        let call = self.inner.bale.send_message(contact_id, message);
        self.deliver(Provider::Bale, contact_id, message, call).await
    }

    /// Awaits a provider send and publishes the outgoing event on success.
    async fn deliver(
        &self,
        provider: Provider,
        to: &str,
        body: &str,
        call: impl Future<Output = ProviderResult<Value>>,
    ) -> RelayResult<Value> {
        match call.await {
            Ok(response) => {
                let event = Event::outgoing(provider.platform(), to, body, response.clone());
                self.inner.buffer.publish(event);
                Ok(response)
            }
            Err(error) => Err(logged(provider, "send", error.into())),
        }
    }

    pub async fn instagram_bots(&self) -> RelayResult<Vec<Bot>> {
        self.inner
            .sendpulse
            .instagram_bots()
            .await
            .map_err(|error| logged(Provider::SendPulse, "list_bots", error.into()))
    }

    /// Contacts of the first Instagram bot, fetched live. An account without
    /// an Instagram bot yields no bot and no subscribers.
    pub async fn instagram_subscribers(&self) -> RelayResult<InstagramSubscribers> {
        self.fetch_instagram_subscribers()
            .await
            .map_err(|error| logged(Provider::SendPulse, "list_subscribers", error.into()))
    }

    async fn fetch_instagram_subscribers(&self) -> ProviderResult<InstagramSubscribers> {
        let sendpulse = &self.inner.sendpulse;
        let Some(bot) = sendpulse.instagram_bot().await? else {
            info!("no instagram bot configured");
            return Ok(InstagramSubscribers {
                bot: None,
                subscribers: Vec::new(),
            });
        };
        let subscribers = sendpulse.instagram_contacts(&bot.id).await?;
        debug!(bot_id = %bot.id, subscribers = subscribers.len(), "instagram subscribers fetched");
        Ok(InstagramSubscribers {
            bot: Some(bot),
            subscribers,
        })
    }

    pub async fn bale_get_me(&self) -> RelayResult<Value> {
        self.inner
            .bale
            .get_me()
            .await
            .map_err(|error| logged(Provider::Bale, "get_me", error.into()))
    }

    /// Registers the Bale webhook. A configured webhook URL takes precedence
    /// over `requested`.
    pub async fn set_bale_webhook(&self, requested: Option<&str>) -> RelayResult<Value> {
        let url = self
            .inner
            .bale_webhook_url
            .as_deref()
            .or(requested.filter(|url| !url.is_empty()))
            .ok_or_else(|| RelayError::invalid("Missing 'url' (body) or BALE_WEBHOOK_URL env"))?;
        self.inner
            .bale
            .set_webhook(url)
            .await
            .map_err(|error| logged(Provider::Bale, "set_webhook", error.into()))
    }

    pub async fn bale_webhook_info(&self) -> RelayResult<Value> {
        self.inner
            .bale
            .webhook_info()
            .await
            .map_err(|error| logged(Provider::Bale, "webhook_info", error.into()))
    }

    pub fn bale_contacts(&self) -> Vec<Contact> {
        self.inner.contacts.list()
    }

    pub fn subscribe(&self) -> Subscription {
        self.inner.buffer.subscribe()
    }

    pub fn recent_events(&self) -> Vec<Arc<Event>> {
        self.inner.buffer.snapshot()
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.inner.ultramsg.instance_id()
    }

    /// Best-effort startup work: acquire a SendPulse token and register the
    /// configured Bale webhook. Failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn warm_up(&self) {
        if self.inner.sendpulse.is_configured() {
            match self.inner.sendpulse.access_token().await {
                Ok(_) => info!("sendpulse token ready"),
                Err(error) => {
                    warn!(%error, detail = %error.detail(), "sendpulse token warm-up failed")
                }
            }
        } else {
            debug!("sendpulse credentials not set, skipping token warm-up");
        }

        match &self.inner.bale_webhook_url {
            Some(url) => match self.inner.bale.set_webhook(url).await {
                Ok(result) => info!(%url, %result, "bale webhook registered at startup"),
                Err(error) => {
                    warn!(
                        %url,
                        %error,
                        detail = %error.detail(),
                        "bale webhook registration failed"
                    )
                }
            },
            None => info!("BALE_WEBHOOK_URL not set, skipping webhook registration"),
        }
    }
}

const CONTACT_AND_MESSAGE: &str = "Parameters 'contact_id' and 'message' are required.";

fn require(destination: &str, body: &str, message: &str) -> RelayResult<()> {
    if destination.is_empty() || body.is_empty() {
        return Err(RelayError::invalid(message));
    }
    Ok(())
}

fn logged(provider: Provider, operation: &'static str, error: RelayError) -> RelayError {
    warn!(
        %provider,
        operation,
        status = error.status(),
        detail = %error.detail(),
        %error,
        "provider call failed"
    );
    error
}
