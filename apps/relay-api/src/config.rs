use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use relay_kernel::{Relay, RelayBuilder};
use relay_providers::{BaleConfig, SendPulseConfig, UltraMsgConfig, bale, sendpulse, ultramsg};

#[derive(Debug, Parser)]
#[command(name = "chatrelay")]
#[command(about = "Relay WhatsApp, Instagram and Bale messages to a live event stream")]
pub struct Cli {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "ULTRAMSG_INSTANCE_ID")]
    pub ultramsg_instance_id: Option<String>,
    #[arg(long, env = "ULTRAMSG_TOKEN", hide_env_values = true)]
    pub ultramsg_token: Option<String>,
    #[arg(long, env = "ULTRAMSG_BASE_URL", default_value = ultramsg::DEFAULT_BASE_URL)]
    pub ultramsg_base_url: String,

    #[arg(long, env = "SENDPULSE_CLIENT_ID")]
    pub sendpulse_client_id: Option<String>,
    #[arg(long, env = "SENDPULSE_CLIENT_SECRET", hide_env_values = true)]
    pub sendpulse_client_secret: Option<String>,
    #[arg(long, env = "SENDPULSE_BASE_URL", default_value = sendpulse::DEFAULT_BASE_URL)]
    pub sendpulse_base_url: String,

    #[arg(long, env = "BALE_TOKEN", hide_env_values = true)]
    pub bale_token: Option<String>,
    #[arg(long, env = "BALE_API_BASE", default_value = bale::DEFAULT_API_BASE)]
    pub bale_api_base: String,
    /// Public URL of `/bale/webhook`, registered with Bale at startup.
    #[arg(long, env = "BALE_WEBHOOK_URL")]
    pub bale_webhook_url: Option<String>,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 10)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "BUFFER_CAPACITY", default_value_t = 200)]
    pub buffer_capacity: usize,
}

impl Cli {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn relay_builder(&self) -> RelayBuilder {
        Relay::builder()
            .buffer_capacity(self.buffer_capacity)
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .ultramsg(UltraMsgConfig {
                base_url: self.ultramsg_base_url.clone(),
                instance_id: self.ultramsg_instance_id.clone(),
                token: self.ultramsg_token.clone(),
            })
            .sendpulse(SendPulseConfig {
                base_url: self.sendpulse_base_url.clone(),
                client_id: self.sendpulse_client_id.clone(),
                client_secret: self.sendpulse_client_secret.clone(),
            })
            .bale(BaleConfig {
                api_base: self.bale_api_base.clone(),
                token: self.bale_token.clone(),
            })
            .bale_webhook_url(self.bale_webhook_url.clone())
    }
}

/// Env file for the deployment environment named by `APP_ENV`.
pub fn env_file_name(app_env: Option<&str>) -> &'static str {
    match app_env {
        Some("production") => ".env.production",
        _ => ".env",
    }
}

/// Loads the env file into the process environment. Variables already set
/// win; a missing file is not an error.
pub fn load_env_file() -> Option<PathBuf> {
    let app_env = std::env::var("APP_ENV").ok();
    dotenvy::from_filename(env_file_name(app_env.as_deref())).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_selects_its_own_env_file() {
        assert_eq!(env_file_name(Some("production")), ".env.production");
        assert_eq!(env_file_name(Some("staging")), ".env");
        assert_eq!(env_file_name(None), ".env");
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "chatrelay",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
            "--ultramsg-instance-id",
            "instance9",
            "--bale-webhook-url",
            "https://relay.example/bale/webhook",
            "--buffer-capacity",
            "50",
        ])
        .unwrap();

        assert_eq!(cli.listen_addr(), "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(cli.ultramsg_instance_id.as_deref(), Some("instance9"));
        assert_eq!(cli.buffer_capacity, 50);
        assert_eq!(cli.request_timeout_secs, 10);

        let relay = cli.relay_builder().build().unwrap();
        assert_eq!(relay.instance_id(), Some("instance9"));
    }
}
