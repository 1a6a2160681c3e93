use relay_providers::ProviderError;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RelayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::Provider(error) => error.status(),
        }
    }

    pub fn detail(&self) -> Value {
        match self {
            Self::InvalidRequest(message) => Value::String(message.clone()),
            Self::Provider(error) => error.detail(),
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
