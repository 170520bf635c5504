use crate::error::ProviderError;
use reqwest::{Client, Response};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1/";
pub const DEFAULT_CREDENTIAL_VAR: &str = "OPENAI_API_KEY";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const BACKEND: &str = "openai";

/// Where the provider API key comes from. `Env` is read on every use so a
/// key added to the environment after startup is picked up.
#[derive(Debug, Clone)]
pub enum Credentials {
    Env(String),
    Fixed(String),
}

impl Credentials {
    pub fn from_env(var: impl Into<String>) -> Self {
        Credentials::Env(var.into())
    }

    pub fn fixed(key: impl Into<String>) -> Self {
        Credentials::Fixed(key.into())
    }

    pub fn resolve(&self) -> Result<String, ProviderError> {
        let (value, source) = match self {
            Credentials::Env(var) => (std::env::var(var).ok(), var.as_str()),
            Credentials::Fixed(key) => (Some(key.clone()), "an api key"),
        };

        value
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ProviderError::MissingCredential(source.to_string()))
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials::from_env(DEFAULT_CREDENTIAL_VAR)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_base: Url,
    pub credentials: Credentials,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    pub fn new(api_base: &str, credentials: Credentials) -> Result<Self, ProviderError> {
        Ok(Self {
            api_base: parse_api_base(api_base)?,
            credentials,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: Duration::from_secs(120),
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        Ok(self.api_base.join(path)?)
    }

    pub(crate) fn http_client(&self) -> Result<Client, ProviderError> {
        Ok(Client::builder().timeout(self.request_timeout).build()?)
    }
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn parse_api_base(raw: &str) -> Result<Url, ProviderError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

pub(crate) async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let details = response
        .text()
        .await
        .unwrap_or_else(|error| format!("<unreadable body: {error}>"));

    Err(ProviderError::BackendResponse {
        backend: BACKEND.to_string(),
        status: status.as_u16(),
        details,
    })
}

pub(crate) fn malformed(details: impl Into<String>) -> ProviderError {
    ProviderError::MalformedResponse {
        backend: BACKEND.to_string(),
        details: details.into(),
    }
}
