use std::{ops::Deref, time::Duration};

use bytes::Bytes;
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, IntoUrl,
};

use crate::error::{TsumugiError, TsumugiResult};

/// Who a client claims to be. Manifest, fragment and catalog requests are sent
/// with different identities, so each purpose gets its own client built from
/// one of these.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub bearer: Option<String>,
    pub timeout: Duration,
}

impl ClientIdentity {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            bearer: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// A desktop Chrome identity, used for fragment downloads.
    pub fn browser() -> Self {
        Self::new(get_chrome_rua())
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(identity: &ClientIdentity) -> TsumugiResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &identity.bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(identity.user_agent.as_str())
            .timeout(identity.timeout)
            .build()?;
        Ok(Self { client })
    }

    /// GET a resource and return its body, treating any non-success status as
    /// an error.
    pub async fn fetch_bytes(&self, url: impl IntoUrl) -> TsumugiResult<Bytes> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(TsumugiError::HttpError(status));
        }

        Ok(response.bytes().await?)
    }

    pub async fn fetch_text(&self, url: impl IntoUrl) -> TsumugiResult<String> {
        let bytes = self.fetch_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
