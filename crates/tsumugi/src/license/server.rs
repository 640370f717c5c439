use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client, Url,
};
use serde::Deserialize;

use super::SessionContext;
use crate::{base64::base64_decode, error::LicenseError};

pub const CONTENT_ID_HEADER: &str = "x-cr-content-id";
pub const VIDEO_TOKEN_HEADER: &str = "x-cr-video-token";

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    license: Option<String>,
    error: Option<serde_json::Value>,
}

/// The license endpoint of the streaming service.
#[derive(Debug, Clone)]
pub struct LicenseServer {
    client: Client,
    url: Url,
}

impl LicenseServer {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Posts a license challenge and returns the decoded license.
    ///
    /// Transport failures are reported as [`LicenseError::ServerError`] and
    /// are never retried here.
    pub async fn request(
        &self,
        challenge: &[u8],
        context: &SessionContext,
    ) -> Result<Vec<u8>, LicenseError> {
        let headers = context.headers()?;
        let response = self
            .client
            .post(self.url.clone())
            .headers(headers)
            .body(challenge.to_vec())
            .send()
            .await
            .map_err(|e| LicenseError::ServerError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LicenseError::ServerError(e.to_string()))?;

        match serde_json::from_str::<LicenseResponse>(&body) {
            Ok(LicenseResponse {
                error: Some(error), ..
            }) => {
                let reason = match error {
                    serde_json::Value::String(reason) => reason,
                    error => error.to_string(),
                };
                tracing::warn!("License denied with HTTP {status}: {reason}");
                Err(LicenseError::Denied(reason))
            }
            Ok(LicenseResponse {
                license: Some(license),
                ..
            }) if status.is_success() => base64_decode(license.trim())
                .map_err(|e| LicenseError::ServerError(format!("invalid license encoding: {e}"))),
            _ if status.is_success() => Err(LicenseError::ServerError(format!(
                "unexpected license response: {body}"
            ))),
            _ => Err(LicenseError::ServerError(format!("HTTP {status}: {body}"))),
        }
    }
}

impl SessionContext {
    /// Headers of one license request. Built per call, nothing is shared
    /// between sessions.
    pub fn headers(&self) -> Result<HeaderMap, LicenseError> {
        let value = |value: &str| {
            HeaderValue::from_str(value)
                .map_err(|e| LicenseError::ServerError(format!("invalid header value: {e}")))
        };

        let mut headers = HeaderMap::new();
        let mut authorization = value(&format!("Bearer {}", self.bearer))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_ID_HEADER, value(&self.content_id)?);
        headers.insert(VIDEO_TOKEN_HEADER, value(&self.video_token)?);
        Ok(headers)
    }
}
