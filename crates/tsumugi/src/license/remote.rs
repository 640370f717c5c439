use reqwest::{header::HeaderValue, Client, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use super::cdm::{Cdm, CdmKey, KeyType};
use crate::{
    base64::{base64_decode, base64_encode},
    error::{TsumugiError, TsumugiResult},
    mpd::ProtectionHeader,
};

pub const SECRET_HEADER: &str = "X-Secret-Key";

/// A CDM hosted by a remote CDM service (the `pywidevine serve` API).
///
/// The device keys never leave that service. This client only relays the
/// challenge and the license.
#[derive(Debug, Clone)]
pub struct RemoteCdm {
    client: Client,
    host: Url,
    device: String,
    secret: HeaderValue,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: u16,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct OpenData {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ChallengeData {
    challenge_b64: String,
}

#[derive(Debug, Deserialize)]
struct KeysData {
    keys: Vec<RemoteKey>,
}

#[derive(Debug, Deserialize)]
struct RemoteKey {
    key_id: Option<String>,
    key: String,
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ChallengeRequest<'a> {
    session_id: &'a str,
    init_data: String,
    privacy_mode: bool,
}

impl RemoteCdm {
    pub fn new(client: Client, host: &str, device: &str, secret: &str) -> TsumugiResult<Self> {
        // keep the last path segment of the host when joining
        let host = if host.ends_with('/') {
            Url::parse(host)?
        } else {
            Url::parse(&format!("{host}/"))?
        };
        let mut secret = HeaderValue::from_str(secret)?;
        secret.set_sensitive(true);

        Ok(Self {
            client,
            host,
            device: device.to_string(),
            secret,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    fn endpoint(&self, path: &str) -> TsumugiResult<Url> {
        Ok(self.host.join(&format!("{}/{path}", self.device))?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> TsumugiResult<Option<T>> {
        let request = self
            .client
            .get(self.endpoint(path)?)
            .header(SECRET_HEADER, self.secret.clone());
        Self::unwrap_envelope(path, request).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> TsumugiResult<Option<T>> {
        let request = self
            .client
            .post(self.endpoint(path)?)
            .header(SECRET_HEADER, self.secret.clone())
            .json(body);
        Self::unwrap_envelope(path, request).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        path: &str,
        request: reqwest::RequestBuilder,
    ) -> TsumugiResult<Option<T>> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => return Err(e.into()),
            Err(_) => {
                return Err(TsumugiError::CdmError(format!(
                    "{path}: HTTP {status}: {body}"
                )))
            }
        };
        if !status.is_success() || envelope.status != 200 {
            return Err(TsumugiError::CdmError(format!(
                "{path}: {} {}",
                envelope.status, envelope.message
            )));
        }
        tracing::debug!("Remote CDM {path}: {}", envelope.message);
        Ok(envelope.data)
    }
}

fn missing_data(path: &str) -> TsumugiError {
    TsumugiError::CdmError(format!("{path}: response carries no data"))
}

impl Cdm for RemoteCdm {
    async fn open(&self) -> TsumugiResult<String> {
        let data: OpenData = self.get("open").await?.ok_or_else(|| missing_data("open"))?;
        Ok(data.session_id)
    }

    async fn challenge(&self, session: &str, header: &ProtectionHeader) -> TsumugiResult<Vec<u8>> {
        let path = "get_license_challenge/STREAMING";
        let body = ChallengeRequest {
            session_id: session,
            init_data: header.to_base64(),
            privacy_mode: true,
        };
        let data: ChallengeData = self
            .post(path, &body)
            .await?
            .ok_or_else(|| missing_data(path))?;
        Ok(base64_decode(&data.challenge_b64)?)
    }

    async fn parse_license(&self, session: &str, license: &[u8]) -> TsumugiResult<()> {
        let body = json!({
            "session_id": session,
            "license_message": base64_encode(license),
        });
        self.post::<serde_json::Value>("parse_license", &body)
            .await?;
        Ok(())
    }

    async fn keys(&self, session: &str) -> TsumugiResult<Vec<CdmKey>> {
        let path = "get_keys/ALL";
        let data: KeysData = self
            .post(path, &json!({ "session_id": session }))
            .await?
            .ok_or_else(|| missing_data(path))?;

        data.keys
            .into_iter()
            .map(|key| {
                Ok(CdmKey {
                    kid: key.key_id,
                    key: hex::decode(&key.key)
                        .map_err(|e| TsumugiError::CdmError(format!("invalid key: {e}")))?,
                    r#type: KeyType::from_name(&key.r#type),
                })
            })
            .collect()
    }

    async fn close(&self, session: &str) -> TsumugiResult<()> {
        self.get::<serde_json::Value>(&format!("close/{session}"))
            .await?;
        Ok(())
    }
}
