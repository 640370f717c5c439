//! License exchange: turns the protection header of a manifest into a content
//! key.
//!
//! ```text
//! Opened → ChallengeIssued → LicenseParsed → KeysExtracted → Closed
//!    │            │                │               │            ▲
//!    └────────────┴────────────────┴───────────────┴────────────┘
//!                         (any failure)
//! ```
//!
//! One CDM session is opened per exchange and it is closed on every exit path.

mod cdm;
mod local;
mod remote;
mod server;

use std::fmt::Display;

pub use cdm::{Cdm, CdmKey, KeyType};
pub use local::LocalCdm;
pub use remote::RemoteCdm;
pub use server::{LicenseServer, CONTENT_ID_HEADER, VIDEO_TOKEN_HEADER};

use crate::{
    error::{LicenseError, TsumugiError},
    mpd::ProtectionHeader,
};

/// Per-request credentials of the license server.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub bearer: String,
    /// Content GUID of the episode.
    pub content_id: String,
    /// Playback token taken from the manifest URL.
    pub video_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKey {
    pub kid: Option<String>,
    pub key: Vec<u8>,
    pub key_type: KeyType,
}

impl ContentKey {
    /// The key as expected by `ffmpeg -decryption_key`.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }
}

impl From<CdmKey> for ContentKey {
    fn from(key: CdmKey) -> Self {
        Self {
            kid: key.kid,
            key: key.key,
            key_type: key.r#type,
        }
    }
}

impl Display for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}:{}",
            self.key_type,
            self.kid.as_deref().unwrap_or("-"),
            self.to_hex()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opened,
    ChallengeIssued,
    LicenseParsed,
    KeysExtracted,
    Closed,
}

struct LicenseSession {
    id: String,
    state: SessionState,
}

impl LicenseSession {
    fn advance(&mut self, state: SessionState) {
        tracing::debug!("License session {}: {:?} -> {:?}", self.id, self.state, state);
        self.state = state;
    }
}

pub struct LicenseExchange<C> {
    cdm: C,
    server: LicenseServer,
}

impl<C: Cdm + Sync> LicenseExchange<C> {
    pub fn new(cdm: C, server: LicenseServer) -> Self {
        Self { cdm, server }
    }

    pub fn cdm(&self) -> &C {
        &self.cdm
    }

    /// Runs one full license exchange and returns the first CONTENT key.
    pub async fn acquire_key(
        &self,
        header: &ProtectionHeader,
        context: &SessionContext,
    ) -> Result<ContentKey, LicenseError> {
        let id = self.cdm.open().await.map_err(cdm_error)?;
        let mut session = LicenseSession {
            id,
            state: SessionState::Opened,
        };

        let result = self.exchange(&mut session, header, context).await;

        if let Err(e) = self.cdm.close(&session.id).await {
            tracing::warn!("Failed to close license session {}: {e}", session.id);
        }
        session.advance(SessionState::Closed);

        result
    }

    async fn exchange(
        &self,
        session: &mut LicenseSession,
        header: &ProtectionHeader,
        context: &SessionContext,
    ) -> Result<ContentKey, LicenseError> {
        let challenge = self
            .cdm
            .challenge(&session.id, header)
            .await
            .map_err(cdm_error)?;
        session.advance(SessionState::ChallengeIssued);

        let license = self.server.request(&challenge, context).await?;
        self.cdm
            .parse_license(&session.id, &license)
            .await
            .map_err(cdm_error)?;
        session.advance(SessionState::LicenseParsed);

        let keys = self.cdm.keys(&session.id).await.map_err(cdm_error)?;
        session.advance(SessionState::KeysExtracted);

        keys.into_iter()
            .find(|key| key.r#type == KeyType::Content)
            .map(ContentKey::from)
            .ok_or(LicenseError::NoContentKey)
    }
}

fn cdm_error(error: TsumugiError) -> LicenseError {
    LicenseError::Cdm(error.to_string())
}
