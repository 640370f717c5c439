use std::{fmt::Display, future::Future};

use crate::{error::TsumugiResult, mpd::ProtectionHeader};

/// Key types a Widevine license can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Signing,
    Content,
    KeyControl,
    OperatorSession,
    Entitlement,
    OemContent,
    Unknown,
}

impl KeyType {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "SIGNING" => Self::Signing,
            "CONTENT" => Self::Content,
            "KEY_CONTROL" => Self::KeyControl,
            "OPERATOR_SESSION" => Self::OperatorSession,
            "ENTITLEMENT" => Self::Entitlement,
            "OEM_CONTENT" => Self::OemContent,
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Signing => "SIGNING",
            Self::Content => "CONTENT",
            Self::KeyControl => "KEY_CONTROL",
            Self::OperatorSession => "OPERATOR_SESSION",
            Self::Entitlement => "ENTITLEMENT",
            Self::OemContent => "OEM_CONTENT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A key as reported by the CDM after a license was parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdmKey {
    /// Hex encoded key id.
    pub kid: Option<String>,
    pub key: Vec<u8>,
    pub r#type: KeyType,
}

/// Content decryption module.
///
/// A session is identified by the string returned from [`Cdm::open`] and must
/// be passed to [`Cdm::close`] exactly once.
pub trait Cdm {
    fn open(&self) -> impl Future<Output = TsumugiResult<String>> + Send;

    fn challenge(
        &self,
        session: &str,
        header: &ProtectionHeader,
    ) -> impl Future<Output = TsumugiResult<Vec<u8>>> + Send;

    fn parse_license(
        &self,
        session: &str,
        license: &[u8],
    ) -> impl Future<Output = TsumugiResult<()>> + Send;

    fn keys(&self, session: &str) -> impl Future<Output = TsumugiResult<Vec<CdmKey>>> + Send;

    fn close(&self, session: &str) -> impl Future<Output = TsumugiResult<()>> + Send;
}
