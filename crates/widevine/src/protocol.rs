//! The subset of the Widevine license protocol used to request a license and
//! read its keys. Field tags follow `license_protocol.proto`. Unknown fields
//! are skipped when decoding, and messages this crate only forwards
//! (`ClientIdentification`) are kept as encoded bytes.

pub use prost::Message;

/// `SignedMessage.MessageType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    LicenseRequest = 1,
    License = 2,
    ErrorResponse = 3,
    ServiceCertificateRequest = 4,
    ServiceCertificate = 5,
}

impl MessageType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::LicenseRequest),
            2 => Some(Self::License),
            3 => Some(Self::ErrorResponse),
            4 => Some(Self::ServiceCertificateRequest),
            5 => Some(Self::ServiceCertificate),
            _ => None,
        }
    }
}

/// `License.KeyContainer.KeyType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Signing = 1,
    Content = 2,
    KeyControl = 3,
    OperatorSession = 4,
    Entitlement = 5,
    OemContent = 6,
}

impl KeyType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Signing),
            2 => Some(Self::Content),
            3 => Some(Self::KeyControl),
            4 => Some(Self::OperatorSession),
            5 => Some(Self::Entitlement),
            6 => Some(Self::OemContent),
            _ => None,
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
        }
    }
}

pub const LICENSE_TYPE_STREAMING: i32 = 1;
pub const REQUEST_TYPE_NEW: i32 = 1;
pub const PROTOCOL_VERSION_2_1: i32 = 21;

#[derive(Clone, PartialEq, Message)]
pub struct SignedMessage {
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub msg: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub signature: Option<Vec<u8>>,
    /// The license session key, encrypted with the device public key.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub session_key: Option<Vec<u8>>,
}

impl SignedMessage {
    pub fn message_type(&self) -> Option<MessageType> {
        self.r#type.and_then(MessageType::from_i32)
    }
}

/// Only used to check that a client id dump is what it claims to be.
#[derive(Clone, PartialEq, Message)]
pub struct ClientIdentification {
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
    /// Signed device certificate.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub token: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LicenseRequest {
    /// An encoded `ClientIdentification`, sent as it was dumped.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub client_id: Option<Vec<u8>>,
    #[prost(message, optional, tag = "2")]
    pub content_id: Option<ContentIdentification>,
    #[prost(int32, optional, tag = "3")]
    pub r#type: Option<i32>,
    #[prost(int64, optional, tag = "4")]
    pub request_time: Option<i64>,
    #[prost(int32, optional, tag = "6")]
    pub protocol_version: Option<i32>,
    #[prost(uint32, optional, tag = "7")]
    pub key_control_nonce: Option<u32>,
}

/// `LicenseRequest.ContentIdentification`, with the `widevine_pssh_data`
/// variant of its oneof.
#[derive(Clone, PartialEq, Message)]
pub struct ContentIdentification {
    #[prost(message, optional, tag = "1")]
    pub widevine_pssh_data: Option<WidevinePsshData>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WidevinePsshData {
    /// Init data of the `pssh` boxes, without the box header.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub pssh_data: Vec<Vec<u8>>,
    #[prost(int32, optional, tag = "2")]
    pub license_type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub request_id: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct License {
    #[prost(message, repeated, tag = "3")]
    pub key: Vec<KeyContainer>,
}

#[derive(Clone, PartialEq, Message)]
pub struct KeyContainer {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub id: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub iv: Option<Vec<u8>>,
    /// AES-128-CBC encrypted with the key derived from the session key.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub key: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "4")]
    pub r#type: Option<i32>,
}
