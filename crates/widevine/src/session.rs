use std::time::{SystemTime, UNIX_EPOCH};

use aes::Aes128;
use anyhow::{anyhow, bail, Context};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use cmac::{Cmac, Mac};
use sha1::{Digest, Sha1};

use crate::{
    device::Device,
    key::WidevineKey,
    protocol::{
        ContentIdentification, KeyContainer, KeyType, License, LicenseRequest, Message,
        MessageType, SignedMessage, WidevinePsshData, LICENSE_TYPE_STREAMING,
        PROTOCOL_VERSION_2_1, REQUEST_TYPE_NEW,
    },
    pssh,
};

/// One license exchange of a [`Device`].
///
/// The encoded request is kept once issued: the keys of the license are
/// wrapped with a key derived from it.
#[derive(Debug)]
pub struct Session {
    id: [u8; 16],
    number: u32,
    request: Option<Vec<u8>>,
    keys: Vec<WidevineKey>,
}

impl Session {
    pub(crate) fn new(number: u32) -> Self {
        Self {
            id: rand::random(),
            number,
            request: None,
            keys: Vec::new(),
        }
    }

    pub fn id(&self) -> String {
        hex::encode(self.id)
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// Builds and signs a streaming license request for a protection header.
    pub fn license_request(
        &mut self,
        device: &Device,
        header: &[u8],
    ) -> anyhow::Result<SignedMessage> {
        let init_data = pssh::init_data(header)?;
        let request_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or_default();

        let request = LicenseRequest {
            client_id: Some(device.client_id().to_vec()),
            content_id: Some(ContentIdentification {
                widevine_pssh_data: Some(WidevinePsshData {
                    pssh_data: vec![init_data],
                    license_type: Some(LICENSE_TYPE_STREAMING),
                    request_id: Some(self.request_id()),
                }),
            }),
            r#type: Some(REQUEST_TYPE_NEW),
            request_time: Some(request_time),
            protocol_version: Some(PROTOCOL_VERSION_2_1),
            key_control_nonce: Some(rand::random()),
        };

        let msg = request.encode_to_vec();
        let signature = device
            .sign(&Sha1::digest(&msg))
            .context("sign license request")?;
        self.request = Some(msg.clone());

        Ok(SignedMessage {
            r#type: Some(MessageType::LicenseRequest as i32),
            msg: Some(msg),
            signature: Some(signature),
            session_key: None,
        })
    }

    /// Random bytes, zeros, then the session number, upper-case hex encoded
    /// the way Android clients send it.
    fn request_id(&self) -> Vec<u8> {
        let mut id = [0u8; 16];
        id[0..4].copy_from_slice(&rand::random::<[u8; 4]>());
        id[8..16].copy_from_slice(&u64::from(self.number).to_le_bytes());
        hex::encode_upper(id).into_bytes()
    }

    /// Reads the keys of a license answering the request of this session.
    pub fn parse_license(&mut self, device: &Device, response: &[u8]) -> anyhow::Result<&[WidevineKey]> {
        let Some(context) = self.request.as_deref() else {
            bail!("no license request was issued in this session");
        };

        let message = SignedMessage::decode(response).context("license is not a SignedMessage")?;
        match message.message_type() {
            Some(MessageType::License) => {}
            Some(other) => bail!("expected a LICENSE message, got {other:?}"),
            None => bail!("expected a LICENSE message, got type {:?}", message.r#type),
        }
        let license = License::decode(message.msg.as_deref().unwrap_or_default())
            .context("license message is not a License")?;

        let session_key = device
            .decrypt(message.session_key.as_deref().unwrap_or_default())
            .context("decrypt session key")?;
        let encryption_key = derive_encryption_key(&session_key, context)?;

        self.keys = license
            .key
            .iter()
            .map(|container| decrypt_key(container, &encryption_key))
            .collect::<anyhow::Result<_>>()?;
        Ok(&self.keys)
    }

    pub fn keys(&self) -> &[WidevineKey] {
        &self.keys
    }
}

/// AES-CMAC key derivation of the license protocol, for the 128-bit key the
/// key containers are wrapped with.
pub(crate) fn derive_encryption_key(session_key: &[u8], request: &[u8]) -> anyhow::Result<[u8; 16]> {
    let mut cmac = Cmac::<Aes128>::new_from_slice(session_key)
        .map_err(|_| anyhow!("session key is {} bytes, expected 16", session_key.len()))?;
    cmac.update(&[1]);
    cmac.update(b"ENCRYPTION\x00");
    cmac.update(request);
    cmac.update(&128u32.to_be_bytes());

    let mut key = [0u8; 16];
    key.copy_from_slice(&cmac.finalize().into_bytes());
    Ok(key)
}

fn decrypt_key(container: &KeyContainer, encryption_key: &[u8; 16]) -> anyhow::Result<WidevineKey> {
    let id = container.id.clone().unwrap_or_default();
    let iv = container.iv.as_deref().unwrap_or_default();
    let decryptor = cbc::Decryptor::<Aes128>::new_from_slices(encryption_key, iv)
        .map_err(|_| anyhow!("key {} has a {} byte iv", hex::encode(&id), iv.len()))?;
    let key = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(container.key.as_deref().unwrap_or_default())
        .map_err(|_| anyhow!("key {} does not decrypt", hex::encode(&id)))?;

    Ok(WidevineKey {
        kind: container.r#type.and_then(KeyType::from_i32),
        id,
        key,
    })
}
