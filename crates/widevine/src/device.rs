use std::{
    io::{Cursor, Read},
    path::Path,
    sync::atomic::{AtomicU32, Ordering},
};

use anyhow::{bail, Context};
use byteorder::{BigEndian, ReadBytesExt};
use rsa::{
    pkcs1::DecodeRsaPrivateKey, pkcs8::DecodePrivateKey, Oaep, Pss, RsaPrivateKey, RsaPublicKey,
};

use crate::{
    protocol::{ClientIdentification, Message},
    session::Session,
};

/// The identity of one Widevine client: its client id blob and the RSA key
/// its device certificate was issued for.
pub struct Device {
    client_id: Vec<u8>,
    private_key: RsaPrivateKey,
    sessions: AtomicU32,
}

impl Device {
    pub fn new(client_id: Vec<u8>, private_key: RsaPrivateKey) -> anyhow::Result<Self> {
        let identification = ClientIdentification::decode(client_id.as_slice())
            .context("client id is not a ClientIdentification message")?;
        if identification.token.as_deref().unwrap_or_default().is_empty() {
            bail!("client id carries no device certificate");
        }

        Ok(Self {
            client_id,
            private_key,
            sessions: AtomicU32::new(0),
        })
    }

    /// Reads a device from an encoded client id and a PKCS#1 or PKCS#8 PEM key.
    pub fn from_pem(client_id: &[u8], private_key: &str) -> anyhow::Result<Self> {
        let private_key = RsaPrivateKey::from_pkcs1_pem(private_key)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(private_key))
            .context("private key is neither PKCS#1 nor PKCS#8 PEM")?;
        Self::new(client_id.to_vec(), private_key)
    }

    /// Reads a device dump such as `client_id.bin` and `private_key.pem`.
    pub fn from_files<P, Q>(client_id: P, private_key: Q) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let client_id_path = client_id.as_ref();
        let client_id = std::fs::read(client_id_path)
            .with_context(|| format!("read {}", client_id_path.display()))?;

        let private_key_path = private_key.as_ref();
        let private_key = std::fs::read_to_string(private_key_path)
            .with_context(|| format!("read {}", private_key_path.display()))?;

        Self::from_pem(&client_id, &private_key)
    }

    /// Reads a version 2 `.wvd` file.
    ///
    /// ```text
    /// "WVD" | version u8 | type u8 | security level u8 | flags u8
    ///       | key length u16 | DER private key | client id length u16 | client id
    /// ```
    pub fn from_wvd(data: &[u8]) -> anyhow::Result<Self> {
        let mut reader = Cursor::new(data);
        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic).context("truncated WVD header")?;
        if &magic != b"WVD" {
            bail!("not a WVD file");
        }
        let version = reader.read_u8()?;
        if version != 2 {
            bail!("unsupported WVD version {version}");
        }
        let _device_type = reader.read_u8()?;
        let _security_level = reader.read_u8()?;
        let _flags = reader.read_u8()?;

        let private_key = read_prefixed(&mut reader).context("truncated WVD private key")?;
        let client_id = read_prefixed(&mut reader).context("truncated WVD client id")?;

        let private_key = RsaPrivateKey::from_pkcs1_der(&private_key)
            .or_else(|_| RsaPrivateKey::from_pkcs8_der(&private_key))
            .context("WVD private key is neither PKCS#1 nor PKCS#8 DER")?;
        Self::new(client_id, private_key)
    }

    pub fn load_wvd<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_wvd(&data)
    }

    pub fn client_id(&self) -> &[u8] {
        &self.client_id
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Opens a new session. Sessions are numbered from 1 per device.
    pub fn open(&self) -> Session {
        let number = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        Session::new(number)
    }

    pub(crate) fn decrypt(&self, input: &[u8]) -> Result<Vec<u8>, rsa::Error> {
        let padding = Oaep::new::<sha1::Sha1>();
        self.private_key.decrypt(padding, input)
    }

    /// Signs a SHA-1 digest.
    pub(crate) fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, rsa::Error> {
        let mut rng = rand::thread_rng();
        let padding = Pss::new_blinded::<sha1::Sha1>();
        self.private_key.sign_with_rng(&mut rng, padding, digest)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("client_id", &format_args!("{} bytes", self.client_id.len()))
            .finish_non_exhaustive()
    }
}

fn read_prefixed(reader: &mut Cursor<&[u8]>) -> anyhow::Result<Vec<u8>> {
    let length = reader.read_u16::<BigEndian>()? as usize;
    let mut data = vec![0u8; length];
    reader.read_exact(&mut data)?;
    Ok(data)
}
