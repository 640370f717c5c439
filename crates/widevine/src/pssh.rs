use std::io::{Cursor, Read};

use anyhow::{bail, Context};
use byteorder::{BigEndian, ReadBytesExt};

pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

/// A `pssh` box (ISO/IEC 23001-7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshBox {
    pub version: u8,
    pub system_id: [u8; 16],
    /// Only version 1 boxes list their key ids.
    pub kids: Vec<[u8; 16]>,
    pub data: Vec<u8>,
}

impl PsshBox {
    pub fn is_widevine(&self) -> bool {
        self.system_id == WIDEVINE_SYSTEM_ID
    }
}

impl TryFrom<&[u8]> for PsshBox {
    type Error = anyhow::Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        if value.len() < 8 || &value[4..8] != b"pssh" {
            bail!("not a pssh box");
        }

        let mut reader = Cursor::new(value);
        let size = reader.read_u32::<BigEndian>()? as usize;
        if size > value.len() {
            bail!("pssh box claims {size} bytes, {} available", value.len());
        }
        reader.set_position(8);

        let version = reader.read_u8()?;
        reader.read_u24::<BigEndian>()?; // flags
        let mut system_id = [0u8; 16];
        reader.read_exact(&mut system_id)?;

        let mut kids = Vec::new();
        if version > 0 {
            let kid_count = reader.read_u32::<BigEndian>()?;
            for _ in 0..kid_count {
                let mut kid = [0u8; 16];
                reader.read_exact(&mut kid).context("truncated key id list")?;
                kids.push(kid);
            }
        }

        let data_size = reader.read_u32::<BigEndian>()? as usize;
        let remaining = value.len() - reader.position() as usize;
        if data_size > remaining {
            bail!("pssh data claims {data_size} bytes, {remaining} available");
        }
        let mut data = vec![0u8; data_size];
        reader.read_exact(&mut data)?;

        Ok(Self {
            version,
            system_id,
            kids,
            data,
        })
    }
}

/// The init data a license request carries for a protection header.
///
/// Manifests usually hold a whole `pssh` box, some only its payload. A box of
/// another DRM system is refused.
pub fn init_data(header: &[u8]) -> anyhow::Result<Vec<u8>> {
    if header.len() < 8 || &header[4..8] != b"pssh" {
        if header.is_empty() {
            bail!("empty protection header");
        }
        return Ok(header.to_vec());
    }

    let pssh = PsshBox::try_from(header)?;
    if !pssh.is_widevine() {
        bail!("pssh box of system {} is not Widevine", hex::encode(pssh.system_id));
    }
    Ok(pssh.data)
}

#[cfg(test)]
pub(crate) fn build_box(version: u8, system_id: [u8; 16], kids: &[[u8; 16]], data: &[u8]) -> Vec<u8> {
    let mut body = vec![version, 0, 0, 0];
    body.extend_from_slice(&system_id);
    if version > 0 {
        body.extend_from_slice(&(kids.len() as u32).to_be_bytes());
        for kid in kids {
            body.extend_from_slice(kid);
        }
    }
    body.extend_from_slice(&(data.len() as u32).to_be_bytes());
    body.extend_from_slice(data);

    let mut pssh = ((body.len() + 8) as u32).to_be_bytes().to_vec();
    pssh.extend_from_slice(b"pssh");
    pssh.extend(body);
    pssh
}
