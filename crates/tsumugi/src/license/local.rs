use std::{
    collections::HashMap,
    fmt::Display,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use tsumugi_widevine::{protocol::Message, Device, Session};

use super::cdm::{Cdm, CdmKey, KeyType};
use crate::{
    error::{TsumugiError, TsumugiResult},
    mpd::ProtectionHeader,
};

/// A Widevine CDM running in-process on a dumped device.
#[derive(Debug)]
pub struct LocalCdm {
    device: Device,
    sessions: Mutex<HashMap<String, Session>>,
}

fn cdm_error(e: impl Display) -> TsumugiError {
    TsumugiError::CdmError(format!("{e:#}"))
}

impl LocalCdm {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Loads `client_id.bin` and `private_key.pem` style dumps.
    pub fn from_files(client_id: &Path, private_key: &Path) -> TsumugiResult<Self> {
        let device = Device::from_files(client_id, private_key).map_err(cdm_error)?;
        Ok(Self::new(device))
    }

    pub fn from_wvd(path: &Path) -> TsumugiResult<Self> {
        let device = Device::load_wvd(path).map_err(cdm_error)?;
        Ok(Self::new(device))
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Sessions opened and not closed yet.
    pub fn open_sessions(&self) -> usize {
        self.sessions().map(|sessions| sessions.len()).unwrap_or_default()
    }

    fn sessions(&self) -> TsumugiResult<MutexGuard<'_, HashMap<String, Session>>> {
        self.sessions
            .lock()
            .map_err(|_| TsumugiError::CdmError("session table is poisoned".to_string()))
    }

    fn with_session<T, E: Display>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Session) -> Result<T, E>,
    ) -> TsumugiResult<T> {
        let mut sessions = self.sessions()?;
        let session = sessions.get_mut(id).ok_or_else(|| unknown_session(id))?;
        f(session).map_err(cdm_error)
    }
}

fn unknown_session(id: &str) -> TsumugiError {
    TsumugiError::CdmError(format!("unknown session {id}"))
}

impl Cdm for LocalCdm {
    async fn open(&self) -> TsumugiResult<String> {
        let session = self.device.open();
        let id = session.id();
        tracing::debug!("Local CDM session {id} (#{}) opened", session.number());
        self.sessions()?.insert(id.clone(), session);
        Ok(id)
    }

    async fn challenge(&self, session: &str, header: &ProtectionHeader) -> TsumugiResult<Vec<u8>> {
        self.with_session(session, |state| {
            state
                .license_request(&self.device, header)
                .map(|request| request.encode_to_vec())
        })
    }

    async fn parse_license(&self, session: &str, license: &[u8]) -> TsumugiResult<()> {
        self.with_session(session, |state| {
            state.parse_license(&self.device, license).map(|keys| {
                tracing::debug!("Local CDM session {session}: {} key(s)", keys.len());
            })
        })
    }

    async fn keys(&self, session: &str) -> TsumugiResult<Vec<CdmKey>> {
        let sessions = self.sessions()?;
        let state = sessions.get(session).ok_or_else(|| unknown_session(session))?;
        Ok(state
            .keys()
            .iter()
            .map(|key| CdmKey {
                kid: (!key.id.is_empty()).then(|| hex::encode(&key.id)),
                key: key.key.clone(),
                r#type: KeyType::from_name(key.type_name()),
            })
            .collect())
    }

    async fn close(&self, session: &str) -> TsumugiResult<()> {
        match self.sessions()?.remove(session) {
            Some(_) => Ok(()),
            None => Err(unknown_session(session)),
        }
    }
}
