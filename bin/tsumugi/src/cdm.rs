use tsumugi::{
    license::{Cdm, CdmKey, LocalCdm, RemoteCdm},
    mpd::ProtectionHeader,
    TsumugiResult,
};

/// The CDM picked by the command line: a device dump on this machine, or a
/// remote CDM service.
#[derive(Debug)]
pub enum CdmBackend {
    Local(LocalCdm),
    Remote(RemoteCdm),
}

impl Cdm for CdmBackend {
    async fn open(&self) -> TsumugiResult<String> {
        match self {
            Self::Local(cdm) => cdm.open().await,
            Self::Remote(cdm) => cdm.open().await,
        }
    }

    async fn challenge(&self, session: &str, header: &ProtectionHeader) -> TsumugiResult<Vec<u8>> {
        match self {
            Self::Local(cdm) => cdm.challenge(session, header).await,
            Self::Remote(cdm) => cdm.challenge(session, header).await,
        }
    }

    async fn parse_license(&self, session: &str, license: &[u8]) -> TsumugiResult<()> {
        match self {
            Self::Local(cdm) => cdm.parse_license(session, license).await,
            Self::Remote(cdm) => cdm.parse_license(session, license).await,
        }
    }

    async fn keys(&self, session: &str) -> TsumugiResult<Vec<CdmKey>> {
        match self {
            Self::Local(cdm) => cdm.keys(session).await,
            Self::Remote(cdm) => cdm.keys(session).await,
        }
    }

    async fn close(&self, session: &str) -> TsumugiResult<()> {
        match self {
            Self::Local(cdm) => cdm.close(session).await,
            Self::Remote(cdm) => cdm.close(session).await,
        }
    }
}
