use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Manifest is empty")]
    Empty,

    #[error("Malformed manifest: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionError {
    #[error("No usable video representation")]
    NoVideo,

    #[error("No usable audio representation")]
    NoAudio,
}

#[derive(Error, Debug)]
pub enum SequencingError {
    #[error("Representation {0} has no initialization template")]
    MissingTemplate(String),

    #[error("Representation {id} describes {count} fragments, more than {max}")]
    TooManyFragments { id: String, count: u64, max: u64 },

    #[error("Invalid fragment url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Error, Debug)]
pub enum LicenseError {
    /// The license server refused to issue a license. Retrying with the same
    /// credentials will not help.
    #[error("License denied: {0}")]
    Denied(String),

    /// The license server could not be reached or answered with garbage.
    #[error("License server error: {0}")]
    ServerError(String),

    #[error("No CONTENT key found in license")]
    NoContentKey,

    #[error("CDM error: {0}")]
    Cdm(String),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with code {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

#[derive(Error, Debug)]
pub enum TsumugiError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    ManifestParseError(#[from] ParseError),

    #[error(transparent)]
    SelectionError(#[from] SelectionError),

    #[error(transparent)]
    SequencingError(#[from] SequencingError),

    #[error(transparent)]
    LicenseError(#[from] LicenseError),

    #[error(transparent)]
    ExternalProcessError(#[from] ProcessError),

    #[error("Protection header not found in manifest")]
    MissingProtectionHeader,

    #[error("Playback token not found in {0}")]
    MissingPlaybackToken(String),

    #[error("Playback unavailable: {0}")]
    PlaybackUnavailable(String),

    #[error("CDM error: {0}")]
    CdmError(String),

    #[error("{0} was reported successful but is missing or empty")]
    MissingOutput(std::path::PathBuf),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Base64Error(#[from] base64::DecodeError),

    #[error(transparent)]
    MissingExecutable(#[from] which::Error),
}

pub type TsumugiResult<T> = Result<T, TsumugiError>;

/// A fatal failure of one episode: which episode, at which stage, and why.
#[derive(Error, Debug)]
#[error("[{episode}] {stage} failed: {source}")]
pub struct EpisodeError {
    pub episode: String,
    pub stage: Stage,
    #[source]
    pub source: TsumugiError,
}
