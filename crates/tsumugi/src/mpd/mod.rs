//! # MPEG-DASH manifest subset
//!
//! Only the part of DASH needed to pick one video and one audio track of a
//! static manifest is understood:
//!
//! *   `Period → AdaptationSet → Representation`, with a `BaseURL` per
//!     representation.
//! *   `SegmentTemplate` (on the representation or its adaptation set) with
//!     `initialization` / `media` templates.
//! *   `SegmentTimeline` `S` entries with `r` run-length compaction, which only
//!     matter for counting fragments.
//! *   `ContentProtection` carrying a `cenc:pssh` element.
//!
//! Problems with a single representation never fail the whole document. They
//! are collected as [`Diagnostic`]s on the returned [`ManifestDocument`].

mod parser;
mod timeline;
mod url;

use std::{fmt::Display, ops::Deref};

pub use parser::{parse, parse_with_location};
pub use timeline::{SegmentTimelineRun, MAX_FRAGMENTS};

use crate::base64::{base64_decode, base64_encode};

pub const WIDEVINE_SCHEME_ID_URI: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        if mime_type.starts_with("video") {
            Some(Self::Video)
        } else if mime_type.starts_with("audio") {
            Some(Self::Audio)
        } else {
            None
        }
    }

    /// File extension of the reassembled track.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "m4a",
        }
    }
}

impl Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityKey {
    Resolution { width: u64, height: u64 },
    Bandwidth(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    pub id: String,
    pub kind: TrackKind,
    pub base_url: String,
    pub init_template: Option<String>,
    /// When absent, only the initialization segment exists and
    /// `fragment_count` is meaningless.
    pub media_template: Option<String>,
    pub fragment_count: u64,
    pub quality: QualityKey,
    pub bandwidth: Option<u64>,
}

impl Representation {
    pub fn height(&self) -> Option<u64> {
        match self.quality {
            QualityKey::Resolution { height, .. } => Some(height),
            QualityKey::Bandwidth(_) => None,
        }
    }

    pub fn resolution(&self) -> Option<String> {
        match self.quality {
            QualityKey::Resolution { width, height } => Some(format!("{width}x{height}")),
            QualityKey::Bandwidth(_) => None,
        }
    }
}

/// A non-fatal problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Location in the document, e.g. `Period[0]/AdaptationSet[1]/Representation[video-1080]`.
    pub context: String,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            message: message.into(),
        }
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.context, self.message)
    }
}

/// Binary DRM initialization data (a `pssh` box) as found in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionHeader(Vec<u8>);

impl ProtectionHeader {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn from_base64<S: AsRef<str>>(input: S) -> Result<Self, base64::DecodeError> {
        Ok(Self(base64_decode(input.as_ref().trim())?))
    }

    pub fn to_base64(&self) -> String {
        base64_encode(&self.0)
    }
}

impl Deref for ProtectionHeader {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Every usable representation of one manifest, in document order.
#[derive(Debug, Clone, Default)]
pub struct ManifestDocument {
    pub(crate) videos: Vec<Representation>,
    pub(crate) audios: Vec<Representation>,
    pub(crate) protection: Option<ProtectionHeader>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl ManifestDocument {
    pub fn videos(&self) -> &[Representation] {
        &self.videos
    }

    pub fn audios(&self) -> &[Representation] {
        &self.audios
    }

    pub fn representations(&self) -> impl Iterator<Item = &Representation> {
        self.videos.iter().chain(self.audios.iter())
    }

    pub fn protection_header(&self) -> Option<&ProtectionHeader> {
        self.protection.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
