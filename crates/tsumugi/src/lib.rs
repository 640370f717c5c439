pub mod catalog;
pub mod error;
pub mod http;
pub mod lang;
pub mod license;
pub mod marker;
pub mod mpd;
pub mod pipeline;
pub mod process;
pub mod select;
pub mod sequence;

mod base64;

pub use error::{TsumugiError, TsumugiResult};
pub use http::{ClientIdentity, HttpClient};

/// ┌──────────────┐   ┌──────────────────┐   ┌──────────────────┐
/// │   Manifest   ├──►│ Representation   ├──►│ SegmentSequencer │──┐ video plan
/// │   (mpd)      │   │ Selector         │   │                  │──┤ audio plan
/// └──────┬───────┘   └──────────────────┘   └──────────────────┘  │
///        │ protection header                                       ▼
///        │           ┌──────────────────┐   ┌───────────────────────────────┐
///        └──────────►│ LicenseExchange  ├──►│ AcquisitionPipeline            │
///                    │ (cdm + server)   │   │ download ∥ → decrypt → merge → │
///                    └──────────────────┘   │ subtitles → final file         │
///                                           └───────────────────────────────┘
pub use pipeline::AcquisitionPipeline;
