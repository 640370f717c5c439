use std::cmp::Ordering;

use crate::{
    error::SelectionError,
    mpd::{ManifestDocument, Representation},
};

/// Total order over representations of one kind. `Greater` means better.
pub type Comparator = fn(&Representation, &Representation) -> Ordering;

/// Orders video by vertical resolution.
pub fn by_height(a: &Representation, b: &Representation) -> Ordering {
    a.height().cmp(&b.height())
}

/// Orders audio (or anything else) by declared bandwidth.
pub fn by_bandwidth(a: &Representation, b: &Representation) -> Ordering {
    a.bandwidth.cmp(&b.bandwidth)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionResult<'a> {
    pub video: &'a Representation,
    pub audio: &'a Representation,
}

/// Picks one video and one audio representation from a manifest.
///
/// Ties keep the representation encountered first, so the result only
/// depends on the manifest.
#[derive(Debug, Clone, Copy)]
pub struct RepresentationSelector {
    pub video: Comparator,
    pub audio: Comparator,
}

impl RepresentationSelector {
    pub fn new(video: Comparator, audio: Comparator) -> Self {
        Self { video, audio }
    }

    pub fn select<'a>(
        &self,
        document: &'a ManifestDocument,
    ) -> Result<SelectionResult<'a>, SelectionError> {
        let video = best(document.videos(), self.video).ok_or(SelectionError::NoVideo)?;
        let audio = best(document.audios(), self.audio).ok_or(SelectionError::NoAudio)?;
        Ok(SelectionResult { video, audio })
    }
}

impl Default for RepresentationSelector {
    fn default() -> Self {
        Self::new(by_height, by_bandwidth)
    }
}

/// Selects with the default ordering: tallest video, widest audio.
pub fn select(document: &ManifestDocument) -> Result<SelectionResult<'_>, SelectionError> {
    RepresentationSelector::default().select(document)
}

// `Iterator::max_by` keeps the last maximum, we need the first one
fn best(candidates: &[Representation], compare: Comparator) -> Option<&Representation> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(best) if compare(candidate, best) != Ordering::Greater => Some(best),
        _ => Some(candidate),
    })
}
