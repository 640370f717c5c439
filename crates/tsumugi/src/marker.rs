//! Marker-delimited substring extraction.
//!
//! Some values only exist embedded in other strings, e.g. the playback token
//! inside the manifest URL. They are pulled out by searching for a literal
//! left marker and the first literal right marker after it.

/// Marks the start of the playback token inside a playback manifest URL.
pub const PLAYBACK_TOKEN_START: &str = "playbackGuid=";
/// Marks the end of the playback token inside a playback manifest URL.
pub const PLAYBACK_TOKEN_END: &str = "&accountid";

/// Returns the text between the first `left` marker and the first `right`
/// marker following it, or `None` when either marker is absent or the
/// enclosed text is empty.
pub fn between<'a>(text: &'a str, left: &str, right: &str) -> Option<&'a str> {
    let start = text.find(left)? + left.len();
    let length = text[start..].find(right)?;
    let value = &text[start..start + length];
    (!value.is_empty()).then_some(value)
}

/// Playback token used as `x-cr-video-token` during the license exchange.
pub fn playback_token(manifest_url: &str) -> Option<&str> {
    between(manifest_url, PLAYBACK_TOKEN_START, PLAYBACK_TOKEN_END)
}
