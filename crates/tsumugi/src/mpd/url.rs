use url::Url;

/// Whether a `BaseURL` names its own scheme, e.g. `https://cdn.example.com/v/`.
pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.split_once("://").is_some_and(|(scheme, _)| {
        scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Resolves the relative `BaseURL` of a representation against the URL the
/// manifest was fetched from.
///
/// Signed manifest URLs carry the CDN authorization in their query, and the
/// fragments need it too. The resolved URL therefore inherits the manifest
/// query unless the `BaseURL` has one of its own.
pub(crate) fn resolve_base_url(manifest: &Url, base_url: &str) -> Result<Url, url::ParseError> {
    let mut resolved = manifest.join(base_url)?;
    if resolved.query().is_none() {
        resolved.set_query(manifest.query());
    }
    Ok(resolved)
}
