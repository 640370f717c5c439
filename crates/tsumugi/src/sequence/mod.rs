mod template;

pub use template::Template;

use url::Url;

use crate::{
    error::SequencingError,
    mpd::{Diagnostic, Representation, TrackKind, MAX_FRAGMENTS},
};

/// Ordered fragment URLs of one representation. The initialization segment
/// always comes first, followed by media segments `1..=N`.
///
/// The order matters: the fragments are concatenated verbatim into one
/// fragmented MP4 file.
#[derive(Debug, Clone)]
pub struct FragmentPlan {
    pub kind: TrackKind,
    pub representation_id: String,
    pub urls: Vec<Url>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FragmentPlan {
    pub fn init_url(&self) -> Option<&Url> {
        self.urls.first()
    }

    pub fn media_urls(&self) -> &[Url] {
        self.urls.get(1..).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Expands the segment template of a representation into its fragment plan.
pub fn expand(representation: &Representation) -> Result<FragmentPlan, SequencingError> {
    let init_template = representation
        .init_template
        .as_deref()
        .ok_or_else(|| SequencingError::MissingTemplate(representation.id.clone()))?;

    if representation.fragment_count > MAX_FRAGMENTS {
        return Err(SequencingError::TooManyFragments {
            id: representation.id.clone(),
            count: representation.fragment_count,
            max: MAX_FRAGMENTS,
        });
    }

    let mut template = Template::new();
    template.insert(Template::REPRESENTATION_ID, representation.id.clone());
    if let Some(bandwidth) = representation.bandwidth {
        template.insert(Template::BANDWIDTH, bandwidth.to_string());
    }

    let mut urls = Vec::new();
    let mut diagnostics = Vec::new();
    urls.push(absolute_url(&representation.base_url, &template.resolve(init_template))?);

    match representation.media_template.as_deref() {
        Some(media_template) => {
            for number in 1..=representation.fragment_count {
                template.insert(Template::NUMBER, number.to_string());
                urls.push(absolute_url(
                    &representation.base_url,
                    &template.resolve(media_template),
                )?);
            }
        }
        None => {
            for number in 1..=representation.fragment_count {
                diagnostics.push(Diagnostic::new(
                    format!("{}/{number}", representation.id),
                    "no media template, fragment skipped",
                ));
            }
        }
    }

    Ok(FragmentPlan {
        kind: representation.kind,
        representation_id: representation.id.clone(),
        urls,
        diagnostics,
    })
}

fn absolute_url(base_url: &str, path: &str) -> Result<Url, SequencingError> {
    let url = format!("{base_url}{path}");
    Url::parse(&url).map_err(|source| SequencingError::InvalidUrl { url, source })
}
