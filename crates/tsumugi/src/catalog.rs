//! Catalog records and batch planning.
//!
//! Listing and playback information come from a [`PlaybackSource`], which is
//! implemented by a platform crate. Everything else here is plain data and
//! pure functions, so the choices of an operator (audio language, subtitle
//! language, episode ranges) can be planned and tested without a network.

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    str::FromStr,
};

use crate::error::TsumugiResult;

/// Subtitle locale value the service uses for "no subtitles".
pub const NO_SUBTITLES: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioVersion {
    pub audio_locale: String,
    pub guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    pub title: String,
    pub versions: Vec<AudioVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Season {
    pub id: String,
    pub title: String,
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub url: String,
    /// File extension, e.g. `ass` or `vtt`.
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playback {
    pub manifest_url: String,
    pub subtitles: BTreeMap<String, SubtitleTrack>,
}

impl Playback {
    pub fn subtitle(&self, locale: &str) -> Option<&SubtitleTrack> {
        self.subtitles.get(locale)
    }
}

/// Resolves a content GUID into its playback information.
pub trait PlaybackSource {
    fn playback(&self, guid: &str) -> impl Future<Output = TsumugiResult<Playback>> + Send;
}

/// A set of 1-based numbers written as `1-3,5,8-`.
///
/// An open upper bound (`8-`) matches every number from 8 on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet(Vec<(u32, Option<u32>)>);

impl RangeSet {
    pub fn contains(&self, number: u32) -> bool {
        self.0.iter().any(|(start, end)| {
            number >= *start && end.map_or(true, |end| number <= end)
        })
    }
}

impl FromStr for RangeSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |value: &str| {
            value
                .trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid number {value:?} in range {s:?}"))
        };

        let mut ranges = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let range = match part.split_once('-') {
                Some((start, end)) if end.trim().is_empty() => (parse(start)?, None),
                Some((start, end)) => (parse(start)?, Some(parse(end)?)),
                None => {
                    let number = parse(part)?;
                    (number, Some(number))
                }
            };
            if let (start, Some(end)) = range {
                if start > end {
                    return Err(format!("range {part:?} is reversed"));
                }
            }
            ranges.push(range);
        }

        if ranges.is_empty() {
            return Err(format!("empty range {s:?}"));
        }
        Ok(Self(ranges))
    }
}

/// What to download out of a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSelection {
    pub audio_locale: String,
    pub subtitle_locale: Option<String>,
    /// Seasons by 1-based position in the listing. `None` selects all.
    pub seasons: Option<RangeSet>,
    /// Episode numbers within each season. `None` selects all.
    pub episodes: Option<RangeSet>,
}

/// One episode to acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeJob {
    pub season_title: String,
    /// 1-based position among the episodes of the season that have the
    /// selected audio locale.
    pub number: u32,
    pub title: String,
    pub guid: String,
    pub audio_locale: String,
    pub subtitle_locale: Option<String>,
}

impl EpisodeJob {
    pub fn label(&self) -> String {
        format!("{} - {}. {}", self.season_title, self.number, self.title)
    }
}

/// Expands a catalog into the episode jobs described by `selection`, in
/// listing order.
pub fn plan_batch(seasons: &[Season], selection: &BatchSelection) -> Vec<EpisodeJob> {
    let subtitle_locale = selection
        .subtitle_locale
        .clone()
        .filter(|locale| !locale.eq_ignore_ascii_case(NO_SUBTITLES));

    let mut jobs = Vec::new();
    for (index, season) in seasons.iter().enumerate() {
        let position = index as u32 + 1;
        if !selection
            .seasons
            .as_ref()
            .map_or(true, |seasons| seasons.contains(position))
        {
            continue;
        }

        let dubbed = season.episodes.iter().filter_map(|episode| {
            // the last matching version wins
            episode
                .versions
                .iter()
                .rev()
                .find(|version| version.audio_locale == selection.audio_locale)
                .map(|version| (episode, version))
        });

        for (number, (episode, version)) in (1..).zip(dubbed) {
            if !selection
                .episodes
                .as_ref()
                .map_or(true, |episodes| episodes.contains(number))
            {
                continue;
            }
            jobs.push(EpisodeJob {
                season_title: season.title.clone(),
                number,
                title: episode.title.clone(),
                guid: version.guid.clone(),
                audio_locale: version.audio_locale.clone(),
                subtitle_locale: subtitle_locale.clone(),
            });
        }
    }
    jobs
}

/// Audio locales offered by the first episode of the first season.
pub fn available_audio_locales(seasons: &[Season]) -> BTreeSet<String> {
    seasons
        .iter()
        .flat_map(|season| season.episodes.first())
        .next()
        .map(|episode| {
            episode
                .versions
                .iter()
                .map(|version| version.audio_locale.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Subtitle locales offered by a playback, without the "none" entry.
pub fn available_subtitle_locales(playback: &Playback) -> Vec<String> {
    playback
        .subtitles
        .keys()
        .filter(|locale| !locale.eq_ignore_ascii_case(NO_SUBTITLES))
        .cloned()
        .collect()
}
