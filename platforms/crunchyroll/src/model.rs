use std::collections::HashMap;

use serde::Deserialize;
use tsumugi::catalog::{self, AudioVersion, Playback, SubtitleTrack, NO_SUBTITLES};

#[derive(Debug, Deserialize)]
pub struct Account {
    pub external_id: Option<String>,
}

/// `{"credits": {"seriesId": "..."}}` from the static skip-events file.
#[derive(Debug, Default, Deserialize)]
pub struct SkipEvents {
    #[serde(default)]
    pub credits: Credits,
}

#[derive(Debug, Default, Deserialize)]
pub struct Credits {
    #[serde(rename = "seriesId")]
    pub series_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Listing<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct Season {
    pub id: String,
    pub title: String,
}

impl From<Season> for catalog::Season {
    fn from(season: Season) -> Self {
        Self {
            id: season.id,
            title: season.title,
            episodes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Episode {
    pub title: String,
    /// `null` for episodes with a single audio version.
    #[serde(default)]
    pub versions: Option<Vec<Version>>,
}

#[derive(Debug, Deserialize)]
pub struct Version {
    pub audio_locale: String,
    pub guid: String,
}

impl From<Episode> for catalog::Episode {
    fn from(episode: Episode) -> Self {
        Self {
            title: episode.title,
            versions: episode
                .versions
                .unwrap_or_default()
                .into_iter()
                .map(|version| AudioVersion {
                    audio_locale: version.audio_locale,
                    guid: version.guid,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Play {
    pub url: String,
    #[serde(default)]
    pub subtitles: HashMap<String, Subtitle>,
}

#[derive(Debug, Deserialize)]
pub struct Subtitle {
    #[serde(default)]
    pub url: String,
    pub format: String,
}

impl From<Play> for Playback {
    fn from(play: Play) -> Self {
        let subtitles = play
            .subtitles
            .into_iter()
            .filter(|(locale, subtitle)| locale != NO_SUBTITLES && !subtitle.url.is_empty())
            .map(|(locale, subtitle)| {
                (
                    locale,
                    SubtitleTrack {
                        url: subtitle.url,
                        format: subtitle.format,
                    },
                )
            })
            .collect();
        Self {
            manifest_url: play.url,
            subtitles,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayError {
    #[serde(default)]
    pub error: serde_json::Value,
}

impl PlayError {
    pub fn message(&self) -> String {
        match &self.error {
            serde_json::Value::String(message) => message.clone(),
            serde_json::Value::Null => "no reason given".to_string(),
            other => other.to_string(),
        }
    }
}
