use clap::Parser;
use tsumugi::catalog::{available_audio_locales, available_subtitle_locales};

use super::SourceOptions;
use crate::config::Config;

#[derive(Parser, Clone, Debug)]
pub struct ListCommand {
    #[clap(flatten)]
    pub source: SourceOptions,

    /// Also query the subtitle locales of the first episode
    #[clap(long)]
    pub subtitles: bool,
}

impl ListCommand {
    pub async fn list(self, config: Config) -> anyhow::Result<()> {
        let token = self.source.token(&config)?;
        let client = self.source.client(&token, &config)?;
        let series_id = self.source.series_id(&client).await?;
        let seasons = client.catalog(&series_id).await?;

        for (index, season) in seasons.iter().enumerate() {
            println!("[{}] {} ({})", index + 1, season.title, season.id);
            for (number, episode) in (1..).zip(&season.episodes) {
                let locales: Vec<_> = episode
                    .versions
                    .iter()
                    .map(|version| version.audio_locale.as_str())
                    .collect();
                println!("    {number}. {} [{}]", episode.title, locales.join(", "));
            }
        }

        let audio: Vec<_> = available_audio_locales(&seasons).into_iter().collect();
        println!("Audio locales: {}", audio.join(", "));

        if self.subtitles {
            let first = seasons
                .iter()
                .flat_map(|season| season.episodes.first())
                .flat_map(|episode| episode.versions.first())
                .next();
            if let Some(version) = first {
                let playback = client.play(&version.guid).await?;
                println!(
                    "Subtitle locales: {}",
                    available_subtitle_locales(&playback).join(", ")
                );
            }
        }
        Ok(())
    }
}
