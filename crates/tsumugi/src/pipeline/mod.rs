//! Per-episode acquisition state machine.
//!
//! ```text
//! FetchingManifest → Parsed → Selected → { DownloadingVideo ∥ DownloadingAudio }
//!   → KeyAcquired → Decrypting → Merging → (SubtitlesDownloaded) → Muxed → Done
//! ```
//!
//! Episodes are isolated from each other: a failure is reported for that
//! episode only and the batch goes on. Every tool writes to a `.part` file
//! that is renamed into place only once the tool succeeded, and the files of
//! the previous stage are removed only after that. An interrupted or failed
//! run therefore resumes from the last complete artifact.

mod artifact;
mod download;
mod tools;

use std::{
    fmt::Display,
    num::NonZeroU32,
    path::{Path, PathBuf},
};

pub use artifact::{sanitize_filename, ArtifactState, DownloadArtifact, EpisodeLayout};
pub use download::{download_track, TrackDownload};
pub use tools::{FfmpegCli, MediaToolkit};

use tokio::sync::Semaphore;
use url::Url;

use crate::{
    catalog::{EpisodeJob, Playback, PlaybackSource, SubtitleTrack},
    error::{EpisodeError, TsumugiError},
    http::HttpClient,
    lang,
    license::{Cdm, ContentKey, LicenseExchange, SessionContext},
    marker,
    mpd::{self, ManifestDocument, TrackKind},
    select::RepresentationSelector,
    sequence::{self, FragmentPlan},
};

/// Episodes processed at the same time unless configured otherwise.
pub const DEFAULT_CONCURRENCY: NonZeroU32 = match NonZeroU32::new(2) {
    Some(concurrency) => concurrency,
    None => unreachable!(),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchingManifest,
    Parsed,
    Selected,
    DownloadingVideo,
    DownloadingAudio,
    KeyAcquired,
    Decrypting,
    Merging,
    SubtitlesDownloaded,
    Muxed,
    Done,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::FetchingManifest => "fetching manifest",
            Stage::Parsed => "parsing manifest",
            Stage::Selected => "selecting representations",
            Stage::DownloadingVideo => "downloading video",
            Stage::DownloadingAudio => "downloading audio",
            Stage::KeyAcquired => "acquiring key",
            Stage::Decrypting => "decrypting",
            Stage::Merging => "merging",
            Stage::SubtitlesDownloaded => "downloading subtitles",
            Stage::Muxed => "muxing subtitles",
            Stage::Done => "finishing",
        };
        f.write_str(name)
    }
}

trait StageExt<T> {
    fn at(self, job: &EpisodeJob, stage: Stage) -> Result<T, EpisodeError>;
}

impl<T, E: Into<TsumugiError>> StageExt<T> for Result<T, E> {
    fn at(self, job: &EpisodeJob, stage: Stage) -> Result<T, EpisodeError> {
        self.map_err(|source| EpisodeError {
            episode: job.label(),
            stage,
            source: source.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EpisodeOutcome {
    Done(PathBuf),
    /// The final file already existed.
    Skipped(PathBuf),
}

#[derive(Debug)]
pub struct EpisodeReport {
    pub episode: String,
    pub result: Result<EpisodeOutcome, EpisodeError>,
}

impl EpisodeReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct AcquisitionPipeline<P, C, T> {
    source: P,
    license: LicenseExchange<C>,
    toolkit: T,
    manifest_client: HttpClient,
    fragment_client: HttpClient,
    selector: RepresentationSelector,
    bearer: String,
    output_dir: PathBuf,
    concurrency: NonZeroU32,
}

impl<P, C, T> AcquisitionPipeline<P, C, T>
where
    P: PlaybackSource + Sync,
    C: Cdm + Sync,
    T: MediaToolkit + Sync,
{
    pub fn new(
        source: P,
        license: LicenseExchange<C>,
        toolkit: T,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            license,
            toolkit,
            manifest_client: HttpClient::default(),
            fragment_client: HttpClient::default(),
            selector: RepresentationSelector::default(),
            bearer: String::new(),
            output_dir: output_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Client used for manifests. It carries the identity of the mobile app.
    pub fn manifest_client(mut self, client: HttpClient) -> Self {
        self.manifest_client = client;
        self
    }

    /// Client used for fragments and subtitles.
    pub fn fragment_client(mut self, client: HttpClient) -> Self {
        self.fragment_client = client;
        self
    }

    pub fn selector(mut self, selector: RepresentationSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Bearer token sent to the license server.
    pub fn bearer(mut self, bearer: impl Into<String>) -> Self {
        self.bearer = bearer.into();
        self
    }

    pub fn concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }

    /// Runs every job, at most `concurrency` episodes at a time, and returns
    /// one report per job in job order.
    pub async fn run_batch(&self, jobs: &[EpisodeJob]) -> Vec<EpisodeReport> {
        tracing::info!(
            "Start downloading {} episode(s) with {} worker(s).",
            jobs.len(),
            self.concurrency.get()
        );

        let permits = Semaphore::new(self.concurrency.get() as usize);
        let reports = futures::future::join_all(jobs.iter().map(|job| {
            let permits = &permits;
            async move {
                // the semaphore is never closed
                let _permit = permits.acquire().await;
                let result = self.run_episode(job).await;
                match &result {
                    Ok(EpisodeOutcome::Done(path)) => {
                        tracing::info!("[{}] Done: {}", job.label(), path.display())
                    }
                    Ok(EpisodeOutcome::Skipped(path)) => {
                        tracing::info!("[{}] Skipped, {} exists", job.label(), path.display())
                    }
                    Err(e) => tracing::error!("{e}"),
                }
                EpisodeReport {
                    episode: job.label(),
                    result,
                }
            }
        }))
        .await;

        let failed = reports.iter().filter(|report| !report.is_success()).count();
        if failed == 0 {
            tracing::info!("All {} episode(s) finished.", reports.len());
        } else {
            tracing::error!("Failed to download {failed} of {} episode(s):", reports.len());
            for report in reports.iter().filter(|report| !report.is_success()) {
                tracing::error!("  - {}", report.episode);
            }
        }
        reports
    }

    pub async fn run_episode(&self, job: &EpisodeJob) -> Result<EpisodeOutcome, EpisodeError> {
        let label = job.label();
        let layout = EpisodeLayout::new(&self.output_dir, job);
        let final_output = layout.final_output(ArtifactState::Subtitled);
        if final_output.is_present().await {
            return Ok(EpisodeOutcome::Skipped(final_output.path));
        }

        tracing::info!("[{label}] {}", Stage::FetchingManifest);
        tokio::fs::create_dir_all(layout.directory())
            .await
            .at(job, Stage::FetchingManifest)?;
        let playback = self
            .source
            .playback(&job.guid)
            .await
            .at(job, Stage::FetchingManifest)?;
        let location = Url::parse(&playback.manifest_url).at(job, Stage::FetchingManifest)?;
        let raw = self
            .manifest_client
            .fetch_text(location.clone())
            .await
            .at(job, Stage::FetchingManifest)?;

        let document = mpd::parse_with_location(&raw, Some(&location)).at(job, Stage::Parsed)?;
        for diagnostic in document.diagnostics() {
            tracing::warn!("[{label}] {diagnostic}");
        }

        let selection = self.selector.select(&document).at(job, Stage::Selected)?;
        tracing::info!(
            "[{label}] Selected video {} ({}) and audio {} ({} bps)",
            selection.video.id,
            selection.video.resolution().unwrap_or_default(),
            selection.audio.id,
            selection.audio.bandwidth.unwrap_or_default(),
        );
        let video_plan = sequence::expand(selection.video).at(job, Stage::Selected)?;
        let audio_plan = sequence::expand(selection.audio).at(job, Stage::Selected)?;
        for diagnostic in video_plan.diagnostics.iter().chain(&audio_plan.diagnostics) {
            tracing::warn!("[{label}] {diagnostic}");
        }

        let subtitle = job.subtitle_locale.as_deref().and_then(|locale| {
            let track = playback.subtitle(locale);
            if track.is_none() {
                tracing::warn!("[{label}] No {locale} subtitles, continuing without them");
            }
            track.map(|track| (locale, track))
        });

        let merged = match subtitle {
            Some(_) => layout.merged(),
            None => layout.final_output(ArtifactState::Merged),
        };
        if subtitle.is_some() && merged.is_present().await {
            tracing::info!("[{label}] Resuming from {}", merged.path.display());
        } else {
            let tracks = TrackPlans {
                document: &document,
                playback: &playback,
                video: &video_plan,
                audio: &audio_plan,
            };
            let (video, audio) = self.decrypted_tracks(job, &layout, tracks).await?;

            tracing::info!("[{label}] {}", Stage::Merging);
            let written = self
                .toolkit
                .merge(
                    &video.path,
                    &audio.path,
                    lang::iso639_2(&job.audio_locale),
                    &merged.partial(),
                )
                .await;
            merged.settle(written).await.at(job, Stage::Merging)?;
            video.remove().await;
            audio.remove().await;
        }

        match subtitle {
            Some((locale, track)) => self.add_subtitles(job, &layout, merged, locale, track).await,
            None => Ok(EpisodeOutcome::Done(merged.path)),
        }
    }

    /// Produces the decrypted video and audio tracks, reusing the ones left
    /// by a previous run.
    async fn decrypted_tracks(
        &self,
        job: &EpisodeJob,
        layout: &EpisodeLayout,
        plans: TrackPlans<'_>,
    ) -> Result<(DownloadArtifact, DownloadArtifact), EpisodeError> {
        let label = job.label();
        let video = layout.track(TrackKind::Video, ArtifactState::Decrypted);
        let audio = layout.track(TrackKind::Audio, ArtifactState::Decrypted);
        let has_video = video.is_present().await;
        let has_audio = audio.is_present().await;
        if has_video && has_audio {
            tracing::info!("[{label}] Resuming from decrypted tracks");
            return Ok((video, audio));
        }

        let encrypted_video = layout.track(TrackKind::Video, ArtifactState::Encrypted);
        let encrypted_audio = layout.track(TrackKind::Audio, ArtifactState::Encrypted);
        let download_video = async {
            if has_video {
                return Ok(None);
            }
            tracing::info!("[{label}] {}", Stage::DownloadingVideo);
            download_track(&self.fragment_client, plans.video, &encrypted_video.path)
                .await
                .map(Some)
                .at(job, Stage::DownloadingVideo)
        };
        let download_audio = async {
            if has_audio {
                return Ok(None);
            }
            tracing::info!("[{label}] {}", Stage::DownloadingAudio);
            download_track(&self.fragment_client, plans.audio, &encrypted_audio.path)
                .await
                .map(Some)
                .at(job, Stage::DownloadingAudio)
        };
        let (video_download, audio_download) = tokio::join!(download_video, download_audio);
        for download in [video_download?, audio_download?].into_iter().flatten() {
            if !download.is_complete() {
                tracing::warn!(
                    "[{label}] {} of {} {} fragment(s) failed, the track will be incomplete:",
                    download.failed.len(),
                    download.total,
                    download.kind
                );
                for url in &download.failed {
                    tracing::warn!("  - {url}");
                }
            }
        }

        let key = self.acquire_key(job, plans.document, plans.playback).await?;

        tracing::info!("[{label}] {}", Stage::Decrypting);
        let pending = [
            (has_video, encrypted_video, &video),
            (has_audio, encrypted_audio, &audio),
        ];
        for (present, encrypted, decrypted) in pending {
            if present {
                continue;
            }
            let written = self
                .toolkit
                .decrypt(&key, &encrypted.path, &decrypted.partial())
                .await;
            decrypted.settle(written).await.at(job, Stage::Decrypting)?;
            encrypted.remove().await;
        }

        Ok((video, audio))
    }

    async fn acquire_key(
        &self,
        job: &EpisodeJob,
        document: &ManifestDocument,
        playback: &Playback,
    ) -> Result<ContentKey, EpisodeError> {
        tracing::info!("[{}] {}", job.label(), Stage::KeyAcquired);
        let header = document
            .protection_header()
            .ok_or(TsumugiError::MissingProtectionHeader)
            .at(job, Stage::KeyAcquired)?;
        let token = marker::playback_token(&playback.manifest_url)
            .ok_or_else(|| TsumugiError::MissingPlaybackToken(playback.manifest_url.clone()))
            .at(job, Stage::KeyAcquired)?;

        let context = SessionContext {
            bearer: self.bearer.clone(),
            content_id: job.guid.clone(),
            video_token: token.to_string(),
        };
        let key = self
            .license
            .acquire_key(header, &context)
            .await
            .at(job, Stage::KeyAcquired)?;
        tracing::debug!("[{}] {key}", job.label());
        Ok(key)
    }

    async fn add_subtitles(
        &self,
        job: &EpisodeJob,
        layout: &EpisodeLayout,
        merged: DownloadArtifact,
        locale: &str,
        track: &SubtitleTrack,
    ) -> Result<EpisodeOutcome, EpisodeError> {
        let label = job.label();
        let final_output = layout.final_output(ArtifactState::Subtitled);
        let subtitles = layout.subtitles(locale, &track.format);

        tracing::info!("[{label}] {}", Stage::SubtitlesDownloaded);
        let fetched = match self.fragment_client.fetch_bytes(track.url.as_str()).await {
            Ok(bytes) => tokio::fs::write(&subtitles, &bytes)
                .await
                .map_err(TsumugiError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = fetched {
            artifact::remove_file(&subtitles).await;
            tracing::warn!("[{label}] Subtitles not added, download failed: {e}");
            return self.keep_without_subtitles(job, merged, final_output).await;
        }

        tracing::info!("[{label}] {}", Stage::Muxed);
        let written = self
            .toolkit
            .add_subtitles(
                &merged.path,
                &subtitles,
                lang::iso639_2(locale),
                &final_output.partial(),
            )
            .await;
        let muxed = final_output.settle(written).await;
        artifact::remove_file(&subtitles).await;
        if let Err(e) = muxed {
            tracing::warn!("[{label}] Subtitles not added, mux failed: {e}");
            return self.keep_without_subtitles(job, merged, final_output).await;
        }

        merged.remove().await;
        Ok(EpisodeOutcome::Done(final_output.path))
    }

    /// The merged file is complete on its own, so it becomes the final file.
    async fn keep_without_subtitles(
        &self,
        job: &EpisodeJob,
        merged: DownloadArtifact,
        final_output: DownloadArtifact,
    ) -> Result<EpisodeOutcome, EpisodeError> {
        tokio::fs::rename(&merged.path, &final_output.path)
            .await
            .at(job, Stage::Muxed)?;
        Ok(EpisodeOutcome::Done(final_output.path))
    }
}

#[derive(Clone, Copy)]
struct TrackPlans<'a> {
    document: &'a ManifestDocument,
    playback: &'a Playback,
    video: &'a FragmentPlan,
    audio: &'a FragmentPlan,
}
