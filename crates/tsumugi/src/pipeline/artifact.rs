use std::path::{Path, PathBuf};

use crate::{
    catalog::EpisodeJob,
    error::{TsumugiError, TsumugiResult},
    mpd::TrackKind,
};

/// Replaces characters that are not allowed in file names on common
/// filesystems with `-`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            c => c,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactState {
    Encrypted,
    Decrypted,
    Merged,
    Subtitled,
}

/// One file produced by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub path: PathBuf,
    /// `None` once video and audio are merged.
    pub track_kind: Option<TrackKind>,
    pub state: ArtifactState,
}

impl DownloadArtifact {
    pub fn new(path: PathBuf, track_kind: Option<TrackKind>, state: ArtifactState) -> Self {
        Self {
            path,
            track_kind,
            state,
        }
    }

    /// Whether a non-empty file exists at the path.
    pub async fn is_present(&self) -> bool {
        is_written(&self.path).await
    }

    /// Where a tool writes this artifact. The extension stays last so tools
    /// that pick a container by extension still work.
    ///
    /// `1. Title-decrypted.mp4` is produced as `1. Title-decrypted.part.mp4`.
    pub fn partial(&self) -> PathBuf {
        let stem = self.path.file_stem().unwrap_or_default().to_string_lossy();
        let name = match self.path.extension() {
            Some(extension) => format!("{stem}.part.{}", extension.to_string_lossy()),
            None => format!("{stem}.part"),
        };
        self.path.with_file_name(name)
    }

    /// Moves the partial file to the artifact path. External tools may exit
    /// with 0 without writing anything, so an empty partial file is an error.
    pub async fn commit(&self) -> TsumugiResult<()> {
        let partial = self.partial();
        if !is_written(&partial).await {
            return Err(TsumugiError::MissingOutput(partial));
        }
        tokio::fs::rename(&partial, &self.path).await?;
        Ok(())
    }

    /// Commits the partial file if the tool writing it succeeded, and
    /// discards it otherwise. The artifact path never holds an incomplete
    /// file, so a later run can trust whatever it finds there.
    pub async fn settle(&self, written: TsumugiResult<()>) -> TsumugiResult<()> {
        let result = match written {
            Ok(()) => self.commit().await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            remove_file(&self.partial()).await;
        }
        result
    }

    /// Removes a file that a later stage has superseded.
    pub async fn remove(self) {
        remove_file(&self.path).await;
    }
}

async fn is_written(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
}

pub(crate) async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
    }
}

/// File names of every artifact of one episode.
///
/// ```text
/// <output>/<season>/1. Title-encrypted.mp4
///                   1. Title-encrypted.m4a
///                   1. Title-decrypted.mp4
///                   1. Title-decrypted.m4a
///                   1. Title-without-subtitles.mp4
///                   Title_en-US.ass
///                   1. Title.mp4
/// ```
#[derive(Debug, Clone)]
pub struct EpisodeLayout {
    directory: PathBuf,
    stem: String,
    title: String,
}

impl EpisodeLayout {
    pub fn new(output_dir: &Path, job: &EpisodeJob) -> Self {
        Self {
            directory: output_dir.join(sanitize_filename(&job.season_title)),
            stem: sanitize_filename(&format!("{}. {}", job.number, job.title)),
            title: sanitize_filename(&job.title),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file(&self, suffix: &str, extension: &str) -> PathBuf {
        self.directory
            .join(format!("{}{suffix}.{extension}", self.stem))
    }

    pub fn track(&self, kind: TrackKind, state: ArtifactState) -> DownloadArtifact {
        let suffix = match state {
            ArtifactState::Encrypted => "-encrypted",
            _ => "-decrypted",
        };
        DownloadArtifact::new(self.file(suffix, kind.extension()), Some(kind), state)
    }

    /// Video and audio merged, waiting for subtitles.
    pub fn merged(&self) -> DownloadArtifact {
        DownloadArtifact::new(
            self.file("-without-subtitles", "mp4"),
            None,
            ArtifactState::Merged,
        )
    }

    pub fn final_output(&self, state: ArtifactState) -> DownloadArtifact {
        DownloadArtifact::new(self.file("", "mp4"), None, state)
    }

    pub fn subtitles(&self, locale: &str, format: &str) -> PathBuf {
        let base = sanitize_filename(&format!("{}_{locale}", self.title));
        self.directory.join(format!("{base}.{format}"))
    }
}
