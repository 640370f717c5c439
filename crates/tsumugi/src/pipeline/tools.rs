use std::{
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::process::Command;

use crate::{error::TsumugiResult, license::ContentKey, lang::UNDETERMINED, process};

/// The external component that decrypts and muxes media files.
///
/// Implementations never touch their inputs. A failed call may leave a
/// partial `output` behind; the pipeline discards it.
pub trait MediaToolkit {
    fn decrypt(
        &self,
        key: &ContentKey,
        input: &Path,
        output: &Path,
    ) -> impl Future<Output = TsumugiResult<()>> + Send;

    /// Combines one video and one audio track. `audio_language` is an ISO 639-2
    /// code.
    fn merge(
        &self,
        video: &Path,
        audio: &Path,
        audio_language: &str,
        output: &Path,
    ) -> impl Future<Output = TsumugiResult<()>> + Send;

    fn add_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        language: &str,
        output: &Path,
    ) -> impl Future<Output = TsumugiResult<()>> + Send;
}

/// [`MediaToolkit`] backed by the ffmpeg command line.
#[derive(Debug, Clone)]
pub struct FfmpegCli {
    program: PathBuf,
    timeout: Duration,
}

impl FfmpegCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: process::DEFAULT_TIMEOUT,
        }
    }

    /// Looks up `ffmpeg` in `PATH`.
    pub fn detect() -> TsumugiResult<Self> {
        Ok(Self::new(which::which("ffmpeg")?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(["-y", "-hide_banner", "-loglevel", "error"]);
        command
    }

    pub fn decrypt_command(&self, key: &ContentKey, input: &Path, output: &Path) -> Command {
        let mut command = self.command();
        command
            .arg("-decryption_key")
            .arg(key.to_hex())
            .arg("-i")
            .arg(input)
            .args(["-c", "copy"])
            .arg(output);
        command
    }

    pub fn merge_command(
        &self,
        video: &Path,
        audio: &Path,
        audio_language: &str,
        output: &Path,
    ) -> Command {
        let mut command = self.command();
        command
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c:v", "copy", "-c:a", "copy"])
            .arg("-metadata:s:a:0")
            .arg(format!("language={audio_language}"))
            .arg("-metadata:s:v:0")
            .arg(format!("language={UNDETERMINED}"))
            .arg(output);
        command
    }

    pub fn subtitles_command(
        &self,
        video: &Path,
        subtitles: &Path,
        language: &str,
        output: &Path,
    ) -> Command {
        let mut command = self.command();
        command
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(subtitles)
            .args(["-c", "copy", "-c:s", "mov_text"])
            .arg("-metadata:s:s:0")
            .arg(format!("language={language}"))
            .arg(output);
        command
    }
}

impl MediaToolkit for FfmpegCli {
    async fn decrypt(&self, key: &ContentKey, input: &Path, output: &Path) -> TsumugiResult<()> {
        tracing::debug!("Decrypting {} with ffmpeg...", input.display());
        process::run_scoped(self.decrypt_command(key, input, output), self.timeout).await?;
        Ok(())
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        audio_language: &str,
        output: &Path,
    ) -> TsumugiResult<()> {
        tracing::debug!("Merging with ffmpeg CLI...");
        process::run_scoped(
            self.merge_command(video, audio, audio_language, output),
            self.timeout,
        )
        .await?;
        Ok(())
    }

    async fn add_subtitles(
        &self,
        video: &Path,
        subtitles: &Path,
        language: &str,
        output: &Path,
    ) -> TsumugiResult<()> {
        tracing::debug!("Adding subtitles {} with ffmpeg...", subtitles.display());
        process::run_scoped(
            self.subtitles_command(video, subtitles, language, output),
            self.timeout,
        )
        .await?;
        Ok(())
    }
}
