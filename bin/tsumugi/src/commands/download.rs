use std::{num::NonZeroU32, path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use clap::{Args, Parser};
use tsumugi::{
    catalog::{available_audio_locales, plan_batch, BatchSelection, RangeSet},
    http::ClientIdentity,
    license::{LicenseExchange, LicenseServer, LocalCdm, RemoteCdm},
    pipeline::{FfmpegCli, DEFAULT_CONCURRENCY},
    AcquisitionPipeline, HttpClient,
};
use tsumugi_crunchyroll::constants::{ANDROID_USER_AGENT, FIREFOX_USER_AGENT, LICENSE_URL};
use url::Url;

use super::SourceOptions;
use crate::{cdm::CdmBackend, config::Config};

#[derive(Parser, Clone, Debug)]
pub struct DownloadCommand {
    #[clap(flatten)]
    pub source: SourceOptions,

    #[clap(flatten)]
    pub http: HttpOptions,

    #[clap(flatten)]
    pub download: DownloadOptions,

    #[clap(flatten)]
    pub output: OutputOptions,

    #[clap(flatten)]
    pub cdm: CdmOptions,
}

impl DownloadCommand {
    pub async fn download(self, config: Config) -> anyhow::Result<()> {
        let token = self.source.token(&config)?;
        let client = self.source.client(&token, &config)?;
        if !client.check_premium().await? {
            bail!("This account has no premium subscription");
        }

        let series_id = self.source.series_id(&client).await?;
        let seasons = client.catalog(&series_id).await?;

        let Some(audio_locale) = self.download.audio_locale.or(config.audio_locale) else {
            let available: Vec<_> = available_audio_locales(&seasons).into_iter().collect();
            bail!(
                "--audio-locale is required, available: {}",
                available.join(", ")
            );
        };
        let selection = BatchSelection {
            audio_locale,
            subtitle_locale: self.download.subtitle_locale.or(config.subtitle_locale),
            seasons: self.download.seasons,
            episodes: self.download.episodes,
        };
        let jobs = plan_batch(&seasons, &selection);
        if jobs.is_empty() {
            bail!("No episode has {} audio", selection.audio_locale);
        }

        let timeout = Duration::from_secs(
            self.http
                .timeout
                .or(config.timeout)
                .unwrap_or(ClientIdentity::DEFAULT_TIMEOUT.as_secs()),
        );
        let manifest_client = HttpClient::new(
            &ClientIdentity::new(ANDROID_USER_AGENT)
                .with_bearer(&token)
                .with_timeout(timeout),
        )?;
        let fragment_client = HttpClient::new(&ClientIdentity::browser().with_timeout(timeout))?;
        let license_client = reqwest::Client::builder()
            .user_agent(FIREFOX_USER_AGENT)
            .timeout(timeout)
            .build()?;

        let cdm = self.cdm.into_cdm(license_client.clone(), config.cdm)?;
        let server = LicenseServer::new(license_client, Url::parse(LICENSE_URL)?);
        let toolkit = match self.output.ffmpeg.or(config.ffmpeg) {
            Some(program) => FfmpegCli::new(program),
            None => FfmpegCli::detect().context("ffmpeg not found, pass --ffmpeg")?,
        };
        let output_dir = self
            .output
            .output
            .or(config.output)
            .unwrap_or_else(|| PathBuf::from("output"));
        let concurrency = self
            .download
            .concurrency
            .or(config.concurrency)
            .unwrap_or(DEFAULT_CONCURRENCY);

        let pipeline = AcquisitionPipeline::new(
            client,
            LicenseExchange::new(cdm, server),
            toolkit,
            output_dir,
        )
        .manifest_client(manifest_client)
        .fragment_client(fragment_client)
        .bearer(token)
        .concurrency(concurrency);

        let reports = pipeline.run_batch(&jobs).await;
        let failed = reports.iter().filter(|report| !report.is_success()).count();
        if failed > 0 {
            bail!("{failed} of {} episode(s) failed", reports.len());
        }
        Ok(())
    }
}

#[derive(Args, Clone, Debug, Default)]
pub struct HttpOptions {
    /// HTTP timeout, in seconds
    #[clap(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct DownloadOptions {
    /// Audio locale to download, e.g. ja-JP
    #[clap(short, long)]
    pub audio_locale: Option<String>,

    /// Subtitle locale to add, or "none"
    #[clap(short, long)]
    pub subtitle_locale: Option<String>,

    /// Seasons by position, e.g. 1-2,4
    #[clap(long)]
    pub seasons: Option<RangeSet>,

    /// Episode numbers within each season, e.g. 1-3,5,8-
    #[clap(short, long)]
    pub episodes: Option<RangeSet>,

    /// Episodes downloaded at the same time
    #[clap(long)]
    pub concurrency: Option<NonZeroU32>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct OutputOptions {
    /// Output directory
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// ffmpeg binary, searched in PATH by default
    #[clap(long)]
    pub ffmpeg: Option<PathBuf>,
}

/// CDM the license challenge is generated by. A local device takes
/// precedence over a remote CDM service.
#[derive(Args, Clone, Debug, Default)]
pub struct CdmOptions {
    /// Widevine device file
    #[clap(long = "cdm-wvd", conflicts_with_all = ["client_id", "private_key"])]
    pub wvd: Option<PathBuf>,

    /// Client id of a dumped device, e.g. client_id.bin
    #[clap(long = "cdm-client-id", requires = "private_key")]
    pub client_id: Option<PathBuf>,

    /// Private key of a dumped device, e.g. private_key.pem
    #[clap(long = "cdm-private-key", requires = "client_id")]
    pub private_key: Option<PathBuf>,

    /// Remote CDM service
    #[clap(long = "cdm-host")]
    pub host: Option<String>,

    #[clap(long = "cdm-device")]
    pub device: Option<String>,

    #[clap(long = "cdm-secret", env = "TSUMUGI_CDM_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

impl CdmOptions {
    pub fn into_cdm(
        self,
        client: reqwest::Client,
        config: crate::config::CdmConfig,
    ) -> anyhow::Result<CdmBackend> {
        let wvd = self.wvd.or(config.wvd);
        let client_id = self.client_id.or(config.client_id);
        let private_key = self.private_key.or(config.private_key);
        match (wvd, client_id, private_key) {
            (Some(wvd), _, _) => {
                tracing::info!("Using the local CDM device {}", wvd.display());
                return Ok(CdmBackend::Local(LocalCdm::from_wvd(&wvd)?));
            }
            (None, Some(client_id), Some(private_key)) => {
                tracing::info!("Using the local CDM device {}", client_id.display());
                return Ok(CdmBackend::Local(LocalCdm::from_files(
                    &client_id,
                    &private_key,
                )?));
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                bail!("A local CDM device needs both a client id and a private key")
            }
            (None, None, None) => {}
        }

        let host = self
            .host
            .or(config.host)
            .context("--cdm-host is required")?;
        let device = self
            .device
            .or(config.device)
            .context("--cdm-device is required")?;
        let secret = self
            .secret
            .or(config.secret)
            .context("--cdm-secret is required")?;
        Ok(CdmBackend::Remote(RemoteCdm::new(
            client, &host, &device, &secret,
        )?))
    }
}
