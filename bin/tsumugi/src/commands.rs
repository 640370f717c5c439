pub mod download;
pub mod list;

use clap::{Args, Subcommand};
use tsumugi_crunchyroll::{parse_watch_code, CrunchyrollClient};

use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum TsumugiCommand {
    /// Download the episodes of a series
    #[clap(visible_alias = "dl")]
    Download(download::DownloadCommand),

    /// List seasons, episodes and audio locales of a series
    #[clap(visible_alias = "ls")]
    List(list::ListCommand),
}

impl TsumugiCommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            Self::Download(command) => command.download(config).await,
            Self::List(command) => command.list(config).await,
        }
    }
}

/// Which series, and as whom
#[derive(Args, Clone, Debug)]
pub struct SourceOptions {
    /// Watch URL of any episode of the series
    pub url: String,

    /// Bearer token of a logged-in account
    #[clap(long, env = "TSUMUGI_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Locale of catalog titles
    #[clap(long)]
    pub locale: Option<String>,
}

impl SourceOptions {
    pub fn token(&self, config: &Config) -> anyhow::Result<String> {
        self.token
            .clone()
            .or_else(|| config.token.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("A bearer token is required, pass --token or set it in the config")
            })
    }

    pub fn client(&self, token: &str, config: &Config) -> anyhow::Result<CrunchyrollClient> {
        let mut client = CrunchyrollClient::new(token)?;
        if let Some(locale) = self.locale.as_ref().or(config.locale.as_ref()) {
            client = client.locale(locale.as_str());
        }
        Ok(client)
    }

    pub async fn series_id(&self, client: &CrunchyrollClient) -> anyhow::Result<String> {
        let code = parse_watch_code(&self.url)
            .ok_or_else(|| anyhow::anyhow!("{} is not a watch URL", self.url))?;
        let series_id = client.series_id(code).await?;
        tracing::info!("Series id: {series_id}");
        Ok(series_id)
    }
}
