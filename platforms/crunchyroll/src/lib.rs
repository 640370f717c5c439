pub mod constants;
pub mod model;

use std::sync::LazyLock;

use anyhow::{bail, Context};
use constants::*;
use regex::Regex;
use reqwest::IntoUrl;
use serde::de::DeserializeOwned;
use tsumugi::{
    catalog::{Episode, Playback, PlaybackSource, Season},
    ClientIdentity, HttpClient, TsumugiError, TsumugiResult,
};

static WATCH_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://www\.crunchyroll\.com/(?:[a-z]{2}(?:-[a-z]{2})?/)?watch/([a-zA-Z0-9]+)")
        .unwrap()
});

/// Extracts the content code from a watch URL such as
/// `https://www.crunchyroll.com/fr/watch/GRDQPM1ZY/episode-title`.
pub fn parse_watch_code(url: &str) -> Option<&str> {
    WATCH_URL_REGEX
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str())
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub api: String,
    pub cms: String,
    pub playback: String,
    pub static_files: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api: API_BASE_URL.to_string(),
            cms: CMS_BASE_URL.to_string(),
            playback: PLAYBACK_BASE_URL.to_string(),
            static_files: STATIC_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Every endpoint below one base URL, for local servers.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api: base.to_string(),
            cms: format!("{base}/content/v2/cms"),
            playback: format!("{base}/playback/v2"),
            static_files: format!("{base}/skip-events/production"),
        }
    }
}

#[derive(Clone)]
pub struct CrunchyrollClient {
    /// Desktop browser identity for the catalog and playback APIs.
    web: HttpClient,
    /// Android app identity for account requests.
    app: HttpClient,
    endpoints: Endpoints,
    locale: String,
}

impl CrunchyrollClient {
    pub fn new(token: &str) -> anyhow::Result<Self> {
        Self::with_endpoints(token, Endpoints::default())
    }

    pub fn with_endpoints(token: &str, endpoints: Endpoints) -> anyhow::Result<Self> {
        let web = HttpClient::new(&ClientIdentity::new(FIREFOX_USER_AGENT).with_bearer(token))
            .context("build web client")?;
        let app = HttpClient::new(&ClientIdentity::new(ANDROID_USER_AGENT).with_bearer(token))
            .context("build app client")?;
        Ok(Self {
            web,
            app,
            endpoints,
            locale: DEFAULT_LOCALE.to_string(),
        })
    }

    /// Locale of titles in catalog listings.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        client: &HttpClient,
        url: impl IntoUrl,
        query: &[(&str, &str)],
    ) -> anyhow::Result<T> {
        let url = url.into_url()?;
        let data = client
            .get(url.clone())
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("{url} json deserialize"))?;
        Ok(data)
    }

    pub async fn check_premium(&self) -> anyhow::Result<bool> {
        let account: model::Account = self
            .get_json(&self.app, format!("{}/accounts/v1/me", self.endpoints.api), &[])
            .await?;
        let Some(external_id) = account.external_id else {
            return Ok(false);
        };

        let response = self
            .app
            .get(format!(
                "{}/subs/v1/subscriptions/{external_id}/benefits",
                self.endpoints.api
            ))
            .send()
            .await?;
        if !response.status().is_success() {
            log::debug!("Benefits request failed with {}", response.status());
            return Ok(false);
        }

        let body = response.text().await?;
        Ok(body.contains("premium") && !body.contains("Subscription Not Found"))
    }

    /// Resolves the content code of a watch URL into its series id.
    pub async fn series_id(&self, code: &str) -> anyhow::Result<String> {
        let events: model::SkipEvents = self
            .get_json(
                &self.web,
                format!("{}/{code}.json", self.endpoints.static_files),
                &[],
            )
            .await?;
        events
            .credits
            .series_id
            .with_context(|| format!("series id not found for {code}"))
    }

    /// Seasons of a series, without their episodes.
    pub async fn seasons(&self, series_id: &str) -> anyhow::Result<Vec<Season>> {
        let listing: model::Listing<model::Season> = self
            .get_json(
                &self.web,
                format!("{}/series/{series_id}/seasons", self.endpoints.cms),
                &[("locale", self.locale.as_str())],
            )
            .await?;
        Ok(listing.data.into_iter().map(Season::from).collect())
    }

    pub async fn episodes(&self, season_id: &str) -> anyhow::Result<Vec<Episode>> {
        let listing: model::Listing<model::Episode> = self
            .get_json(
                &self.web,
                format!("{}/seasons/{season_id}/episodes", self.endpoints.cms),
                &[("locale", self.locale.as_str())],
            )
            .await?;
        Ok(listing.data.into_iter().map(Episode::from).collect())
    }

    /// Every season of a series with its episodes.
    pub async fn catalog(&self, series_id: &str) -> anyhow::Result<Vec<Season>> {
        let mut seasons = self.seasons(series_id).await?;
        for season in seasons.iter_mut() {
            season.episodes = self
                .episodes(&season.id)
                .await
                .with_context(|| format!("episodes of {}", season.title))?;
            log::info!(
                "Found {} episode(s) in {}",
                season.episodes.len(),
                season.title
            );
        }
        Ok(seasons)
    }

    /// Manifest URL and subtitle tracks of one content GUID.
    pub async fn play(&self, guid: &str) -> anyhow::Result<Playback> {
        let response = self
            .web
            .get(format!(
                "{}/{guid}/web/firefox/play",
                self.endpoints.playback
            ))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == PLAYBACK_REFUSED {
            let error: model::PlayError = response.json().await.unwrap_or_default();
            bail!("playback of {guid} refused: {}", error.message());
        }
        if !status.is_success() {
            bail!("unexpected status {status} for playback of {guid}");
        }

        let play: model::Play = response
            .json()
            .await
            .with_context(|| "playback json deserialize")?;
        Ok(play.into())
    }
}

impl PlaybackSource for CrunchyrollClient {
    async fn playback(&self, guid: &str) -> TsumugiResult<Playback> {
        self.play(guid)
            .await
            .map_err(|e| TsumugiError::PlaybackUnavailable(format!("{e:#}")))
    }
}
