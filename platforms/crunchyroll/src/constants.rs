pub const API_BASE_URL: &str = "https://beta-api.crunchyroll.com";
pub const CMS_BASE_URL: &str = "https://www.crunchyroll.com/content/v2/cms";
pub const PLAYBACK_BASE_URL: &str = "https://www.crunchyroll.com/playback/v2";
pub const STATIC_BASE_URL: &str = "https://static.crunchyroll.com/skip-events/production";
pub const LICENSE_URL: &str = "https://www.crunchyroll.com/license/v1/license/widevine";

/// Catalog, playback and license requests are sent as desktop Firefox.
pub const FIREFOX_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";
/// Manifests and account requests are sent as the Android app.
pub const ANDROID_USER_AGENT: &str = "Crunchyroll/3.32.2 Android/7.1.2 okhttp/4.9.2";

pub const DEFAULT_LOCALE: &str = "en-US";

/// Status the playback endpoint answers with when it refuses to stream, e.g.
/// too many active streams.
pub const PLAYBACK_REFUSED: u16 = 420;
