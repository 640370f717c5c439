/// Language tag used when a locale has no known mapping.
pub const UNDETERMINED: &str = "und";

/// Maps a service locale such as `ja-JP` to its ISO 639-2 code, used as the
/// container language tag of audio and subtitle streams.
///
/// Unknown locales map to [`UNDETERMINED`].
pub fn iso639_2(locale: &str) -> &'static str {
    match locale {
        "af-ZA" => "afr",
        "am-ET" => "amh",
        "ar-ME" | "ar-SA" => "ara",
        "bg-BG" => "bul",
        "bn-BD" => "ben",
        "ca-ES" => "cat",
        "cs-CZ" => "ces",
        "da-DK" => "dan",
        "de-DE" => "deu",
        "el-GR" => "ell",
        "en-GB" | "en-IN" | "en-US" => "eng",
        "es-419" | "es-ES" | "es-LA" => "spa",
        "fa-IR" => "fas",
        "fi-FI" => "fin",
        "fr-CA" | "fr-FR" => "fra",
        "gu-IN" => "guj",
        "he-IL" => "heb",
        "hi-IN" => "hin",
        "hu-HU" => "hun",
        "id-ID" => "ind",
        "it-IT" => "ita",
        "ja-JP" => "jpn",
        "kn-IN" => "kan",
        "ko-KR" => "kor",
        "ml-IN" => "mal",
        "mr-IN" => "mar",
        "ms-MY" => "msa",
        "nl-NL" => "nld",
        "no-NO" => "nor",
        "pa-IN" => "pan",
        "pl-PL" => "pol",
        "pt-BR" | "pt-PT" => "por",
        "ro-RO" => "ron",
        "ru-RU" => "rus",
        "sk-SK" => "slk",
        "sv-SE" => "swe",
        "sw-KE" => "swa",
        "ta-IN" => "tam",
        "te-IN" => "tel",
        "th-TH" => "tha",
        "tr-TR" => "tur",
        "uk-UA" => "ukr",
        "ur-PK" => "urd",
        "vi-VN" => "vie",
        "xh-ZA" => "xho",
        "zh-CN" | "zh-HK" | "zh-TW" => "zho",
        "zu-ZA" => "zul",
        _ => UNDETERMINED,
    }
}
