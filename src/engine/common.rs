use std::time::Duration;
use reqwest::Client;

use crate::error::{Result, HonyakuError};

/// Language codes with their English display names.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("zh", "Chinese"),
    ("fr", "French"),
    ("de", "German"),
    ("es", "Spanish"),
    ("ru", "Russian"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("pl", "Polish"),
    ("nl", "Dutch"),
    ("tr", "Turkish"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("th", "Thai"),
    ("vi", "Vietnamese"),
    ("id", "Indonesian"),
    ("sv", "Swedish"),
    ("da", "Danish"),
    ("no", "Norwegian"),
    ("fi", "Finnish"),
    ("he", "Hebrew"),
    ("hu", "Hungarian"),
    ("cs", "Czech"),
    ("sk", "Slovak"),
    ("bg", "Bulgarian"),
    ("ro", "Romanian"),
    ("el", "Greek"),
    ("uk", "Ukrainian"),
    ("et", "Estonian"),
    ("lv", "Latvian"),
    ("lt", "Lithuanian"),
    ("sl", "Slovenian"),
];

/// Convert a language code to its display name, falling back to the code itself
pub fn language_name(code: &str) -> String {
    let code = code.to_lowercase();
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or(code)
}

/// Owned (code, name) pairs for the given codes, or the full table
pub fn language_list(codes: Option<&[&str]>) -> Vec<(String, String)> {
    LANGUAGES
        .iter()
        .filter(|(code, _)| codes.map_or(true, |allowed| allowed.contains(code)))
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect()
}

/// HTTP client shared by the remote engines
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| HonyakuError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// Ensure an engine returned one translation per input paragraph
pub fn check_paragraph_count(engine: &str, expected: usize, translated: Vec<String>) -> Result<Vec<String>> {
    if translated.len() != expected {
        return Err(HonyakuError::engine(
            engine,
            format!("expected {} paragraphs, received {}", expected, translated.len()),
        ));
    }
    Ok(translated)
}

/// Detect the language of a sample with whatlang, returning an ISO 639-1 code
pub fn detect_language_locally(sample: &str) -> Option<String> {
    let info = whatlang::detect(sample)?;
    let code = match info.lang() {
        whatlang::Lang::Eng => "en",
        whatlang::Lang::Jpn => "ja",
        whatlang::Lang::Kor => "ko",
        whatlang::Lang::Cmn => "zh",
        whatlang::Lang::Fra => "fr",
        whatlang::Lang::Deu => "de",
        whatlang::Lang::Spa => "es",
        whatlang::Lang::Rus => "ru",
        whatlang::Lang::Ita => "it",
        whatlang::Lang::Por => "pt",
        whatlang::Lang::Pol => "pl",
        whatlang::Lang::Nld => "nl",
        whatlang::Lang::Tur => "tr",
        whatlang::Lang::Ara => "ar",
        whatlang::Lang::Hin => "hi",
        whatlang::Lang::Tha => "th",
        whatlang::Lang::Vie => "vi",
        whatlang::Lang::Ind => "id",
        whatlang::Lang::Swe => "sv",
        whatlang::Lang::Dan => "da",
        whatlang::Lang::Fin => "fi",
        whatlang::Lang::Heb => "he",
        whatlang::Lang::Hun => "hu",
        whatlang::Lang::Ces => "cs",
        whatlang::Lang::Ukr => "uk",
        _ => return None,
    };
    Some(code.to_string())
}
