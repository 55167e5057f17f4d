use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LibreTranslateConfig;
use crate::error::{Result, HonyakuError};
use super::{TranslationEngine, common::{build_client, check_paragraph_count, language_list}};

const ENGINE_ID: &str = "libretranslate";

const SUPPORTED: &[&str] = &[
    "en", "ja", "ko", "zh", "fr", "de", "es", "ru", "it", "pt", "pl", "nl", "tr", "ar", "hi",
    "th", "vi", "id", "sv", "da", "fi", "he", "hu", "cs", "sk", "bg", "ro", "el", "uk",
];

#[derive(Debug, Serialize)]
struct TranslateRequest<'a, Q: Serialize> {
    q: Q,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse<T> {
    #[serde(rename = "translatedText")]
    translated_text: T,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

/// LibreTranslate HTTP API, self-hosted or public
pub struct LibreTranslateEngine {
    client: Client,
    config: LibreTranslateConfig,
}

impl LibreTranslateEngine {
    pub fn new(config: LibreTranslateConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    async fn post<Q: Serialize + Send + Sync, T: DeserializeOwned + Send>(
        &self,
        q: Q,
        source_language: &str,
        target_language: &str,
    ) -> Result<T> {
        let request = TranslateRequest {
            q,
            source: source_language,
            target: target_language,
            format: "text",
            api_key: self.config.api_key.as_deref(),
        };

        let url = format!("{}/translate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(HonyakuError::engine(
                ENGINE_ID,
                format!("LibreTranslate API error {}: {}", status, message),
            ));
        }

        let parsed: TranslateResponse<T> = response.json().await
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("Failed to parse response: {}", e)))?;
        Ok(parsed.translated_text)
    }
}

#[async_trait]
impl TranslationEngine for LibreTranslateEngine {
    fn id(&self) -> &'static str {
        ENGINE_ID
    }

    fn name(&self) -> &'static str {
        "LibreTranslate"
    }

    fn is_offline(&self) -> bool {
        false
    }

    fn is_rate_limited(&self) -> bool {
        true
    }

    fn is_configured(&self) -> bool {
        !self.config.endpoint.trim().is_empty()
    }

    fn supported_languages(&self) -> Vec<(String, String)> {
        language_list(Some(SUPPORTED))
    }

    async fn translate(
        &self,
        paragraphs: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>> {
        if paragraphs.is_empty() {
            return Ok(Vec::new());
        }
        let translated: Vec<String> = self.post(paragraphs, source_language, target_language).await?;
        check_paragraph_count(ENGINE_ID, paragraphs.len(), translated)
    }

    async fn translate_single(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        self.post(text, source_language, target_language).await
    }
}
