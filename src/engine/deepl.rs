use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DeepLConfig;
use crate::error::{Result, HonyakuError};
use super::{TranslationEngine, common::{build_client, check_paragraph_count, language_list}};

const ENGINE_ID: &str = "deepl";

const SUPPORTED: &[&str] = &[
    "en", "ja", "ko", "zh", "fr", "de", "es", "ru", "it", "pt", "pl", "nl", "tr", "ar", "id",
    "sv", "da", "no", "fi", "hu", "cs", "sk", "bg", "ro", "el", "uk", "et", "lv", "lt", "sl",
];

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    text: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    source_lang: Option<String>,
    target_lang: String,
    preserve_formatting: bool,
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// DeepL expects upper-case codes and no source language for auto-detection
fn deepl_code(code: &str) -> String {
    code.to_uppercase()
}

fn source_code(code: &str) -> Option<String> {
    match code.trim() {
        "" | "auto" => None,
        other => Some(deepl_code(other)),
    }
}

/// DeepL HTTP API
pub struct DeepLEngine {
    client: Client,
    config: DeepLConfig,
}

impl DeepLEngine {
    pub fn new(config: DeepLConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    async fn request(
        &self,
        text: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>> {
        let api_key = self.config.api_key.as_deref()
            .ok_or_else(|| HonyakuError::Config("DeepL API key is not set".to_string()))?;

        let request = TranslateRequest {
            text,
            source_lang: source_code(source_language),
            target_lang: deepl_code(target_language),
            preserve_formatting: true,
        };

        let url = format!("{}/v2/translate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .header("Authorization", format!("DeepL-Auth-Key {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(HonyakuError::engine(
                ENGINE_ID,
                format!("DeepL API error {}: {}", status, error_text),
            ));
        }

        let parsed: TranslateResponse = response.json().await
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("Failed to parse response: {}", e)))?;

        Ok(parsed.translations.into_iter().map(|t| t.text).collect())
    }
}

#[async_trait]
impl TranslationEngine for DeepLEngine {
    fn id(&self) -> &'static str {
        ENGINE_ID
    }

    fn name(&self) -> &'static str {
        "DeepL"
    }

    fn is_offline(&self) -> bool {
        false
    }

    fn is_rate_limited(&self) -> bool {
        true
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|key| !key.trim().is_empty())
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
        let translated = self.request(paragraphs, source_language, target_language).await?;
        check_paragraph_count(ENGINE_ID, paragraphs.len(), translated)
    }

    async fn translate_single(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let input = [text.to_string()];
        self.request(&input, source_language, target_language)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HonyakuError::engine(ENGINE_ID, "Empty translation received"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> DeepLConfig {
        DeepLConfig {
            endpoint: "https://api-free.deepl.com".to_string(),
            api_key: api_key.map(str::to_string),
            timeout_secs: 5,
        }
    }

    #[test]
    fn test_configured_requires_api_key() {
        assert!(!DeepLEngine::new(config(None)).unwrap().is_configured());
        assert!(!DeepLEngine::new(config(Some("  "))).unwrap().is_configured());
        assert!(DeepLEngine::new(config(Some("key:fx"))).unwrap().is_configured());
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(source_code("auto"), None);
        assert_eq!(source_code("ja"), Some("JA".to_string()));
        assert_eq!(deepl_code("fr"), "FR");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let engine = DeepLEngine::new(config(None)).unwrap();
        let result = tokio_test::block_on(engine.translate(&["Hi".to_string()], "en", "fr"));
        assert!(matches!(result, Err(HonyakuError::Config(_))));
    }
}
