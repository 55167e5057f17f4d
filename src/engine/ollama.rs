use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OllamaConfig;
use crate::error::{Result, HonyakuError};
use super::{TranslationEngine, common::{build_client, check_paragraph_count, language_list, language_name}};

const ENGINE_ID: &str = "ollama";

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Clone, Deserialize)]
struct TextResult {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ParagraphsResult {
    paragraphs: Vec<String>,
}

/// Local LLM translation through an Ollama server
pub struct OllamaEngine {
    client: Client,
    config: OllamaConfig,
}

impl OllamaEngine {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            config,
        })
    }

    /// Send a JSON-format prompt and return the raw model response
    async fn generate(&self, prompt: String) -> Result<String> {
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt,
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(HonyakuError::engine(
                ENGINE_ID,
                format!("Ollama API error {}: {}", status, error_text),
            ));
        }

        let generated: GenerateResponse = response.json().await
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("Failed to parse response: {}", e)))?;

        let raw = generated.response.trim().to_string();
        if raw.is_empty() {
            return Err(HonyakuError::engine(ENGINE_ID, "Empty translation received"));
        }
        Ok(raw)
    }
}

fn build_paragraphs_prompt(paragraphs: &[String], source_language: &str, target_language: &str) -> String {
    let source_name = language_name(source_language);
    let target_name = language_name(target_language);
    let input = serde_json::json!({ "paragraphs": paragraphs });

    format!(
        "You are a professional literary translator.\n\
         \n\
         Translate every paragraph below from {} to {} ONLY.\n\
         The target language is: {} (language code: {})\n\
         \n\
         Return ONLY JSON in the form {{\"paragraphs\":[\"...\"]}} with exactly {} entries,\n\
         one per input paragraph, in the same order. Keep line breaks inside a paragraph.\n\
         Do not include any explanations or notes.\n\
         \n\
         [Paragraphs to translate]\n\
         {}\n",
        source_name, target_name, target_name, target_language, paragraphs.len(), input
    )
}

fn build_text_prompt(text: &str, source_language: &str, target_language: &str) -> String {
    let source_name = language_name(source_language);
    let target_name = language_name(target_language);

    format!(
        "You are a professional translator.\n\
         \n\
         CRITICAL: You must translate the text from {} to {} ONLY.\n\
         The target language is: {} (language code: {})\n\
         \n\
         Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
         Do not include any explanations, alternatives, or text in other languages.\n\
         \n\
         Text to translate: \"{}\"\n",
        source_name, target_name, target_name, target_language, target_name, text
    )
}

#[async_trait]
impl TranslationEngine for OllamaEngine {
    fn id(&self) -> &'static str {
        ENGINE_ID
    }

    fn name(&self) -> &'static str {
        "Ollama (local LLM)"
    }

    fn is_offline(&self) -> bool {
        true
    }

    fn is_rate_limited(&self) -> bool {
        false
    }

    fn is_configured(&self) -> bool {
        !self.config.endpoint.trim().is_empty() && !self.config.model.trim().is_empty()
    }

    fn supported_languages(&self) -> Vec<(String, String)> {
        language_list(None)
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

        let raw = self.generate(build_paragraphs_prompt(paragraphs, source_language, target_language)).await?;
        debug!("Raw Ollama response: {}", raw);

        let result: ParagraphsResult = serde_json::from_str(&raw)
            .map_err(|e| HonyakuError::engine(ENGINE_ID, format!("Malformed paragraphs JSON: {}", e)))?;

        let translated = result.paragraphs.into_iter().map(|p| p.trim().to_string()).collect();
        check_paragraph_count(ENGINE_ID, paragraphs.len(), translated)
    }

    async fn translate_single(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String> {
        let raw = self.generate(build_text_prompt(text, source_language, target_language)).await?;

        if let Ok(result) = serde_json::from_str::<TextResult>(&raw) {
            return Ok(result.text.trim().to_string());
        }

        // Models occasionally ignore the JSON format; take the first non-empty line
        raw.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| HonyakuError::engine(ENGINE_ID, "Empty translation received"))
    }
}
