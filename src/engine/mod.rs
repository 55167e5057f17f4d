// Pluggable translation engines
//
// Every backend implements `TranslationEngine` and is registered once in the
// `EngineRegistry`:
// - Ollama: local LLM inference, no request quota
// - LibreTranslate: self-hosted or public HTTP API
// - DeepL: commercial HTTP API, requires an API key
//
// To add a new backend:
// 1. Create a struct holding its config and an HTTP client
// 2. Implement `TranslationEngine` for it
// 3. Add it to `EngineFactory::create_all`

pub mod common;
pub mod deepl;
pub mod libretranslate;
pub mod ollama;
pub mod registry;

use std::sync::Arc;
use async_trait::async_trait;

pub use common::*;
pub use registry::EngineRegistry;
use crate::config::EnginesConfig;
use crate::error::Result;

/// Capability contract shared by all translation backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranslationEngine: Send + Sync {
    /// Stable identifier, persisted as the selected engine
    fn id(&self) -> &'static str;

    /// Human readable name
    fn name(&self) -> &'static str;

    /// Runs without network access to a third party
    fn is_offline(&self) -> bool;

    /// Imposes a request quota; the worker throttles between tasks
    fn is_rate_limited(&self) -> bool;

    /// Whether required credentials and settings are present
    fn is_configured(&self) -> bool;

    /// Supported languages as (code, display name)
    fn supported_languages(&self) -> Vec<(String, String)>;

    /// Translate paragraphs, returning exactly one output per input paragraph
    async fn translate(
        &self,
        paragraphs: &[String],
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>>;

    /// Translate a short text such as a chapter title
    async fn translate_single(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String>;

    /// Guess the language of a sample, if the engine can
    async fn detect_language(&self, sample: &str) -> Option<String> {
        detect_language_locally(sample)
    }
}

/// Factory for the fixed set of engines
pub struct EngineFactory;

impl EngineFactory {
    /// Create every known engine from configuration, in registry order
    pub fn create_all(config: &EnginesConfig) -> Result<Vec<Arc<dyn TranslationEngine>>> {
        Ok(vec![
            Arc::new(ollama::OllamaEngine::new(config.ollama.clone())?),
            Arc::new(libretranslate::LibreTranslateEngine::new(config.libretranslate.clone())?),
            Arc::new(deepl::DeepLEngine::new(config.deepl.clone())?),
        ])
    }
}
