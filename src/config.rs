use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::error::{Result, HonyakuError};

fn default_dropped_history() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub engines: EnginesConfig,
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the cache, queue snapshot, settings and logs
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Retries after the first failed attempt before a task is dropped
    pub max_retries: u32,
    /// Delay between tasks when the engine is rate limited (0 disables)
    pub rate_limit_delay_ms: u64,
    /// Also translate the chapter title (best effort)
    pub translate_titles: bool,
    /// Restart the worker on a restored, non-empty queue
    pub resume_on_start: bool,
    /// Store the source markup next to the translation
    pub keep_original: bool,
    /// Dropped tasks remembered for the host to resurface (0 disables)
    #[serde(default = "default_dropped_history")]
    pub dropped_history: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Engine used when no selection has been persisted yet
    pub selected: String,
    pub ollama: OllamaConfig,
    pub libretranslate: LibreTranslateConfig,
    pub deepl: DeepLConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama endpoint URL
    pub endpoint: String,
    /// LLM model to use for translation
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibreTranslateConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepLConfig {
    /// Free-tier keys use api-free.deepl.com
    pub endpoint: String,
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// JSON manifest describing the chapters the CLI can translate
    pub manifest: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from(".honyaku"),
            },
            worker: WorkerConfig {
                max_retries: 2,
                rate_limit_delay_ms: 1000,
                translate_titles: true,
                resume_on_start: true,
                keep_original: false,
                dropped_history: default_dropped_history(),
            },
            engines: EnginesConfig {
                selected: "ollama".to_string(),
                ollama: OllamaConfig {
                    endpoint: "http://localhost:11434".to_string(),
                    model: "llama3.2:3b".to_string(),
                    timeout_secs: default_timeout_secs(),
                },
                libretranslate: LibreTranslateConfig {
                    endpoint: "http://localhost:5000".to_string(),
                    api_key: None,
                    timeout_secs: default_timeout_secs(),
                },
                deepl: DeepLConfig {
                    endpoint: "https://api-free.deepl.com".to_string(),
                    api_key: None,
                    timeout_secs: default_timeout_secs(),
                },
            },
            library: LibraryConfig {
                manifest: PathBuf::from("library.json"),
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HonyakuError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| HonyakuError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| HonyakuError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| HonyakuError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.storage.data_dir.join("cache")
    }

    pub fn queue_file(&self) -> PathBuf {
        self.storage.data_dir.join("queue.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.storage.data_dir.join("settings.json")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.storage.data_dir.join("log")
    }
}

impl WorkerConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }
}
