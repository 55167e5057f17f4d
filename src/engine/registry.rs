use std::path::{Path, PathBuf};
use std::sync::Arc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, HonyakuError};
use super::TranslationEngine;

#[derive(Debug, Default, Serialize, Deserialize)]
struct EngineSettings {
    selected_engine: Option<String>,
}

/// Fixed set of engines plus the persisted selection
pub struct EngineRegistry {
    engines: Vec<Arc<dyn TranslationEngine>>,
    selected: RwLock<String>,
    settings_path: Option<PathBuf>,
}

impl EngineRegistry {
    /// Registry without persistence, selecting `default_id`
    pub fn new(engines: Vec<Arc<dyn TranslationEngine>>, default_id: &str) -> Self {
        Self {
            engines,
            selected: RwLock::new(default_id.to_string()),
            settings_path: None,
        }
    }

    /// Registry whose selection is read from and written to `settings_path`
    pub fn with_settings<P: AsRef<Path>>(
        engines: Vec<Arc<dyn TranslationEngine>>,
        default_id: &str,
        settings_path: P,
    ) -> Self {
        let settings_path = settings_path.as_ref().to_path_buf();
        let selected = load_settings(&settings_path)
            .selected_engine
            .unwrap_or_else(|| default_id.to_string());
        debug!("Selected translation engine: {}", selected);

        Self {
            engines,
            selected: RwLock::new(selected),
            settings_path: Some(settings_path),
        }
    }

    pub fn engines(&self) -> &[Arc<dyn TranslationEngine>] {
        &self.engines
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TranslationEngine>> {
        self.engines.iter().find(|e| e.id() == id).cloned()
    }

    pub fn selected_id(&self) -> String {
        self.selected.read().clone()
    }

    /// Selected engine, or the first registered one if the stored id is unknown
    pub fn selected_engine(&self) -> Option<Arc<dyn TranslationEngine>> {
        let selected = self.selected.read();
        self.get(&selected).or_else(|| self.engines.first().cloned())
    }

    /// Selected engine only if it is configured; the worker refuses to run otherwise
    pub fn engine(&self) -> Option<Arc<dyn TranslationEngine>> {
        self.selected_engine().filter(|e| e.is_configured())
    }

    /// Change the selection and persist it
    pub fn select(&self, id: &str) -> Result<()> {
        if self.get(id).is_none() {
            return Err(HonyakuError::UnknownEngine(id.to_string()));
        }
        *self.selected.write() = id.to_string();
        info!("Selected translation engine: {}", id);

        if let Some(path) = &self.settings_path {
            save_settings(path, &EngineSettings {
                selected_engine: Some(id.to_string()),
            })?;
        }
        Ok(())
    }

    pub fn offline_engines(&self) -> Vec<Arc<dyn TranslationEngine>> {
        self.engines.iter().filter(|e| e.is_offline()).cloned().collect()
    }

    pub fn rate_limited_engines(&self) -> Vec<Arc<dyn TranslationEngine>> {
        self.engines.iter().filter(|e| e.is_rate_limited()).cloned().collect()
    }
}

fn load_settings(path: &Path) -> EngineSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable engine settings {}: {}", path.display(), e);
            EngineSettings::default()
        }),
        Err(_) => EngineSettings::default(),
    }
}

fn save_settings(path: &Path, settings: &EngineSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
