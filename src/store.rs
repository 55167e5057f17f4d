use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Result, HonyakuError};
use crate::model::TranslationTask;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    saved_at: DateTime<Utc>,
    tasks: &'a [TranslationTask],
}

/// Tasks are kept as raw values so one bad record does not fail the whole load
#[derive(Debug, Deserialize)]
struct SnapshotIn {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    tasks: Vec<serde_json::Value>,
}

/// Persists the pending queue as a single snapshot file
#[derive(Debug, Clone)]
pub struct TranslationStore {
    path: PathBuf,
}

impl TranslationStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the snapshot; the previous one stays intact until the rename
    pub async fn save(&self, tasks: &[TranslationTask]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let snapshot = SnapshotOut {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            tasks,
        };
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| HonyakuError::Store(format!("Failed to serialize queue: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &self.path).await?;

        debug!("Saved {} queued tasks to {}", tasks.len(), self.path.display());
        Ok(())
    }

    /// Load the snapshot, skipping records that cannot be read
    pub async fn load(&self) -> Result<Vec<TranslationTask>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let snapshot: SnapshotIn = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Queue snapshot {} is unreadable, starting empty: {}", self.path.display(), e);
                return Ok(Vec::new());
            }
        };

        if snapshot.version > SNAPSHOT_VERSION {
            warn!("Queue snapshot version {} is newer than supported {}", snapshot.version, SNAPSHOT_VERSION);
        }

        let mut tasks = Vec::with_capacity(snapshot.tasks.len());
        for (index, value) in snapshot.tasks.into_iter().enumerate() {
            match serde_json::from_value::<TranslationTask>(value) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!("Skipping unreadable queued task #{}: {}", index, e),
            }
        }

        debug!("Loaded {} queued tasks from {}", tasks.len(), self.path.display());
        Ok(tasks)
    }

    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
