//! Host-side collaborators: chapter metadata and raw chapter content.
//!
//! The service only depends on `ChapterLibrary`. `LocalLibrary` is the
//! manifest-backed implementation the command line tool uses.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::engine::build_client;
use crate::error::{Result, HonyakuError};

/// Metadata for one chapter as known to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub chapter_id: i64,
    pub parent_id: i64,
    pub name: String,
    /// Local copy, read before falling back to the source
    #[serde(default)]
    pub downloaded_path: Option<PathBuf>,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[async_trait]
pub trait ChapterLibrary: Send + Sync {
    /// Look up a chapter; `Ok(None)` when the host does not know it
    async fn chapter(&self, chapter_id: i64) -> Result<Option<ChapterInfo>>;

    /// Raw formatted text of a chapter
    async fn content(&self, chapter: &ChapterInfo) -> Result<String>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    chapters: Vec<ChapterInfo>,
}

/// Chapters listed in a JSON manifest; relative paths resolve against its directory
pub struct LocalLibrary {
    chapters: HashMap<i64, ChapterInfo>,
    base_dir: PathBuf,
    client: Client,
}

impl LocalLibrary {
    pub fn new(chapters: Vec<ChapterInfo>, base_dir: PathBuf) -> Result<Self> {
        Ok(Self {
            chapters: chapters.into_iter().map(|c| (c.chapter_id, c)).collect(),
            base_dir,
            client: build_client(60)?,
        })
    }

    /// Load a manifest; a missing manifest is an empty library
    pub async fn from_manifest<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let manifest = match fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<Manifest>(&content)
                .map_err(|e| HonyakuError::Config(format!("Failed to parse library manifest: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Library manifest {} not found", path.display());
                Manifest::default()
            }
            Err(e) => return Err(e.into()),
        };

        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::new(manifest.chapters, base_dir)
    }

    pub fn chapters(&self) -> impl Iterator<Item = &ChapterInfo> {
        self.chapters.values()
    }

    /// Chapters of a parent ordered by id
    pub fn chapters_of(&self, parent_id: i64) -> Vec<&ChapterInfo> {
        let mut chapters: Vec<_> = self.chapters.values().filter(|c| c.parent_id == parent_id).collect();
        chapters.sort_by_key(|c| c.chapter_id);
        chapters
    }

    async fn read_downloaded(&self, path: &Path) -> Option<String> {
        let path = if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) };
        match fs::read_to_string(&path).await {
            Ok(content) => Some(content),
            Err(e) => {
                debug!("Downloaded copy {} unavailable: {}", path.display(), e);
                None
            }
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching chapter content from {}", url);
        let response = self.client
            .get(url)
            .send()
            .await
            .map_err(|e| HonyakuError::Content(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(HonyakuError::Content(format!("Fetching {} returned {}", url, response.status())));
        }
        response.text().await
            .map_err(|e| HonyakuError::Content(format!("Failed to read {}: {}", url, e)))
    }
}

#[async_trait]
impl ChapterLibrary for LocalLibrary {
    async fn chapter(&self, chapter_id: i64) -> Result<Option<ChapterInfo>> {
        Ok(self.chapters.get(&chapter_id).cloned())
    }

    async fn content(&self, chapter: &ChapterInfo) -> Result<String> {
        if let Some(path) = &chapter.downloaded_path {
            if let Some(content) = self.read_downloaded(path).await {
                return Ok(content);
            }
        }

        match &chapter.source_url {
            Some(url) => self.fetch(url).await,
            None => Err(HonyakuError::Content(format!(
                "Chapter {} has neither a downloaded copy nor a source",
                chapter.chapter_id
            ))),
        }
    }
}
