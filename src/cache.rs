//! Durable translation cache.
//!
//! One JSON file per `(parent, chapter, language)` grouped under a directory per
//! parent, so evicting a whole work is a single directory removal:
//!
//! ```text
//! <root>/<parent_id>/<chapter_id>_<language>.json
//! ```

use std::path::{Path, PathBuf};
use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, HonyakuError};
use crate::model::CachedTranslation;

/// Aggregate statistics for the cache directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheInfo {
    pub entries: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct TranslationCache {
    root: PathBuf,
}

impl TranslationCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn parent_dir(&self, parent_id: i64) -> PathBuf {
        self.root.join(parent_id.to_string())
    }

    fn entry_path(&self, parent_id: i64, chapter_id: i64, target_language: &str) -> PathBuf {
        self.parent_dir(parent_id)
            .join(format!("{}_{}.json", chapter_id, encode_language(target_language)))
    }

    /// Whether a readable entry exists; a corrupt file does not count
    pub async fn has(&self, parent_id: i64, chapter_id: i64, target_language: &str) -> bool {
        self.get(parent_id, chapter_id, target_language).await.is_some()
    }

    /// Read an entry; a missing or unreadable record is a cache miss
    pub async fn get(&self, parent_id: i64, chapter_id: i64, target_language: &str) -> Option<CachedTranslation> {
        let path = self.entry_path(parent_id, chapter_id, target_language);
        let content = fs::read_to_string(&path).await.ok()?;

        match serde_json::from_str::<CachedTranslation>(&content) {
            Ok(entry) => {
                debug!("Translation cache hit: chapter {} ({})", chapter_id, target_language);
                Some(entry)
            }
            Err(e) => {
                warn!("Failed to parse translation cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        parent_id: i64,
        chapter_id: i64,
        source_language: &str,
        target_language: &str,
        original: Option<&str>,
        translated: &str,
        engine_id: &str,
    ) -> Result<()> {
        self.put_entry(&CachedTranslation {
            chapter_id,
            parent_id,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            engine_id: engine_id.to_string(),
            original_content: original.map(str::to_string),
            translated_content: translated.to_string(),
            translated_title: None,
            created_at: Utc::now(),
        })
        .await
    }

    /// Create or overwrite an entry
    pub async fn put_entry(&self, entry: &CachedTranslation) -> Result<()> {
        let path = self.entry_path(entry.parent_id, entry.chapter_id, &entry.target_language);
        fs::create_dir_all(self.parent_dir(entry.parent_id)).await?;

        let content = serde_json::to_string_pretty(entry)
            .map_err(|e| HonyakuError::Cache(format!("Failed to serialize cache entry: {}", e)))?;

        // Readers never observe a half-written entry
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &path).await?;

        debug!("Saved translation to cache: {}", path.display());
        Ok(())
    }

    pub async fn delete(&self, parent_id: i64, chapter_id: i64, target_language: &str) -> Result<bool> {
        match fs::remove_file(self.entry_path(parent_id, chapter_id, target_language)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every entry belonging to a parent
    pub async fn delete_all(&self, parent_id: i64) -> Result<()> {
        match fs::remove_dir_all(self.parent_dir(parent_id)).await {
            Ok(()) => {
                info!("Cleared translation cache for parent {}", parent_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove all entries, returning how many were removed
    pub async fn clear(&self) -> Result<u64> {
        let count = self.count().await;
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("Cleared {} translation cache entries", count);
        Ok(count)
    }

    /// Total size of all entries in bytes
    pub async fn size(&self) -> u64 {
        self.info().await.size_bytes
    }

    /// Number of entries
    pub async fn count(&self) -> u64 {
        self.info().await.entries
    }

    pub async fn info(&self) -> CacheInfo {
        let mut info = CacheInfo::default();
        for entry in self.entry_files() {
            info.entries += 1;
            info.size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
        info
    }

    /// Target languages cached for any chapter of a parent
    pub async fn languages_for_parent(&self, parent_id: i64) -> Vec<String> {
        let mut languages = Vec::new();
        let Ok(mut dir) = fs::read_dir(self.parent_dir(parent_id)).await else {
            return languages;
        };

        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(language) = language_from_file_name(&path) {
                    if !languages.contains(&language) {
                        languages.push(language);
                    }
                }
            }
        }
        languages.sort();
        languages
    }

    /// All readable entries, newest first
    pub async fn list(&self) -> Vec<CachedTranslation> {
        let mut entries = Vec::new();
        for file in self.entry_files() {
            if let Ok(content) = fs::read_to_string(file.path()).await {
                match serde_json::from_str::<CachedTranslation>(&content) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("Skipping unreadable cache entry {}: {}", file.path().display(), e),
                }
            }
        }
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries
    }

    fn entry_files(&self) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(&self.root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9-]` so any code maps to a
/// distinct, file-name-safe component
fn encode_language(language: &str) -> String {
    let mut encoded = String::with_capacity(language.len());
    for byte in language.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

fn decode_language(encoded: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(encoded.len());
    let mut rest = encoded.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

fn language_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (_, language) = stem.split_once('_')?;
    decode_language(language)
}
