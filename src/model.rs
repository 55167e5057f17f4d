use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Priority tiers. Higher values run sooner.
pub struct Priority;

impl Priority {
    pub const LOW: i32 = 0;
    pub const NORMAL: i32 = 50;
    pub const HIGH: i32 = 100;
    pub const USER_INITIATED: i32 = 200;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Failed,
    Done,
}

/// One queued request to translate a single chapter into a single language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationTask {
    pub id: String,
    pub chapter_id: i64,
    pub parent_id: i64,
    pub source_language: String,
    pub target_language: String,
    /// Engine selected at enqueue time; the worker uses whatever is selected when it runs
    pub engine_id: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranslationTask {
    pub fn new(request: &TaskRequest, engine_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chapter_id: request.chapter_id,
            parent_id: request.parent_id,
            source_language: request.source_language.clone(),
            target_language: request.target_language.clone(),
            engine_id: engine_id.to_string(),
            priority: request.priority,
            status: TaskStatus::Queued,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Arguments of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub parent_id: i64,
    pub chapter_id: i64,
    pub source_language: String,
    pub target_language: String,
    pub priority: i32,
}

impl TaskRequest {
    pub fn new(
        parent_id: i64,
        chapter_id: i64,
        source_language: &str,
        target_language: &str,
        priority: i32,
    ) -> Self {
        Self {
            parent_id,
            chapter_id,
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            priority,
        }
    }
}

/// Live snapshot of the worker, published on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationProgress {
    pub total_chapters: usize,
    pub completed_chapters: usize,
    pub failed_chapters: usize,
    pub current_chapter_name: Option<String>,
    /// 0.0 to 1.0 for the in-flight chapter
    pub current_chapter_progress: f32,
    pub is_running: bool,
    pub is_paused: bool,
    pub last_error: Option<String>,
}

/// A persisted translation result for one chapter and target language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedTranslation {
    pub chapter_id: i64,
    pub parent_id: i64,
    pub source_language: String,
    pub target_language: String,
    pub engine_id: String,
    pub original_content: Option<String>,
    pub translated_content: String,
    #[serde(default)]
    pub translated_title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A task removed from the queue without a result.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedTask {
    pub task: TranslationTask,
    pub error: String,
    pub dropped_at: DateTime<Utc>,
}
