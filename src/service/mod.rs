// Translation queue service
//
// `TranslationService` is the only entry point hosts use:
// - submission: enqueue / enqueue_all / dequeue / clear_queue / start / pause / resume / stop / shutdown
// - queries: has_translation / get_translated_content / get_translated_languages / queue_size
// - observation: subscribe_progress
//
// A single worker task drains the queue. It is spawned lazily by the first
// enqueue and released when the queue runs dry.

pub mod queue;
mod worker;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use queue::TaskQueue;
use crate::cache::TranslationCache;
use crate::config::{Config, WorkerConfig};
use crate::engine::{EngineFactory, EngineRegistry};
use crate::error::Result;
use crate::library::ChapterLibrary;
use crate::model::{CachedTranslation, DroppedTask, TaskRequest, TaskStatus, TranslationProgress, TranslationTask};
use crate::store::TranslationStore;

struct ActiveRun {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct ServiceInner {
    queue: TaskQueue,
    cache: TranslationCache,
    store: TranslationStore,
    registry: Arc<EngineRegistry>,
    library: Arc<dyn ChapterLibrary>,
    config: WorkerConfig,
    control: Mutex<Option<ActiveRun>>,
    next_run_id: AtomicU64,
    paused: watch::Sender<bool>,
    progress: watch::Sender<TranslationProgress>,
    dropped: Mutex<VecDeque<DroppedTask>>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl ServiceInner {
    fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Write the queue snapshot; failures only cost durability
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.queue.snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            warn!("Failed to persist translation queue: {}", e);
        }
    }

    fn refresh_total(&self) {
        let remaining = self.queue.remaining();
        self.progress.send_modify(|p| {
            p.total_chapters = remaining + p.completed_chapters;
        });
    }
}

/// Background chapter translation with a durable queue and cache
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<ServiceInner>,
}

impl TranslationService {
    pub fn new(
        cache: TranslationCache,
        store: TranslationStore,
        registry: Arc<EngineRegistry>,
        library: Arc<dyn ChapterLibrary>,
        config: WorkerConfig,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        let (progress, _) = watch::channel(TranslationProgress::default());

        Self {
            inner: Arc::new(ServiceInner {
                queue: TaskQueue::new(),
                cache,
                store,
                registry,
                library,
                config,
                control: Mutex::new(None),
                next_run_id: AtomicU64::new(1),
                paused,
                progress,
                dropped: Mutex::new(VecDeque::new()),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Wire the service from configuration with every known engine registered
    pub fn from_config(config: &Config, library: Arc<dyn ChapterLibrary>) -> Result<Self> {
        let engines = EngineFactory::create_all(&config.engines)?;
        let registry = EngineRegistry::with_settings(engines, &config.engines.selected, config.settings_file());

        Ok(Self::new(
            TranslationCache::new(config.cache_dir()),
            TranslationStore::new(config.queue_file()),
            Arc::new(registry),
            library,
            config.worker.clone(),
        ))
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.inner.cache
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.inner.registry
    }

    /// Queue a chapter; a chapter already queued or running is silently ignored
    pub async fn enqueue(
        &self,
        parent_id: i64,
        chapter_id: i64,
        source_language: &str,
        target_language: &str,
        priority: i32,
    ) -> bool {
        let request = TaskRequest::new(parent_id, chapter_id, source_language, target_language, priority);
        self.enqueue_all(std::slice::from_ref(&request)).await == 1
    }

    /// Queue several chapters at once, returning how many were new
    pub async fn enqueue_all(&self, requests: &[TaskRequest]) -> usize {
        let engine_id = self.inner.registry.selected_id();
        let tasks = requests.iter().map(|r| TranslationTask::new(r, &engine_id));
        let accepted = self.inner.queue.push_all(tasks);

        if accepted > 0 {
            debug!("Queued {} of {} chapters", accepted, requests.len());
            self.inner.refresh_total();
            self.start();
            self.inner.persist().await;
        }
        accepted
    }

    /// Remove a pending chapter
    pub async fn dequeue(&self, chapter_id: i64) -> bool {
        let removed = self.inner.queue.remove(chapter_id).is_some();
        if removed {
            debug!("Removed chapter {} from the queue", chapter_id);
            self.inner.refresh_total();
            self.inner.persist().await;
        }
        removed
    }

    /// Remove every pending chapter; a running chapter finishes normally
    pub async fn clear_queue(&self) -> usize {
        let removed = self.inner.queue.clear();
        info!("Cleared {} queued chapters", removed);
        self.inner.refresh_total();
        self.inner.persist().await;
        removed
    }

    /// Spawn the worker unless one is already running. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut control = self.inner.control.lock();
        if control.is_some() {
            return;
        }

        let id = self.inner.next_run_id.fetch_add(1, Ordering::SeqCst);
        let token = CancellationToken::new();
        self.inner.progress.send_replace(TranslationProgress {
            total_chapters: self.inner.queue.remaining(),
            is_running: true,
            is_paused: self.inner.is_paused(),
            ..TranslationProgress::default()
        });

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(inner.run(id, token.clone()));
        *control = Some(ActiveRun { id, token, handle });
    }

    /// Hold the worker after the current chapter
    pub fn pause(&self) {
        self.inner.paused.send_replace(true);
        self.inner.progress.send_modify(|p| p.is_paused = true);
        info!("Translation queue paused");
    }

    pub fn resume(&self) {
        self.inner.paused.send_replace(false);
        self.inner.progress.send_modify(|p| p.is_paused = false);
        info!("Translation queue resumed");
    }

    /// Cancel the worker and the in-flight chapter.
    ///
    /// Returns the abandoned chapter, unchanged and not re-queued.
    pub async fn stop(&self) -> Option<TranslationTask> {
        self.halt(false).await
    }

    /// Cancel the worker like `stop`, but put the in-flight chapter back in the
    /// queue, unchanged, so the next `restore` picks it up again
    pub async fn shutdown(&self) -> Option<TranslationTask> {
        self.halt(true).await
    }

    async fn halt(&self, keep_in_flight: bool) -> Option<TranslationTask> {
        let run = self.inner.control.lock().take();
        if let Some(run) = run {
            run.token.cancel();
            if let Err(e) = run.handle.await {
                warn!("Translation worker {} ended abnormally: {}", run.id, e);
            }
            info!("Translation worker {} stopped", run.id);
        }

        let interrupted = self.inner.queue.take_in_flight().map(|mut task| {
            task.status = TaskStatus::Queued;
            task
        });
        if keep_in_flight {
            if let Some(task) = &interrupted {
                self.inner.queue.push(task.clone());
                debug!("Kept interrupted chapter {} queued", task.chapter_id);
            }
        }

        self.inner.paused.send_replace(false);
        self.inner.progress.send_replace(TranslationProgress {
            total_chapters: self.inner.queue.remaining(),
            ..TranslationProgress::default()
        });
        self.inner.persist().await;
        interrupted
    }

    /// Reload the persisted queue, starting the worker if configured to
    pub async fn restore(&self) -> Result<usize> {
        let tasks = self.inner.store.load().await?;
        let mut tasks: Vec<_> = tasks
            .into_iter()
            .map(|mut task| {
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Queued;
                }
                task
            })
            .collect();
        tasks.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));

        let restored = self.inner.queue.push_all(tasks);
        info!("Restored {} queued chapters", restored);
        self.inner.refresh_total();

        if restored > 0 && self.inner.config.resume_on_start {
            self.start();
        }
        Ok(restored)
    }

    pub fn queue_size(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.control.lock().is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.is_paused()
    }

    /// Pending tasks in execution order
    pub fn pending_tasks(&self) -> Vec<TranslationTask> {
        self.inner.queue.pending()
    }

    pub fn progress(&self) -> TranslationProgress {
        self.inner.progress.borrow().clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<TranslationProgress> {
        self.inner.progress.subscribe()
    }

    /// Resolve once the worker has gone idle
    pub async fn wait_until_idle(&self) {
        let mut progress = self.inner.progress.subscribe();
        let _ = progress.wait_for(|p| !p.is_running).await;
    }

    /// Tasks dropped after a permanent failure or exhausted retries, oldest first
    pub fn dropped_tasks(&self) -> Vec<DroppedTask> {
        self.inner.dropped.lock().iter().cloned().collect()
    }

    pub fn clear_dropped(&self) {
        self.inner.dropped.lock().clear();
    }

    /// Queue every dropped task again with a fresh retry budget
    pub async fn retry_dropped(&self) -> usize {
        let dropped: Vec<_> = self.inner.dropped.lock().drain(..).collect();
        let requests: Vec<_> = dropped
            .into_iter()
            .map(|d| TaskRequest {
                parent_id: d.task.parent_id,
                chapter_id: d.task.chapter_id,
                source_language: d.task.source_language,
                target_language: d.task.target_language,
                priority: d.task.priority,
            })
            .collect();
        self.enqueue_all(&requests).await
    }

    pub async fn has_translation(&self, chapter_id: i64, target_language: &str) -> bool {
        match self.parent_of(chapter_id).await {
            Some(parent_id) => self.inner.cache.has(parent_id, chapter_id, target_language).await,
            None => false,
        }
    }

    pub async fn get_translation(&self, chapter_id: i64, target_language: &str) -> Option<CachedTranslation> {
        let parent_id = self.parent_of(chapter_id).await?;
        self.inner.cache.get(parent_id, chapter_id, target_language).await
    }

    pub async fn get_translated_content(&self, chapter_id: i64, target_language: &str) -> Option<String> {
        self.get_translation(chapter_id, target_language)
            .await
            .map(|entry| entry.translated_content)
    }

    pub async fn get_translated_languages(&self, parent_id: i64) -> Vec<String> {
        self.inner.cache.languages_for_parent(parent_id).await
    }

    async fn parent_of(&self, chapter_id: i64) -> Option<i64> {
        match self.inner.library.chapter(chapter_id).await {
            Ok(chapter) => chapter.map(|c| c.parent_id),
            Err(e) => {
                warn!("Failed to look up chapter {}: {}", chapter_id, e);
                None
            }
        }
    }
}
