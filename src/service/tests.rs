use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

use super::*;
use crate::engine::TranslationEngine;
use crate::error::HonyakuError;
use crate::library::ChapterInfo;
use crate::model::Priority;

struct FakeEngine {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    fail: AtomicBool,
    fail_titles: bool,
    configured: bool,
    rate_limited: bool,
    gate: Option<Arc<Semaphore>>,
    call_times: Mutex<Vec<Instant>>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            fail_titles: false,
            configured: true,
            rate_limited: false,
            gate: None,
            call_times: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        let engine = Self::new();
        engine.fail.store(true, Ordering::SeqCst);
        engine
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl TranslationEngine for FakeEngine {
    fn id(&self) -> &'static str {
        "fake"
    }

    fn name(&self) -> &'static str {
        "Fake"
    }

    fn is_offline(&self) -> bool {
        true
    }

    fn is_rate_limited(&self) -> bool {
        self.rate_limited
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    fn supported_languages(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn translate(
        &self,
        paragraphs: &[String],
        _source_language: &str,
        _target_language: &str,
    ) -> crate::error::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times.lock().push(Instant::now());
        self.seen.lock().push(paragraphs.join("|"));

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(HonyakuError::engine("fake", "backend unavailable"));
        }

        Ok(paragraphs
            .iter()
            .map(|p| match p.as_str() {
                "Hello" => "Bonjour".to_string(),
                other => format!("[fr] {}", other),
            })
            .collect())
    }

    async fn translate_single(
        &self,
        text: &str,
        _source_language: &str,
        _target_language: &str,
    ) -> crate::error::Result<String> {
        if self.fail_titles {
            return Err(HonyakuError::engine("fake", "title quota exceeded"));
        }
        Ok(format!("[title] {}", text))
    }
}

struct FakeLibrary {
    chapters: HashMap<i64, (ChapterInfo, String)>,
}

impl FakeLibrary {
    fn new(chapters: &[(i64, i64, &str)]) -> Self {
        Self {
            chapters: chapters
                .iter()
                .map(|&(chapter_id, parent_id, content)| {
                    let info = ChapterInfo {
                        chapter_id,
                        parent_id,
                        name: format!("Chapter {}", chapter_id),
                        downloaded_path: None,
                        source_url: None,
                    };
                    (chapter_id, (info, content.to_string()))
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ChapterLibrary for FakeLibrary {
    async fn chapter(&self, chapter_id: i64) -> crate::error::Result<Option<ChapterInfo>> {
        Ok(self.chapters.get(&chapter_id).map(|(info, _)| info.clone()))
    }

    async fn content(&self, chapter: &ChapterInfo) -> crate::error::Result<String> {
        self.chapters
            .get(&chapter.chapter_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| HonyakuError::Content("missing".to_string()))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    service: TranslationService,
    engine: Arc<FakeEngine>,
    store: TranslationStore,
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        max_retries: 2,
        rate_limit_delay_ms: 0,
        translate_titles: true,
        resume_on_start: true,
        keep_original: false,
        dropped_history: 10,
    }
}

fn harness_with(engine: FakeEngine, chapters: &[(i64, i64, &str)], config: WorkerConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let engine = Arc::new(engine);
    let engines: Vec<Arc<dyn TranslationEngine>> = vec![engine.clone()];
    let store = TranslationStore::new(dir.path().join("queue.json"));

    let service = TranslationService::new(
        TranslationCache::new(dir.path().join("cache")),
        store.clone(),
        Arc::new(EngineRegistry::new(engines, "fake")),
        Arc::new(FakeLibrary::new(chapters)),
        config,
    );

    Harness {
        _dir: dir,
        service,
        engine,
        store,
    }
}

fn harness(engine: FakeEngine, chapters: &[(i64, i64, &str)]) -> Harness {
    harness_with(engine, chapters, worker_config())
}

fn numbered_chapters(ids: &[i64]) -> Vec<(i64, i64, &'static str)> {
    ids.iter()
        .map(|&id| {
            let content: &'static str = Box::leak(format!("<p>Chapter {}</p>", id).into_boxed_str());
            (id, 1, content)
        })
        .collect()
}

async fn drained(service: &TranslationService) {
    timeout(Duration::from_secs(5), service.wait_until_idle())
        .await
        .expect("worker did not go idle");
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_enqueue_same_chapter_keeps_one_task() {
    let h = harness(FakeEngine::new(), &numbered_chapters(&[1]));
    h.service.pause();

    assert!(h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await);
    assert!(!h.service.enqueue(1, 1, "en", "fr", Priority::HIGH).await);
    assert!(!h.service.enqueue(1, 1, "en", "de", Priority::LOW).await);

    assert_eq!(h.service.queue_size(), 1);
    assert_eq!(h.store.load().await.unwrap().len(), 1);
    h.service.stop().await;
}

#[tokio::test]
async fn test_higher_priority_runs_first() {
    let h = harness(FakeEngine::new(), &numbered_chapters(&[1, 2, 3]));
    h.service.pause();

    h.service.enqueue(1, 1, "en", "fr", Priority::LOW).await;
    h.service.enqueue(1, 2, "en", "fr", Priority::HIGH).await;
    h.service.enqueue(1, 3, "en", "fr", Priority::NORMAL).await;
    assert_eq!(h.engine.calls(), 0);

    h.service.resume();
    drained(&h.service).await;

    assert_eq!(h.engine.seen(), vec!["Chapter 2", "Chapter 3", "Chapter 1"]);
    assert_eq!(h.service.progress().completed_chapters, 3);
}

#[tokio::test]
async fn test_cached_chapter_skips_engine() {
    let h = harness(FakeEngine::new(), &[(10, 1, "<p>Hello</p>")]);
    h.service.cache()
        .put(1, 10, "en", "es", None, "<p>Hola</p>", "other")
        .await
        .unwrap();

    h.service.enqueue(1, 10, "en", "es", Priority::NORMAL).await;
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.service.get_translated_content(10, "es").await.as_deref(), Some("<p>Hola</p>"));
    assert_eq!(h.service.progress().completed_chapters, 1);
}

#[tokio::test]
async fn test_failing_task_is_attempted_max_retries_plus_one_times() {
    let h = harness(FakeEngine::failing(), &numbered_chapters(&[7]));

    h.service.enqueue(1, 7, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 3);
    assert_eq!(h.service.queue_size(), 0);

    let dropped = h.service.dropped_tasks();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].task.chapter_id, 7);
    assert_eq!(dropped[0].task.retry_count, 3);
    assert!(dropped[0].error.contains("backend unavailable"));

    let progress = h.service.progress();
    assert_eq!(progress.failed_chapters, 1);
    assert!(!progress.is_running);
    assert!(h.store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_cancels_without_retry_or_cache_write() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeEngine::gated(gate.clone()), &numbered_chapters(&[3]));

    h.service.enqueue(1, 3, "en", "fr", Priority::NORMAL).await;
    let engine = h.engine.clone();
    eventually(|| engine.calls() == 1).await;

    let abandoned = h.service.stop().await.expect("in-flight task returned");
    assert_eq!(abandoned.chapter_id, 3);
    assert_eq!(abandoned.retry_count, 0);

    // a late permit must not resurrect the cancelled call
    gate.add_permits(1);
    sleep(Duration::from_millis(50)).await;

    assert!(!h.service.is_running());
    assert!(!h.service.has_translation(3, "fr").await);
    assert_eq!(h.service.cache().count().await, 0);
    assert!(h.service.dropped_tasks().is_empty());
    assert_eq!(h.service.queue_size(), 0);
    assert!(h.store.load().await.unwrap().is_empty());
    assert_eq!(h.service.progress(), TranslationProgress::default());
}

#[tokio::test]
async fn test_end_to_end_translation() {
    let h = harness(FakeEngine::new(), &[(5, 1, "<p>Hello</p>")]);

    h.service.enqueue(1, 5, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    assert!(h.service.has_translation(5, "fr").await);
    assert!(!h.service.has_translation(5, "de").await);
    assert_eq!(h.service.get_translated_content(5, "fr").await.as_deref(), Some("<p>Bonjour</p>"));
    assert_eq!(h.service.get_translated_languages(1).await, vec!["fr"]);

    let entry = h.service.get_translation(5, "fr").await.unwrap();
    assert_eq!(entry.engine_id, "fake");
    assert_eq!(entry.translated_title.as_deref(), Some("[title] Chapter 5"));
    assert!(entry.original_content.is_none());
}

#[tokio::test]
async fn test_pause_holds_next_task_until_resume() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeEngine::gated(gate.clone()), &numbered_chapters(&[1, 2]));

    h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await;
    h.service.enqueue(1, 2, "en", "fr", Priority::NORMAL).await;
    let engine = h.engine.clone();
    eventually(|| engine.calls() == 1).await;

    h.service.pause();
    gate.add_permits(1);

    let mut progress = h.service.subscribe_progress();
    timeout(Duration::from_secs(5), progress.wait_for(|p| p.completed_chapters == 1))
        .await
        .expect("first chapter completed")
        .unwrap();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(h.engine.calls(), 1);
    assert_eq!(h.service.queue_size(), 1);
    assert!(h.service.is_running());
    assert!(h.service.progress().is_paused);

    h.service.resume();
    gate.add_permits(1);
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 2);
    assert!(h.service.has_translation(1, "fr").await);
    assert!(h.service.has_translation(2, "fr").await);
}

#[tokio::test]
async fn test_missing_chapter_is_dropped_without_retry() {
    let h = harness(FakeEngine::new(), &[]);

    h.service.enqueue(1, 99, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 0);
    let dropped = h.service.dropped_tasks();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].task.retry_count, 0);
    assert!(dropped[0].error.contains("not found"));
}

#[tokio::test]
async fn test_unconfigured_engine_drops_task() {
    let engine = FakeEngine {
        configured: false,
        ..FakeEngine::new()
    };
    let h = harness(engine, &numbered_chapters(&[1]));

    h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.service.progress().last_error.as_deref(), Some("No translation engine available"));
}

#[tokio::test]
async fn test_empty_chapter_is_dropped() {
    let h = harness(FakeEngine::new(), &[(4, 1, "<p> </p>")]);

    h.service.enqueue(1, 4, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 0);
    assert_eq!(h.service.dropped_tasks().len(), 1);
}

#[tokio::test]
async fn test_title_failure_does_not_fail_chapter() {
    let engine = FakeEngine {
        fail_titles: true,
        ..FakeEngine::new()
    };
    let h = harness(engine, &[(5, 1, "<p>Hello</p>")]);

    h.service.enqueue(1, 5, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    let entry = h.service.get_translation(5, "fr").await.unwrap();
    assert_eq!(entry.translated_content, "<p>Bonjour</p>");
    assert!(entry.translated_title.is_none());
    assert!(h.service.dropped_tasks().is_empty());
}

#[tokio::test]
async fn test_dequeue_and_clear_queue() {
    let h = harness(FakeEngine::new(), &numbered_chapters(&[1, 2, 3]));
    h.service.pause();

    let requests: Vec<_> = [1, 2, 3]
        .iter()
        .map(|&id| TaskRequest::new(1, id, "en", "fr", Priority::NORMAL))
        .collect();
    assert_eq!(h.service.enqueue_all(&requests).await, 3);

    assert!(h.service.dequeue(2).await);
    assert!(!h.service.dequeue(2).await);
    let pending: Vec<_> = h.service.pending_tasks().iter().map(|t| t.chapter_id).collect();
    assert_eq!(pending, vec![1, 3]);

    assert_eq!(h.service.clear_queue().await, 2);
    assert_eq!(h.service.queue_size(), 0);
    assert!(h.store.load().await.unwrap().is_empty());

    h.service.resume();
    drained(&h.service).await;
    assert_eq!(h.engine.calls(), 0);
}

#[tokio::test]
async fn test_restore_resumes_persisted_queue() {
    let h = harness(FakeEngine::new(), &numbered_chapters(&[1, 2]));
    let mut running = TranslationTask::new(&TaskRequest::new(1, 2, "en", "fr", Priority::LOW), "fake");
    running.status = TaskStatus::Running;
    let queued = TranslationTask::new(&TaskRequest::new(1, 1, "en", "fr", Priority::HIGH), "fake");
    h.store.save(&[running, queued]).await.unwrap();

    assert_eq!(h.service.restore().await.unwrap(), 2);
    drained(&h.service).await;

    assert_eq!(h.engine.seen(), vec!["Chapter 1", "Chapter 2"]);
    assert!(h.store.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restore_without_resume_stays_idle() {
    let config = WorkerConfig {
        resume_on_start: false,
        ..worker_config()
    };
    let h = harness_with(FakeEngine::new(), &numbered_chapters(&[1]), config);
    let task = TranslationTask::new(&TaskRequest::new(1, 1, "en", "fr", Priority::NORMAL), "fake");
    h.store.save(&[task]).await.unwrap();

    assert_eq!(h.service.restore().await.unwrap(), 1);
    assert!(!h.service.is_running());
    assert_eq!(h.service.queue_size(), 1);

    h.service.start();
    drained(&h.service).await;
    assert_eq!(h.engine.calls(), 1);
}

#[tokio::test]
async fn test_retry_dropped_requeues_with_fresh_budget() {
    let config = WorkerConfig {
        max_retries: 0,
        ..worker_config()
    };
    let h = harness_with(FakeEngine::failing(), &[(5, 1, "<p>Hello</p>")], config);

    h.service.enqueue(1, 5, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;
    assert_eq!(h.engine.calls(), 1);
    assert_eq!(h.service.dropped_tasks().len(), 1);

    h.engine.fail.store(false, Ordering::SeqCst);
    assert_eq!(h.service.retry_dropped().await, 1);
    drained(&h.service).await;

    assert!(h.service.dropped_tasks().is_empty());
    assert!(h.service.has_translation(5, "fr").await);
}

#[tokio::test]
async fn test_worker_restarts_after_draining() {
    let h = harness(FakeEngine::new(), &numbered_chapters(&[1, 2]));

    h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;
    assert!(!h.service.is_running());

    h.service.enqueue(1, 2, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;
    assert_eq!(h.engine.calls(), 2);
    assert!(h.service.has_translation(2, "fr").await);
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_translated_again() {
    let h = harness(FakeEngine::new(), &[(10, 1, "<p>Hello</p>")]);
    let cache = h.service.cache();
    cache.put(1, 10, "en", "fr", None, "<p>Salut</p>", "other").await.unwrap();
    let entry_file = cache.root().join("1").join("10_fr.json");
    std::fs::write(&entry_file, "{truncated").unwrap();
    assert!(!h.service.has_translation(10, "fr").await);

    h.service.enqueue(1, 10, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 1);
    assert!(h.service.has_translation(10, "fr").await);
    assert_eq!(h.service.get_translated_content(10, "fr").await.as_deref(), Some("<p>Bonjour</p>"));
}

#[tokio::test]
async fn test_rate_limited_retries_are_spaced() {
    let engine = FakeEngine {
        rate_limited: true,
        ..FakeEngine::failing()
    };
    let config = WorkerConfig {
        rate_limit_delay_ms: 100,
        ..worker_config()
    };
    let h = harness_with(engine, &numbered_chapters(&[1]), config);

    h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await;
    drained(&h.service).await;

    let times = h.engine.call_times.lock().clone();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100), "attempts {:?} apart", pair[1] - pair[0]);
    }
    assert_eq!(h.service.dropped_tasks().len(), 1);
}

#[tokio::test]
async fn test_rate_limited_successes_are_spaced() {
    let engine = FakeEngine {
        rate_limited: true,
        ..FakeEngine::new()
    };
    let config = WorkerConfig {
        rate_limit_delay_ms: 100,
        ..worker_config()
    };
    let h = harness_with(engine, &numbered_chapters(&[1, 2]), config);
    h.service.pause();

    h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await;
    h.service.enqueue(1, 2, "en", "fr", Priority::NORMAL).await;
    h.service.resume();
    drained(&h.service).await;

    let times = h.engine.call_times.lock().clone();
    assert_eq!(times.len(), 2);
    assert!(times[1] - times[0] >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_shutdown_keeps_interrupted_chapter_queued() {
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(FakeEngine::gated(gate.clone()), &numbered_chapters(&[3]));

    h.service.enqueue(1, 3, "en", "fr", Priority::HIGH).await;
    let engine = h.engine.clone();
    eventually(|| engine.calls() == 1).await;

    let interrupted = h.service.shutdown().await.expect("in-flight task returned");
    assert_eq!(interrupted.chapter_id, 3);
    assert_eq!(interrupted.retry_count, 0);
    assert!(!h.service.is_running());
    assert!(!h.service.has_translation(3, "fr").await);

    let saved = h.store.load().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].chapter_id, 3);
    assert_eq!(saved[0].retry_count, 0);
    assert_eq!(saved[0].status, TaskStatus::Queued);
    assert_eq!(h.service.queue_size(), 1);
}

#[tokio::test]
async fn test_clear_during_failing_attempt_is_not_retried() {
    let gate = Arc::new(Semaphore::new(0));
    let engine = FakeEngine::gated(gate.clone());
    engine.fail.store(true, Ordering::SeqCst);
    let h = harness(engine, &numbered_chapters(&[1, 2]));

    h.service.enqueue(1, 1, "en", "fr", Priority::NORMAL).await;
    h.service.enqueue(1, 2, "en", "fr", Priority::NORMAL).await;
    let engine = h.engine.clone();
    eventually(|| engine.calls() == 1).await;

    assert_eq!(h.service.clear_queue().await, 1);
    gate.add_permits(1);
    drained(&h.service).await;

    assert_eq!(h.engine.calls(), 1);
    assert_eq!(h.service.queue_size(), 0);
    assert!(h.service.dropped_tasks().is_empty());
    assert!(h.store.load().await.unwrap().is_empty());
}
