use std::future::Future;
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Result, HonyakuError};
use crate::model::{CachedTranslation, DroppedTask, TaskStatus, TranslationTask};
use crate::text::{extract_plain_text, wrap_as_markup};
use super::ServiceInner;

/// What a successful task did, used for throttling decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TaskOutcome {
    pub cached: bool,
    pub rate_limited: bool,
}

/// A failed task, and whether it spent a request on a rate-limited engine
#[derive(Debug)]
pub(crate) struct TaskFailure {
    pub error: HonyakuError,
    pub rate_limited: bool,
}

impl From<HonyakuError> for TaskFailure {
    fn from(error: HonyakuError) -> Self {
        Self {
            error,
            rate_limited: false,
        }
    }
}

fn still_paused(paused: &mut watch::Receiver<bool>) -> bool {
    *paused.borrow_and_update()
}

/// Race a future against cancellation
async fn cancellable<T>(token: &CancellationToken, future: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(HonyakuError::Cancelled),
        result = future => result,
    }
}

impl ServiceInner {
    /// Drain the queue one task at a time until it is empty or the run is cancelled
    pub(crate) async fn run(self: Arc<Self>, run_id: u64, token: CancellationToken) {
        info!("Translation worker {} started", run_id);

        loop {
            if token.is_cancelled() {
                debug!("Translation worker {} cancelled", run_id);
                return;
            }

            if self.is_paused() && !self.queue.is_empty() {
                let mut paused = self.paused.subscribe();
                while still_paused(&mut paused) {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return,
                        changed = paused.changed() => {
                            if changed.is_err() {
                                return;
                            }
                        }
                    }
                }
                continue;
            }

            let Some(task) = self.next_task(run_id) else {
                info!("Translation worker {} finished", run_id);
                return;
            };

            self.progress.send_modify(|p| {
                p.current_chapter_name = Some(format!("Chapter {}", task.chapter_id));
                p.current_chapter_progress = 0.0;
            });
            self.persist().await;

            info!(
                "Translating chapter {} ({} -> {}), attempt {}",
                task.chapter_id,
                task.source_language,
                task.target_language,
                task.retry_count + 1
            );

            match self.execute(&task, &token).await {
                Ok(outcome) => {
                    self.queue.take_in_flight();
                    let remaining = self.queue.remaining();
                    self.progress.send_modify(|p| {
                        p.completed_chapters += 1;
                        p.current_chapter_progress = 1.0;
                        p.total_chapters = remaining + p.completed_chapters;
                    });
                    self.persist().await;

                    if outcome.rate_limited && !outcome.cached && !self.throttle(&token).await {
                        return;
                    }
                }
                Err(failure) if failure.error.is_cancelled() => {
                    // stop() or shutdown() owns the in-flight task from here
                    debug!("Chapter {} cancelled", task.chapter_id);
                    return;
                }
                Err(failure) => {
                    self.handle_failure(task, failure.error).await;
                    if failure.rate_limited && !self.throttle(&token).await {
                        return;
                    }
                }
            }
        }
    }

    /// Pop the next task, or release the run slot if the queue is empty.
    ///
    /// The slot is released under the control lock after a final empty check, so
    /// an enqueue racing with exit either gets popped here or starts a new run.
    fn next_task(&self, run_id: u64) -> Option<TranslationTask> {
        if let Some(task) = self.queue.pop() {
            return Some(task);
        }

        let mut control = self.control.lock();
        if control.as_ref().map(|run| run.id) != Some(run_id) {
            return None;
        }
        if let Some(task) = self.queue.pop() {
            return Some(task);
        }

        *control = None;
        self.progress.send_modify(|p| {
            p.is_running = false;
            p.current_chapter_name = None;
            p.current_chapter_progress = 0.0;
            p.total_chapters = p.completed_chapters;
        });
        None
    }

    /// Sleep between rate-limited calls; false if cancelled meanwhile
    async fn throttle(&self, token: &CancellationToken) -> bool {
        let delay = self.config.rate_limit_delay();
        if delay.is_zero() {
            return true;
        }
        debug!("Waiting {:?} before the next rate-limited request", delay);
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Translate one chapter and write the result to the cache
    pub(crate) async fn execute(
        &self,
        task: &TranslationTask,
        token: &CancellationToken,
    ) -> std::result::Result<TaskOutcome, TaskFailure> {
        let engine = self.registry.engine().ok_or(HonyakuError::NoEngine)?;

        let chapter = cancellable(token, self.library.chapter(task.chapter_id))
            .await?
            .ok_or(HonyakuError::ChapterNotFound(task.chapter_id))?;

        self.set_chapter_progress(Some(&chapter.name), 0.1);

        if self.cache.has(chapter.parent_id, chapter.chapter_id, &task.target_language).await {
            info!("Chapter {} already translated to {}, skipping", chapter.chapter_id, task.target_language);
            return Ok(TaskOutcome {
                cached: true,
                rate_limited: false,
            });
        }

        let content = cancellable(token, self.library.content(&chapter)).await?;
        let paragraphs = extract_plain_text(&content);
        if paragraphs.is_empty() {
            return Err(HonyakuError::EmptyContent(chapter.chapter_id).into());
        }
        self.set_chapter_progress(None, 0.3);

        debug!("Sending {} paragraphs to {}", paragraphs.len(), engine.id());
        let rate_limited = engine.is_rate_limited();
        let spent = move |error: HonyakuError| TaskFailure { error, rate_limited };
        let translated = cancellable(
            token,
            engine.translate(&paragraphs, &task.source_language, &task.target_language),
        )
        .await
        .map_err(spent)?;
        self.set_chapter_progress(None, 0.8);

        let translated_title = if self.config.translate_titles && !chapter.name.trim().is_empty() {
            match cancellable(
                token,
                engine.translate_single(&chapter.name, &task.source_language, &task.target_language),
            )
            .await
            {
                Ok(title) => Some(title),
                Err(HonyakuError::Cancelled) => return Err(HonyakuError::Cancelled.into()),
                Err(e) => {
                    warn!("Failed to translate title of chapter {}: {}", chapter.chapter_id, e);
                    None
                }
            }
        } else {
            None
        };

        if token.is_cancelled() {
            return Err(HonyakuError::Cancelled.into());
        }

        let entry = CachedTranslation {
            chapter_id: chapter.chapter_id,
            parent_id: chapter.parent_id,
            source_language: task.source_language.clone(),
            target_language: task.target_language.clone(),
            engine_id: engine.id().to_string(),
            original_content: self.config.keep_original.then_some(content),
            translated_content: wrap_as_markup(&translated),
            translated_title,
            created_at: Utc::now(),
        };
        self.cache.put_entry(&entry).await.map_err(spent)?;
        info!("Chapter {} translated to {} with {}", chapter.chapter_id, task.target_language, engine.id());

        Ok(TaskOutcome {
            cached: false,
            rate_limited,
        })
    }

    fn set_chapter_progress(&self, name: Option<&str>, fraction: f32) {
        self.progress.send_modify(|p| {
            if let Some(name) = name {
                p.current_chapter_name = Some(name.to_string());
            }
            p.current_chapter_progress = fraction;
        });
    }

    /// Retry a failed task at the back of its tier, or drop it
    async fn handle_failure(&self, mut task: TranslationTask, error: HonyakuError) {
        let message = error.to_string();

        if error.is_retryable() {
            task.retry_count += 1;
            if task.retry_count <= self.config.max_retries {
                warn!(
                    "Chapter {} failed (attempt {}/{}): {}",
                    task.chapter_id,
                    task.retry_count,
                    self.config.max_retries + 1,
                    message
                );
                task.status = TaskStatus::Failed;
                task.error_message = Some(message);
                if !self.queue.requeue(task) {
                    debug!("Queue was cleared during the attempt, not retrying");
                }
                self.persist().await;
                return;
            }
        }

        self.queue.take_in_flight();
        error!("Dropping chapter {} translation: {}", task.chapter_id, message);

        task.status = TaskStatus::Failed;
        task.error_message = Some(message.clone());
        self.record_dropped(DroppedTask {
            task,
            error: message.clone(),
            dropped_at: Utc::now(),
        });

        let remaining = self.queue.remaining();
        self.progress.send_modify(|p| {
            p.failed_chapters += 1;
            p.last_error = Some(message);
            p.current_chapter_progress = 0.0;
            p.total_chapters = remaining + p.completed_chapters;
        });
        self.persist().await;
    }

    fn record_dropped(&self, dropped: DroppedTask) {
        let limit = self.config.dropped_history;
        if limit == 0 {
            return;
        }
        let mut history = self.dropped.lock();
        while history.len() >= limit {
            history.pop_front();
        }
        history.push_back(dropped);
    }
}
