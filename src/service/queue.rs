use parking_lot::Mutex;

use crate::model::{TaskStatus, TranslationTask};

#[derive(Debug, Default)]
struct QueueState {
    /// Execution order: priority descending, insertion order within a tier
    pending: Vec<TranslationTask>,
    in_flight: Option<TranslationTask>,
    /// Set by `clear` while a task runs; that task is not requeued on failure
    in_flight_cleared: bool,
}

impl QueueState {
    fn holds_chapter(&self, chapter_id: i64) -> bool {
        self.in_flight.as_ref().is_some_and(|t| t.chapter_id == chapter_id)
            || self.pending.iter().any(|t| t.chapter_id == chapter_id)
    }

    /// Insert behind every task of equal or higher priority
    fn insert(&mut self, task: TranslationTask) {
        let position = self.pending
            .iter()
            .position(|t| t.priority < task.priority)
            .unwrap_or(self.pending.len());
        self.pending.insert(position, task);
    }
}

/// Pending tasks plus the one the worker is executing.
///
/// At most one task per chapter is held at any time, counting the in-flight task.
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task unless its chapter is already queued or running
    pub fn push(&self, task: TranslationTask) -> bool {
        let mut state = self.state.lock();
        if state.holds_chapter(task.chapter_id) {
            return false;
        }
        state.insert(task);
        true
    }

    /// Add several tasks atomically, returning how many were accepted
    pub fn push_all(&self, tasks: impl IntoIterator<Item = TranslationTask>) -> usize {
        let mut state = self.state.lock();
        let mut accepted = 0;
        for task in tasks {
            if !state.holds_chapter(task.chapter_id) {
                state.insert(task);
                accepted += 1;
            }
        }
        accepted
    }

    /// Take the next task and mark it in flight
    pub fn pop(&self) -> Option<TranslationTask> {
        let mut state = self.state.lock();
        if state.pending.is_empty() {
            return None;
        }
        let mut task = state.pending.remove(0);
        task.status = TaskStatus::Running;
        state.in_flight = Some(task.clone());
        state.in_flight_cleared = false;
        Some(task)
    }

    /// Clear the in-flight slot, returning what it held
    pub fn take_in_flight(&self) -> Option<TranslationTask> {
        self.state.lock().in_flight.take()
    }

    /// Put a failed task back at the end of its priority tier.
    ///
    /// Returns false without requeueing if the queue was cleared while the task ran.
    pub fn requeue(&self, task: TranslationTask) -> bool {
        let mut state = self.state.lock();
        if state.in_flight.as_ref().is_some_and(|t| t.id == task.id) {
            state.in_flight = None;
            if std::mem::take(&mut state.in_flight_cleared) {
                return false;
            }
        }
        if state.holds_chapter(task.chapter_id) {
            return false;
        }
        state.insert(task);
        true
    }

    /// Remove a pending task; the in-flight task is left alone
    pub fn remove(&self, chapter_id: i64) -> Option<TranslationTask> {
        let mut state = self.state.lock();
        let position = state.pending.iter().position(|t| t.chapter_id == chapter_id)?;
        Some(state.pending.remove(position))
    }

    /// Remove all pending tasks. The in-flight task finishes, but is not retried.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.pending.len();
        state.pending.clear();
        state.in_flight_cleared = state.in_flight.is_some();
        removed
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pending.is_empty()
    }

    /// Pending tasks plus the in-flight one, if any
    pub fn remaining(&self) -> usize {
        let state = self.state.lock();
        state.pending.len() + usize::from(state.in_flight.is_some())
    }

    pub fn contains(&self, chapter_id: i64) -> bool {
        self.state.lock().holds_chapter(chapter_id)
    }

    /// Pending tasks in execution order
    pub fn pending(&self) -> Vec<TranslationTask> {
        self.state.lock().pending.clone()
    }

    /// Everything worth persisting: the in-flight task first, then pending ones
    pub fn snapshot(&self) -> Vec<TranslationTask> {
        let state = self.state.lock();
        state.in_flight.iter().chain(state.pending.iter()).cloned().collect()
    }
}
