//! Task registry: exclusive owner of all task records.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::task::{Task, TaskStatus};

/// Thread-safe store of every submitted task.
///
/// One lock guards all fields so multi-step mutations (validate transition,
/// stamp timestamps) stay atomic. Reads hand out clones, never references.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Task id -> position in `order`.
    index: HashMap<String, usize>,
    /// Tasks in submission order.
    order: Vec<Task>,
    /// User id -> positions in `order`.
    by_user: HashMap<u64, Vec<usize>>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task, indexing it by id and by user.
    pub fn add(&self, task: Task) {
        let mut inner = self.inner.write();
        let pos = inner.order.len();
        inner.index.insert(task.id.clone(), pos);
        inner.by_user.entry(task.user_id).or_default().push(pos);
        inner.order.push(task);
    }

    /// Gets a task by id.
    #[must_use]
    pub fn get(&self, task_id: &str) -> Option<Task> {
        let inner = self.inner.read();
        inner.index.get(task_id).map(|&pos| inner.order[pos].clone())
    }

    /// Snapshot of all tasks still participating in scheduling.
    #[must_use]
    pub fn get_active(&self) -> Vec<Task> {
        self.inner
            .read()
            .order
            .iter()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect()
    }

    /// Snapshot of all tasks in a given state.
    #[must_use]
    pub fn get_by_status(&self, status: TaskStatus) -> Vec<Task> {
        self.inner
            .read()
            .order
            .iter()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    /// Pages through tasks with optional user and status filters.
    ///
    /// Returns the requested slice and the total number of matches.
    #[must_use]
    pub fn page(
        &self,
        offset: usize,
        limit: usize,
        user_filter: Option<u64>,
        status_filter: Option<TaskStatus>,
    ) -> (Vec<Task>, usize) {
        let inner = self.inner.read();
        let matches: Vec<&Task> = inner
            .order
            .iter()
            .filter(|t| user_filter.is_none_or(|u| t.user_id == u))
            .filter(|t| status_filter.is_none_or(|s| t.status == s))
            .collect();

        let total = matches.len();
        let slice = matches
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        (slice, total)
    }

    /// Applies a validated lifecycle transition.
    pub fn transition(&self, task_id: &str, target: TaskStatus) -> Result<()> {
        let mut inner = self.inner.write();
        let pos = *inner
            .index
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_owned()))?;
        inner.order[pos].transition(target)
    }

    /// Cancels an active task: stamps `cancelled_at`, records the reason,
    /// and moves it to failed.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        let pos = *inner
            .index
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_owned()))?;
        let task = &mut inner.order[pos];

        if task.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal(task_id.to_owned()));
        }

        task.cancelled_at = Some(std::time::SystemTime::now());
        task.failure_reason = Some("cancelled".to_owned());
        task.transition(TaskStatus::Failed)
    }

    /// Fails every active task whose timeout budget has run out.
    ///
    /// Returns the ids of the affected tasks.
    pub fn check_timeouts(&self) -> Vec<String> {
        let mut inner = self.inner.write();
        let mut timed_out = Vec::new();

        for task in &mut inner.order {
            if task.status.is_active() && task.is_timed_out() {
                task.failure_reason = Some("timeout".to_owned());
                if task.transition(TaskStatus::Failed).is_ok() {
                    timed_out.push(task.id.clone());
                }
            }
        }

        timed_out
    }

    /// Total number of tasks.
    #[must_use]
    pub fn count(&self) -> usize {
        self.inner.read().order.len()
    }

    /// Number of completed tasks.
    #[must_use]
    pub fn count_completed(&self) -> usize {
        self.inner
            .read()
            .order
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count()
    }

    /// Drops every task record.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.index.clear();
        inner.order.clear();
        inner.by_user.clear();
    }
}
