//! Task records and the lifecycle state machine.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::{Duration, SystemTime};

use crate::error::{EngineError, Result};

/// Default priority (normal band).
pub const DEFAULT_PRIORITY: i32 = 5;

/// Slack applied when comparing cumulative progress against the data size.
pub const COMPLETION_TOLERANCE: f64 = 1e-3;

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for a first assignment.
    Pending,
    /// Assigned to a comm device, data in flight or queued.
    Queued,
    /// Processing has started.
    Computing,
    /// All data processed.
    Completed,
    /// Cancelled, timed out, or hit a fatal error.
    Failed,
}

impl TaskStatus {
    /// Returns true while the task still participates in scheduling.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Queued | Self::Computing)
    }

    /// Returns true once the task reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the lifecycle graph permits moving to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match target {
            Self::Pending => false,
            Self::Queued => matches!(self, Self::Pending),
            Self::Computing => matches!(self, Self::Queued),
            Self::Completed => matches!(self, Self::Queued | Self::Computing),
            Self::Failed => self.is_active(),
        }
    }
}

/// An offloadable compute job owned by the registry.
///
/// External callers only ever see clones; all mutation happens through
/// [`crate::registry::TaskRegistry`].
#[derive(Debug, Clone)]
pub struct Task {
    /// Opaque 16-hex-char identifier.
    pub id: String,
    /// Submitting user device id.
    pub user_id: u64,
    /// Task payload in bits, strictly positive.
    pub data_size: f64,
    /// Free-form task type.
    pub kind: String,
    /// Priority; higher values receive larger apportionment weights.
    pub priority: i32,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Submission time.
    pub created_at: SystemTime,
    /// Optional wall-clock budget measured from `created_at`.
    pub timeout: Option<Duration>,
    /// Set once on cancellation.
    pub cancelled_at: Option<SystemTime>,
    /// Reason recorded on transition to failed.
    pub failure_reason: Option<String>,
    /// Set on the first transition to queued.
    pub scheduled_at: Option<SystemTime>,
    /// Set on transition to completed.
    pub completed_at: Option<SystemTime>,
}

impl Task {
    /// Creates a pending task with a fresh random id.
    #[must_use]
    pub fn new(user_id: u64, data_size: f64, kind: impl Into<String>, priority: Option<i32>) -> Self {
        Self {
            id: generate_task_id(),
            user_id,
            data_size,
            kind: kind.into(),
            priority: priority.unwrap_or(DEFAULT_PRIORITY),
            status: TaskStatus::Pending,
            created_at: SystemTime::now(),
            timeout: None,
            cancelled_at: None,
            failure_reason: None,
            scheduled_at: None,
            completed_at: None,
        }
    }

    /// Applies a lifecycle transition, stamping the associated timestamps.
    pub(crate) fn transition(&mut self, target: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        match target {
            TaskStatus::Queued => {
                if self.scheduled_at.is_none() {
                    self.scheduled_at = Some(SystemTime::now());
                }
            }
            TaskStatus::Completed => self.completed_at = Some(SystemTime::now()),
            _ => {}
        }
        Ok(())
    }

    /// Wall-clock time the task has existed.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }

    /// Whether an optional timeout budget has been exceeded.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.timeout.is_some_and(|limit| self.wait_time() > limit)
    }

    /// Starvation predicate: a pending task that has waited longer than its
    /// priority band allows. Used to boost the apportionment weight.
    #[must_use]
    pub fn is_starving(&self) -> bool {
        self.status == TaskStatus::Pending && self.wait_time() > starvation_threshold(self.priority)
    }

    /// Whether `cumulative_processed` covers the payload within tolerance.
    #[must_use]
    pub fn is_fully_processed(&self, cumulative_processed: f64) -> bool {
        cumulative_processed >= self.data_size - COMPLETION_TOLERANCE
    }
}

/// Wait budget before a pending task counts as starving.
#[must_use]
pub fn starvation_threshold(priority: i32) -> Duration {
    if priority >= 10 {
        Duration::from_secs(2)
    } else if priority <= 0 {
        Duration::from_secs(10)
    } else {
        Duration::from_secs(5)
    }
}

/// Generates a 16-hex-char task id from 8 cryptographically random bytes.
#[must_use]
pub fn generate_task_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().fold(String::with_capacity(16), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}
