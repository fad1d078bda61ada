//! Append-only per-task history of slot assignments.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;

/// One slot's scheduling decision and accounting for one task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Assignment {
    /// Slot the assignment belongs to.
    pub slot: u64,
    /// Task id.
    pub task_id: String,
    /// Destination comm device.
    pub comm_id: u64,
    /// Route device ids: the user first, the destination comm last.
    pub path: Vec<u64>,
    /// Per-hop rates in bits/s (`len == path.len() - 1`).
    pub speeds: Vec<f64>,
    /// Per-hop transmit powers in W (`len == path.len() - 1`).
    pub powers: Vec<f64>,
    /// Fraction of the destination's CPU granted this slot, in [0, 1].
    pub resource_fraction: f64,
    /// Bits queued at the destination when the slot began.
    pub queue_data: f64,
    /// Bits moved into the destination queue during the slot.
    pub transferred_data: f64,
    /// Bits processed during the slot.
    pub processed_data: f64,
    /// Running total of transferred bits.
    pub cumulative_transferred: f64,
    /// Running total of processed bits.
    pub cumulative_processed: f64,
}

/// Append-only assignment history, keyed by task id.
///
/// One lock guards the whole map; history reads return defensive copies so
/// callers can never alias the stored entries.
#[derive(Debug, Default)]
pub struct AssignmentLedger {
    history: RwLock<HashMap<String, Vec<Assignment>>>,
}

impl AssignmentLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one assignment to its task's history.
    pub fn append(&self, assignment: Assignment) {
        self.history
            .write()
            .entry(assignment.task_id.clone())
            .or_default()
            .push(assignment);
    }

    /// The most recent assignment of a task.
    #[must_use]
    pub fn last(&self, task_id: &str) -> Option<Assignment> {
        self.history
            .read()
            .get(task_id)
            .and_then(|h| h.last())
            .cloned()
    }

    /// The full history of a task, as a copy.
    #[must_use]
    pub fn history(&self, task_id: &str) -> Vec<Assignment> {
        self.history
            .read()
            .get(task_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Running total of processed bits for a task.
    #[must_use]
    pub fn cumulative_processed(&self, task_id: &str) -> f64 {
        self.last(task_id).map_or(0.0, |a| a.cumulative_processed)
    }

    /// Running total of transferred bits for a task.
    #[must_use]
    pub fn cumulative_transferred(&self, task_id: &str) -> f64 {
        self.last(task_id).map_or(0.0, |a| a.cumulative_transferred)
    }

    /// Bits the task currently has queued at its destination, derived from
    /// the latest entry: `max(0, queue + transferred - processed)`.
    #[must_use]
    pub fn current_queue(&self, task_id: &str) -> f64 {
        self.last(task_id).map_or(0.0, |a| {
            (a.queue_data + a.transferred_data - a.processed_data).max(0.0)
        })
    }

    /// Number of tasks with at least one assignment.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.history.read().len()
    }

    /// Drops all history.
    pub fn clear(&self) {
        self.history.write().clear();
    }
}
