//! Per-slot metrics: assignment-level accounting and the published
//! system-wide state record.

use serde::Serialize;
use std::collections::HashMap;

use crate::ledger::Assignment;
use crate::physics;

/// Delay and energy attributable to one assignment for one slot.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AssignmentMetrics {
    /// Time the slot's transferred bits spent on the wire, summed per hop.
    pub transfer_delay: f64,
    /// Time the slot's processed bits spent on the CPU share.
    pub compute_delay: f64,
    /// Radio energy of the slot's transfer.
    pub transfer_energy: f64,
    /// CPU energy of the slot's reserved share.
    pub compute_energy: f64,
}

impl AssignmentMetrics {
    /// Total delay of the slot.
    #[must_use]
    pub fn total_delay(&self) -> f64 {
        self.transfer_delay + self.compute_delay
    }

    /// Total energy of the slot.
    #[must_use]
    pub fn total_energy(&self) -> f64 {
        self.transfer_energy + self.compute_energy
    }
}

/// Accounts delay and energy for one executed assignment.
#[must_use]
pub fn assignment_metrics(assignment: &Assignment, slot_s: f64) -> AssignmentMetrics {
    let mut metrics = AssignmentMetrics::default();

    if assignment.transferred_data > 0.0 {
        for (hop, &speed) in assignment.speeds.iter().enumerate() {
            if speed > 0.0 {
                let hop_delay = assignment.transferred_data / speed;
                metrics.transfer_delay += hop_delay;
                if let Some(&power) = assignment.powers.get(hop) {
                    metrics.transfer_energy += power * hop_delay;
                }
            }
        }
    }

    if assignment.resource_fraction > 0.0 {
        if assignment.processed_data > 0.0 {
            metrics.compute_delay = assignment.processed_data * physics::CYCLES_PER_BIT
                / (assignment.resource_fraction * physics::CPU_CYCLES_PER_S);
        }
        metrics.compute_energy = assignment.resource_fraction
            * physics::ENERGY_COEFF
            * physics::CPU_CYCLES_PER_S.powi(3)
            * slot_s;
    }

    metrics
}

/// System-wide state published after every slot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StateMetrics {
    /// Slot this record describes.
    pub slot: u64,
    /// Queued bits per comm device at the end of the slot.
    pub comm_queues: HashMap<u64, f64>,
    /// Sum of all comm queues.
    pub total_queue: f64,
    /// Slot-local transfer delay sum.
    pub transfer_delay: f64,
    /// Slot-local compute delay sum.
    pub compute_delay: f64,
    /// Slot-local total delay.
    pub total_delay: f64,
    /// Slot-local transfer energy sum.
    pub transfer_energy: f64,
    /// Slot-local compute energy sum.
    pub compute_energy: f64,
    /// Slot-local total energy.
    pub total_energy: f64,
    /// Active-task-to-comm ratio.
    pub load: f64,
    /// Lyapunov drift of the slot.
    pub drift: f64,
    /// Weighted penalty of the slot.
    pub penalty: f64,
    /// Drift-plus-penalty cost of the slot.
    pub cost: f64,
}
