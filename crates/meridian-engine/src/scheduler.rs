//! Scheduler variants: greedy placement and Lyapunov drift-plus-penalty.
//!
//! Both variants implement the same contract: `schedule` turns the slot's
//! active-task snapshot into one assignment per schedulable task, and
//! `execute` settles the slot by recomputing transferred/processed amounts
//! under the final resource fractions. Queued and computing tasks always
//! keep their previous destination and route, so a task's path never churns
//! mid-flight.

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::ledger::{Assignment, AssignmentLedger};
use crate::metrics::assignment_metrics;
use crate::physics;
use crate::task::{Task, TaskStatus};
use crate::topology::{Topology, TransferPath};

/// Weight of transfer delay in the greedy placement cost.
const GREEDY_DELAY_WEIGHT: f64 = 1.0;
/// Weight of transfer energy in the greedy placement cost.
const GREEDY_ENERGY_WEIGHT: f64 = 0.1;
/// Weight of destination backlog in the greedy placement cost.
const GREEDY_QUEUE_WEIGHT: f64 = 0.05;

/// Minimum total weight before apportionment falls back to an even split.
const MIN_TOTAL_WEIGHT: f64 = 1e-3;

/// Iterations the Lyapunov search always runs before early termination.
const MIN_SEARCH_ITERATIONS: usize = 5;

/// A per-slot scheduling strategy.
pub trait SchedulePolicy: Send + Sync {
    /// Produces one assignment per schedulable task for the slot.
    fn schedule(&self, slot: u64, tasks: &[Task]) -> Vec<Assignment>;

    /// Settles the slot: recomputes transferred/processed amounts under the
    /// final resource fractions and advances the cumulative totals.
    fn execute(&self, assignments: &mut [Assignment], tasks: &HashMap<String, Task>);

    /// Returns the variant name.
    fn name(&self) -> &'static str;
}

/// Greedy scheduler: each new task goes to the destination with the lowest
/// transfer-cost estimate; in-flight tasks keep their route.
pub struct GreedyScheduler {
    topology: Arc<Topology>,
    ledger: Arc<AssignmentLedger>,
    slot_duration_s: f64,
}

impl GreedyScheduler {
    /// Creates a greedy scheduler over the shared topology and ledger.
    #[must_use]
    pub fn new(
        topology: Arc<Topology>,
        ledger: Arc<AssignmentLedger>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            topology,
            ledger,
            slot_duration_s: config.slot_duration_s,
        }
    }

    /// Picks the lowest-cost destination for a pending task, `None` when no
    /// comm is reachable.
    fn find_best_assignment(&self, slot: u64, task: &Task, comm_backlog: &HashMap<u64, f64>) -> Option<Assignment> {
        let residual = (task.data_size - self.ledger.cumulative_transferred(&task.id)).max(0.0);

        let mut best: Option<(f64, Assignment)> = None;
        for comm_id in self.topology.comm_ids() {
            let Some(route) = self.topology.task_path(task.user_id, comm_id) else {
                continue;
            };

            let mut delay = 0.0;
            let mut energy = 0.0;
            for (hop, &speed) in route.speeds.iter().enumerate() {
                if speed > 0.0 {
                    let hop_delay = residual / speed;
                    delay += hop_delay;
                    energy += route.powers[hop] * hop_delay;
                }
            }
            let backlog = comm_backlog.get(&comm_id).copied().unwrap_or(0.0);
            let cost = GREEDY_DELAY_WEIGHT * delay
                + GREEDY_ENERGY_WEIGHT * energy
                + GREEDY_QUEUE_WEIGHT * backlog;

            if best.as_ref().is_none_or(|(c, _)| cost < *c) {
                best = Some((cost, seed_assignment(&self.ledger, slot, task, comm_id, route)));
            }
        }

        best.map(|(_, assignment)| assignment)
    }
}

impl SchedulePolicy for GreedyScheduler {
    fn schedule(&self, slot: u64, tasks: &[Task]) -> Vec<Assignment> {
        let backlog = comm_backlog(&self.ledger, tasks);
        let mut assignments = Vec::with_capacity(tasks.len());

        for task in tasks {
            let last = self.ledger.last(&task.id);
            let assignment = match (&last, task.status) {
                (Some(last), TaskStatus::Queued | TaskStatus::Computing) => {
                    Some(reuse_assignment(&self.ledger, slot, task, last))
                }
                (_, TaskStatus::Pending) => self.find_best_assignment(slot, task, &backlog),
                _ => None,
            };
            if let Some(assignment) = assignment {
                assignments.push(assignment);
            }
        }

        apportion(&mut assignments, tasks);
        assignments
    }

    fn execute(&self, assignments: &mut [Assignment], tasks: &HashMap<String, Task>) {
        settle(assignments, tasks, self.slot_duration_s);
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}

/// Lyapunov drift-plus-penalty scheduler.
///
/// Searches over randomised candidate assignment sets, scoring each by the
/// predicted next-slot cost `drift + V · penalty`, and keeps the best.
pub struct LyapunovScheduler {
    topology: Arc<Topology>,
    ledger: Arc<AssignmentLedger>,
    config: SchedulerConfig,
    rng: Mutex<SmallRng>,
    /// Per-comm queues after the previous executed slot, the drift baseline.
    last_comm_queues: Mutex<HashMap<u64, f64>>,
}

impl LyapunovScheduler {
    /// Creates a Lyapunov scheduler over the shared topology and ledger.
    #[must_use]
    pub fn new(
        topology: Arc<Topology>,
        ledger: Arc<AssignmentLedger>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            topology,
            ledger,
            config: config.clone(),
            rng: Mutex::new(SmallRng::from_entropy()),
            last_comm_queues: Mutex::new(HashMap::new()),
        }
    }

    /// Generates one candidate assignment set.
    ///
    /// Iteration 0 reuses the previous route for in-flight tasks; later
    /// iterations reassign every task to a uniformly chosen reachable comm
    /// to explore the placement space.
    fn generate_candidate(&self, slot: u64, tasks: &[Task], iteration: usize) -> Vec<Assignment> {
        let mut assignments = Vec::with_capacity(tasks.len());

        for task in tasks {
            if iteration == 0 {
                if let Some(last) = self.ledger.last(&task.id) {
                    if matches!(task.status, TaskStatus::Queued | TaskStatus::Computing) {
                        assignments.push(reuse_assignment(&self.ledger, slot, task, &last));
                        continue;
                    }
                }
            }

            if let Some(assignment) = self.random_assignment(slot, task) {
                assignments.push(assignment);
            }
        }

        assignments
    }

    /// Assigns a task to a uniformly chosen comm reachable from its entry
    /// comm, `None` when nothing is reachable.
    fn random_assignment(&self, slot: u64, task: &Task) -> Option<Assignment> {
        let reachable: Vec<(u64, TransferPath)> = self
            .topology
            .comm_ids()
            .into_iter()
            .filter_map(|comm_id| {
                self.topology
                    .task_path(task.user_id, comm_id)
                    .map(|route| (comm_id, route))
            })
            .collect();
        if reachable.is_empty() {
            return None;
        }

        let pick = self.rng.lock().gen_range(0..reachable.len());
        let (comm_id, route) = reachable.into_iter().nth(pick)?;
        Some(seed_assignment(&self.ledger, slot, task, comm_id, route))
    }

    /// Scores a candidate by its predicted next-slot drift-plus-penalty.
    fn lyapunov_cost(&self, candidate: &mut [Assignment], tasks: &HashMap<String, &Task>) -> f64 {
        let prediction = self.predict(candidate, tasks);

        let baseline = self.last_comm_queues.lock();
        let mut drift = 0.0;
        for (comm_id, next_queue) in &prediction.comm_queues {
            let previous = baseline.get(comm_id).copied().unwrap_or(0.0);
            drift += next_queue * next_queue - previous * previous;
        }
        drop(baseline);
        drift /= self.config.shrink_normalizer_s;

        let weights = &self.config.cost_weights;
        let penalty = (weights.alpha * prediction.total_delay
            + weights.beta * prediction.total_energy
            + weights.gamma * prediction.load)
            / self.config.shrink_normalizer_s;

        drift + self.config.drift_weight_v * penalty
    }

    /// Predicts the end-of-slot state of a candidate: provisional per-comm
    /// apportionment by queue share, then per-task transfer and processing
    /// bounds.
    fn predict(&self, candidate: &mut [Assignment], tasks: &HashMap<String, &Task>) -> Prediction {
        let mut comm_queue_totals: HashMap<u64, (f64, usize)> = HashMap::new();
        for assignment in candidate.iter() {
            let entry = comm_queue_totals.entry(assignment.comm_id).or_default();
            entry.0 += assignment.queue_data;
            entry.1 += 1;
        }

        for assignment in candidate.iter_mut() {
            let (total, members) = comm_queue_totals[&assignment.comm_id];
            assignment.resource_fraction = if total > 0.0 {
                assignment.queue_data / total
            } else {
                1.0 / members as f64
            };
        }

        let slot_s = self.config.slot_duration_s;
        let mut prediction = Prediction::default();

        for assignment in candidate.iter_mut() {
            let Some(task) = tasks.get(&assignment.task_id) else {
                continue;
            };

            let uplink = assignment.speeds.first().copied().unwrap_or(0.0);
            let transferred = (uplink * slot_s)
                .min(task.data_size - assignment.cumulative_transferred)
                .max(0.0);

            let capacity = assignment.resource_fraction * physics::CPU_CYCLES_PER_S * slot_s
                / physics::CYCLES_PER_BIT;
            let processed = assignment.queue_data.min(capacity).max(0.0);

            assignment.transferred_data = transferred;
            assignment.processed_data = processed;

            let next_queue = (assignment.queue_data + transferred - processed).max(0.0);
            *prediction.comm_queues.entry(assignment.comm_id).or_default() += next_queue;

            let metrics = assignment_metrics(assignment, slot_s);
            prediction.total_delay += metrics.total_delay();
            prediction.total_energy += metrics.total_energy();
        }

        prediction.load = prediction.comm_queues.values().sum();
        prediction
    }
}

#[derive(Debug, Default)]
struct Prediction {
    comm_queues: HashMap<u64, f64>,
    total_delay: f64,
    total_energy: f64,
    load: f64,
}

impl SchedulePolicy for LyapunovScheduler {
    fn schedule(&self, slot: u64, tasks: &[Task]) -> Vec<Assignment> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let task_map: HashMap<String, &Task> =
            tasks.iter().map(|t| (t.id.clone(), t)).collect();

        let mut best: Vec<Assignment> = Vec::new();
        let mut best_cost = f64::INFINITY;

        for iteration in 0..self.config.max_iterations {
            let mut candidate = self.generate_candidate(slot, tasks, iteration);
            let cost = self.lyapunov_cost(&mut candidate, &task_map);

            if cost < best_cost {
                best_cost = cost;
                best = candidate;
            }

            if iteration + 1 >= MIN_SEARCH_ITERATIONS && best_cost < self.config.early_stop_bias {
                break;
            }
        }

        tracing::debug!(slot, cost = best_cost, "lyapunov search settled");

        apportion(&mut best, tasks);
        best
    }

    fn execute(&self, assignments: &mut [Assignment], tasks: &HashMap<String, Task>) {
        settle(assignments, tasks, self.config.slot_duration_s);

        // Refresh the drift baseline with the realised end-of-slot queues.
        let mut baseline = self.last_comm_queues.lock();
        baseline.clear();
        for assignment in assignments.iter() {
            let next_queue = (assignment.queue_data + assignment.transferred_data
                - assignment.processed_data)
                .max(0.0);
            *baseline.entry(assignment.comm_id).or_default() += next_queue;
        }
    }

    fn name(&self) -> &'static str {
        "lyapunov"
    }
}

/// Builds a fresh assignment for a task routed to `comm_id`, seeding queue
/// state and cumulative progress from the ledger.
fn seed_assignment(
    ledger: &AssignmentLedger,
    slot: u64,
    task: &Task,
    comm_id: u64,
    route: TransferPath,
) -> Assignment {
    Assignment {
        slot,
        task_id: task.id.clone(),
        comm_id,
        path: route.path,
        speeds: route.speeds,
        powers: route.powers,
        resource_fraction: 0.0,
        queue_data: ledger.current_queue(&task.id),
        transferred_data: 0.0,
        processed_data: 0.0,
        cumulative_transferred: ledger.cumulative_transferred(&task.id),
        cumulative_processed: ledger.cumulative_processed(&task.id),
    }
}

/// Carries an in-flight task's previous destination and route into the new
/// slot unchanged.
fn reuse_assignment(
    ledger: &AssignmentLedger,
    slot: u64,
    task: &Task,
    last: &Assignment,
) -> Assignment {
    Assignment {
        slot,
        task_id: task.id.clone(),
        comm_id: last.comm_id,
        path: last.path.clone(),
        speeds: last.speeds.clone(),
        powers: last.powers.clone(),
        resource_fraction: 0.0,
        queue_data: ledger.current_queue(&task.id),
        transferred_data: 0.0,
        processed_data: 0.0,
        cumulative_transferred: last.cumulative_transferred,
        cumulative_processed: last.cumulative_processed,
    }
}

/// Current backlog per comm device, summed from the latest ledger entries
/// of the given tasks.
fn comm_backlog(ledger: &AssignmentLedger, tasks: &[Task]) -> HashMap<u64, f64> {
    let mut backlog = HashMap::new();
    for task in tasks {
        if let Some(last) = ledger.last(&task.id) {
            *backlog.entry(last.comm_id).or_default() += ledger.current_queue(&task.id);
        }
    }
    backlog
}

/// Final resource apportionment: splits each comm's CPU among its tasks by
/// priority- and backlog-derived weights, boosting starving tasks.
fn apportion(assignments: &mut [Assignment], tasks: &[Task]) {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut groups: HashMap<u64, Vec<usize>> = HashMap::new();
    for (idx, assignment) in assignments.iter().enumerate() {
        groups.entry(assignment.comm_id).or_default().push(idx);
    }

    for members in groups.values() {
        let mut weights = vec![0.0; members.len()];
        let mut total = 0.0;

        for (slot_idx, &idx) in members.iter().enumerate() {
            let assignment = &assignments[idx];
            let Some(task) = by_id.get(assignment.task_id.as_str()) else {
                continue;
            };

            let mut priority_factor = f64::from(task.priority) / 10.0 + 1.0;
            if task.is_starving() {
                priority_factor *= 1.0 + task.wait_time().as_secs_f64() / 10.0;
            }
            let queue_factor = assignment.queue_data + 1.0;

            let weight = priority_factor * queue_factor;
            weights[slot_idx] = weight;
            total += weight;
        }

        if total < MIN_TOTAL_WEIGHT {
            let even = 1.0 / members.len() as f64;
            for &idx in members {
                assignments[idx].resource_fraction = even;
            }
        } else {
            for (slot_idx, &idx) in members.iter().enumerate() {
                assignments[idx].resource_fraction = weights[slot_idx] / total;
            }
        }
    }
}

/// Settles the slot: recomputes the transferred and processed amounts under
/// the final fractions and advances the cumulative totals.
///
/// Bits transferred within the slot are eligible for processing in the same
/// slot, so `processed ≤ queue_at_start + transferred` and a small task can
/// finish in a single tick.
fn settle(assignments: &mut [Assignment], tasks: &HashMap<String, Task>, slot_s: f64) {
    for assignment in assignments.iter_mut() {
        let Some(task) = tasks.get(&assignment.task_id) else {
            continue;
        };

        let uplink = assignment.speeds.first().copied().unwrap_or(0.0);
        let transferred = (uplink * slot_s)
            .min(task.data_size - assignment.cumulative_transferred)
            .max(0.0);

        let processed = if assignment.resource_fraction > 0.0 {
            let capacity = assignment.resource_fraction * physics::CPU_CYCLES_PER_S * slot_s
                / physics::CYCLES_PER_BIT;
            (assignment.queue_data + transferred).min(capacity).max(0.0)
        } else {
            0.0
        };

        assignment.transferred_data = transferred;
        assignment.processed_data = processed;
        assignment.cumulative_transferred += transferred;
        assignment.cumulative_processed += processed;
    }
}
