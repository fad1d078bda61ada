//! The engine: periodic scheduling loop plus the public operations surface.
//!
//! One engine owns the task registry, the assignment ledger, the current
//! state holder, and the alarm monitor; the immutable topology is shared
//! read-only. The loop runs as a dedicated tokio task woken every slot.
//! Each subsystem carries its own lock and the loop never holds two at
//! once: scheduling and prediction run over snapshots.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alarm::{AlarmMonitor, AlarmSink};
use crate::config::{EngineConfig, SchedulerMode};
use crate::error::{EngineError, Result};
use crate::ledger::{Assignment, AssignmentLedger};
use crate::metrics::{assignment_metrics, StateMetrics};
use crate::registry::TaskRegistry;
use crate::scheduler::{GreedyScheduler, LyapunovScheduler, SchedulePolicy};
use crate::task::{Task, TaskStatus};
use crate::topology::Topology;

/// Counts, flags, and the latest state snapshot for the info endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    /// Number of user devices.
    pub user_count: usize,
    /// Number of comm devices.
    pub comm_count: usize,
    /// Total submitted tasks.
    pub task_count: usize,
    /// Tasks still participating in scheduling.
    pub active_tasks: usize,
    /// Completed tasks.
    pub completed_tasks: usize,
    /// Whether the loop is currently running.
    pub is_running: bool,
    /// Active scheduler variant.
    pub scheduler: &'static str,
    /// Current slot counter.
    pub slot: u64,
    /// Latest published state, if any slot has run.
    pub state: Option<StateMetrics>,
    /// Latest route per task with at least one assignment.
    pub transfer_paths: HashMap<String, Vec<u64>>,
}

/// The scheduling engine.
pub struct Engine {
    topology: Arc<Topology>,
    registry: Arc<TaskRegistry>,
    ledger: Arc<AssignmentLedger>,
    monitor: Arc<AlarmMonitor>,
    policy: RwLock<Arc<dyn SchedulePolicy>>,
    /// Latest published per-slot state.
    state: RwLock<Option<StateMetrics>>,
    /// Every published per-slot state, in slot order.
    history: RwLock<Vec<StateMetrics>>,
    slot: AtomicU64,
    is_running: AtomicBool,
    cancel: RwLock<CancellationToken>,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine over a built topology and an alarm sink.
    #[must_use]
    pub fn new(topology: Topology, sink: Arc<dyn AlarmSink>, config: EngineConfig) -> Self {
        let topology = Arc::new(topology);
        let ledger = Arc::new(AssignmentLedger::new());
        let policy = make_policy(
            config.scheduler.mode,
            &topology,
            &ledger,
            &config,
        );

        Self {
            monitor: Arc::new(AlarmMonitor::new(sink, &config.alarms)),
            registry: Arc::new(TaskRegistry::new()),
            policy: RwLock::new(policy),
            state: RwLock::new(None),
            history: RwLock::new(Vec::new()),
            slot: AtomicU64::new(0),
            is_running: AtomicBool::new(false),
            cancel: RwLock::new(CancellationToken::new()),
            topology,
            ledger,
            config,
        }
    }

    /// Submits a task. Starts the scheduling loop when it is idle; the new
    /// task becomes visible to the next tick.
    pub fn submit(
        self: &Arc<Self>,
        user_id: u64,
        data_size: f64,
        kind: impl Into<String>,
        priority: Option<i32>,
    ) -> Result<Task> {
        if self.topology.comm_count() == 0 {
            return Err(EngineError::NotInitialized);
        }
        if self.topology.user(user_id).is_none() {
            return Err(EngineError::UnknownUser(user_id));
        }
        if data_size <= 0.0 {
            return Err(EngineError::InvalidArgument(format!(
                "data_size must be positive, got {data_size}"
            )));
        }

        let task = Task::new(user_id, data_size, kind, priority);
        self.registry.add(task.clone());
        info!(task_id = %task.id, user_id, data_size, "task submitted");

        if !self.is_running.swap(true, Ordering::SeqCst) {
            self.spawn_loop();
        }

        Ok(task)
    }

    /// Cancels an active task and raises the matching system alarm.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        self.registry.cancel(task_id)?;
        if let Some(task) = self.registry.get(task_id) {
            self.monitor.task_failed(&task).await;
        }
        info!(task_id, "task cancelled");
        Ok(())
    }

    /// Looks up one task.
    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        self.registry
            .get(task_id)
            .ok_or_else(|| EngineError::UnknownTask(task_id.to_owned()))
    }

    /// Pages through tasks with optional filters.
    #[must_use]
    pub fn page_tasks(
        &self,
        offset: usize,
        limit: usize,
        user_filter: Option<u64>,
        status_filter: Option<TaskStatus>,
    ) -> (Vec<Task>, usize) {
        self.registry.page(offset, limit, user_filter, status_filter)
    }

    /// Full assignment history of one task.
    #[must_use]
    pub fn task_history(&self, task_id: &str) -> Vec<Assignment> {
        self.ledger.history(task_id)
    }

    /// Counts, flags, current slot, last state, and per-task latest paths.
    #[must_use]
    pub fn system_info(&self) -> SystemInfo {
        let (tasks, task_count) = self.registry.page(0, usize::MAX, None, None);

        let mut transfer_paths = HashMap::new();
        let mut active_tasks = 0;
        for task in &tasks {
            if task.status.is_active() {
                active_tasks += 1;
            }
            if let Some(last) = self.ledger.last(&task.id) {
                transfer_paths.insert(task.id.clone(), last.path);
            }
        }

        SystemInfo {
            user_count: self.topology.user_count(),
            comm_count: self.topology.comm_count(),
            task_count,
            active_tasks,
            completed_tasks: self.registry.count_completed(),
            is_running: self.is_running.load(Ordering::SeqCst),
            scheduler: self.policy.read().name(),
            slot: self.slot.load(Ordering::SeqCst),
            state: self.current_state(),
            transfer_paths,
        }
    }

    /// Swaps the active scheduler variant.
    pub fn set_scheduler_mode(&self, mode: SchedulerMode) {
        let policy = make_policy(mode, &self.topology, &self.ledger, &self.config);
        info!(mode = policy.name(), "scheduler mode switched");
        *self.policy.write() = policy;
    }

    /// Requests a cooperative loop shutdown; any in-flight tick completes.
    pub fn stop(&self) {
        self.cancel.read().cancel();
    }

    /// Drops assignment and state history and rewinds the slot counter.
    pub fn clear_history(&self) {
        self.ledger.clear();
        *self.state.write() = None;
        self.history.write().clear();
        self.slot.store(0, Ordering::SeqCst);
        info!("history cleared");
    }

    /// The latest published state.
    #[must_use]
    pub fn current_state(&self) -> Option<StateMetrics> {
        self.state.read().clone()
    }

    /// Copies of every published state record, in slot order.
    #[must_use]
    pub fn state_history(&self) -> Vec<StateMetrics> {
        self.history.read().clone()
    }

    /// Current slot counter.
    #[must_use]
    pub fn current_slot(&self) -> u64 {
        self.slot.load(Ordering::SeqCst)
    }

    /// Whether the scheduling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// The alarm monitor, for runtime threshold changes.
    #[must_use]
    pub fn alarm_monitor(&self) -> &AlarmMonitor {
        &self.monitor
    }

    /// Runs exactly one scheduling slot. Exposed so tests can drive the
    /// engine deterministically without the wall-clock ticker.
    pub async fn run_slot(&self) -> bool {
        self.tick().await
    }

    fn spawn_loop(self: &Arc<Self>) {
        let token = CancellationToken::new();
        *self.cancel.write() = token.clone();

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run_loop(token).await;
        });
    }

    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let interval = self.config.scheduler.slot_duration();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Consume the interval's immediate first fire so the first slot runs
        // a full interval after start; submissions made during slot t only
        // become visible at slot t+1.
        ticker.tick().await;
        info!(interval_ms = interval.as_millis() as u64, "scheduling loop started");

        let mut idled_out = false;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("scheduling loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if !self.tick().await {
                        debug!("no active tasks, scheduling loop idling out");
                        idled_out = true;
                        break;
                    }
                }
            }
        }

        self.is_running.store(false, Ordering::SeqCst);

        // A submission may have raced the idle exit; restart for it. An
        // explicit stop is final regardless of remaining tasks.
        if idled_out
            && !self.registry.get_active().is_empty()
            && !self.is_running.swap(true, Ordering::SeqCst)
        {
            self.spawn_loop();
        }
    }

    /// One slot: timeouts, snapshot, schedule, execute, transitions,
    /// ledger append, state publication, alarm checks. Returns false when
    /// there was nothing to schedule.
    async fn tick(&self) -> bool {
        let slot = self.slot.fetch_add(1, Ordering::SeqCst) + 1;

        for task_id in self.registry.check_timeouts() {
            warn!(task_id = %task_id, "task timed out");
            if let Some(task) = self.registry.get(&task_id) {
                self.monitor.task_failed(&task).await;
            }
        }

        let active = self.registry.get_active();
        if active.is_empty() {
            return false;
        }

        let policy = self.policy.read().clone();
        let mut assignments = policy.schedule(slot, &active);

        let task_map: HashMap<String, Task> =
            active.iter().map(|t| (t.id.clone(), t.clone())).collect();
        policy.execute(&mut assignments, &task_map);

        for assignment in &assignments {
            self.apply_transitions(assignment, &task_map);
        }

        let state = self.aggregate_state(slot, &assignments, active.len());
        for assignment in assignments {
            self.ledger.append(assignment);
        }

        *self.state.write() = Some(state.clone());
        self.history.write().push(state.clone());

        self.monitor.check_state(&state).await;
        self.monitor.sweep();

        true
    }

    /// Derives and applies the lifecycle moves an executed assignment
    /// implies. Invalid moves are logged and skipped; they never halt the
    /// loop.
    fn apply_transitions(&self, assignment: &Assignment, tasks: &HashMap<String, Task>) {
        let Some(task) = tasks.get(&assignment.task_id) else {
            return;
        };

        let mut current = task.status;
        if current == TaskStatus::Pending {
            match self.registry.transition(&task.id, TaskStatus::Queued) {
                Ok(()) => current = TaskStatus::Queued,
                Err(e) => {
                    warn!(task_id = %task.id, error = %e, "queued transition rejected");
                    return;
                }
            }
        }

        if task.is_fully_processed(assignment.cumulative_processed) {
            match self.registry.transition(&task.id, TaskStatus::Completed) {
                Ok(()) => info!(task_id = %task.id, slot = assignment.slot, "task completed"),
                Err(e) => warn!(task_id = %task.id, error = %e, "completed transition rejected"),
            }
        } else if current == TaskStatus::Queued && assignment.processed_data > 0.0 {
            if let Err(e) = self.registry.transition(&task.id, TaskStatus::Computing) {
                warn!(task_id = %task.id, error = %e, "computing transition rejected");
            }
        }
    }

    /// Folds the slot's executed assignments into one state record.
    fn aggregate_state(
        &self,
        slot: u64,
        assignments: &[Assignment],
        active_count: usize,
    ) -> StateMetrics {
        let scheduler = &self.config.scheduler;
        let previous_queues = self
            .state
            .read()
            .as_ref()
            .map(|s| s.comm_queues.clone())
            .unwrap_or_default();

        let mut state = StateMetrics {
            slot,
            ..StateMetrics::default()
        };

        for assignment in assignments {
            let next_queue = (assignment.queue_data + assignment.transferred_data
                - assignment.processed_data)
                .max(0.0);
            *state.comm_queues.entry(assignment.comm_id).or_default() += next_queue;

            let metrics = assignment_metrics(assignment, scheduler.slot_duration_s);
            state.transfer_delay += metrics.transfer_delay;
            state.compute_delay += metrics.compute_delay;
            state.transfer_energy += metrics.transfer_energy;
            state.compute_energy += metrics.compute_energy;
        }

        state.total_queue = state.comm_queues.values().sum();
        state.total_delay = state.transfer_delay + state.compute_delay;
        state.total_energy = state.transfer_energy + state.compute_energy;
        state.load = active_count as f64 / self.topology.comm_count().max(1) as f64;

        let shrink = scheduler.shrink_normalizer_s;
        let mut drift = 0.0;
        for (comm_id, next) in &state.comm_queues {
            let prev = previous_queues.get(comm_id).copied().unwrap_or(0.0);
            drift += next * next - prev * prev;
        }
        for (comm_id, prev) in &previous_queues {
            if !state.comm_queues.contains_key(comm_id) {
                drift -= prev * prev;
            }
        }
        state.drift = drift / shrink;

        let weights = &scheduler.cost_weights;
        state.penalty = (weights.alpha * state.total_delay
            + weights.beta * state.total_energy
            + weights.gamma * state.total_queue)
            / shrink;
        state.cost = state.drift + scheduler.drift_weight_v * state.penalty;

        state
    }
}

/// Builds the scheduler variant for a mode.
fn make_policy(
    mode: SchedulerMode,
    topology: &Arc<Topology>,
    ledger: &Arc<AssignmentLedger>,
    config: &EngineConfig,
) -> Arc<dyn SchedulePolicy> {
    match mode {
        SchedulerMode::Greedy => Arc::new(GreedyScheduler::new(
            Arc::clone(topology),
            Arc::clone(ledger),
            &config.scheduler,
        )),
        SchedulerMode::Lyapunov => Arc::new(LyapunovScheduler::new(
            Arc::clone(topology),
            Arc::clone(ledger),
            &config.scheduler,
        )),
    }
}
