//! Alarm monitor: threshold evaluation with cool-down de-duplication.
//!
//! The engine feeds every published [`StateMetrics`] and every failed task
//! through the monitor. Breaches produce alarm records keyed by a stable
//! string; identical keys within the cool-down window are suppressed, so the
//! sink sees one call per distinct incident.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AlarmConfig;
use crate::metrics::StateMetrics;
use crate::task::Task;

/// Alarm event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmEventType {
    Performance,
    Network,
    Security,
    System,
    Hardware,
}

/// Alarm lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    Active,
    Resolved,
}

/// An alarm record handed to the sink.
#[derive(Debug, Clone, Serialize)]
pub struct Alarm {
    /// Human-readable alarm name.
    pub name: String,
    /// Event category.
    pub event_type: AlarmEventType,
    /// Lifecycle status; the monitor always emits `Active`.
    pub status: AlarmStatus,
    /// Incident details.
    pub description: String,
}

/// Destination for alarm records.
#[async_trait]
pub trait AlarmSink: Send + Sync {
    /// Stores one alarm. The monitor's cool-down keying guarantees one call
    /// per distinct incident.
    async fn create_alarm(&self, alarm: Alarm);
}

/// In-memory alarm sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    alarms: Mutex<Vec<Alarm>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out everything stored so far.
    #[must_use]
    pub fn alarms(&self) -> Vec<Alarm> {
        self.alarms.lock().clone()
    }
}

#[async_trait]
impl AlarmSink for MemorySink {
    async fn create_alarm(&self, alarm: Alarm) {
        self.alarms.lock().push(alarm);
    }
}

/// Mutable alarm thresholds.
#[derive(Debug, Clone, Copy)]
pub struct AlarmThresholds {
    /// Total per-slot delay in seconds.
    pub max_delay: f64,
    /// Total per-slot energy in joules.
    pub max_energy: f64,
    /// Load measure (total queued bits).
    pub max_load: f64,
    /// Total queued bits.
    pub max_queue: f64,
}

impl From<&AlarmConfig> for AlarmThresholds {
    fn from(config: &AlarmConfig) -> Self {
        Self {
            max_delay: config.max_delay,
            max_energy: config.max_energy,
            max_load: config.max_load,
            max_queue: config.max_queue,
        }
    }
}

/// Evaluates per-slot metrics against thresholds and de-duplicates alarms.
pub struct AlarmMonitor {
    sink: Arc<dyn AlarmSink>,
    thresholds: RwLock<AlarmThresholds>,
    cooldown: Duration,
    /// Last emission per alarm key.
    last_fired: Mutex<HashMap<String, Instant>>,
    last_sweep: Mutex<Instant>,
}

impl AlarmMonitor {
    /// Creates a monitor emitting into `sink`.
    pub fn new(sink: Arc<dyn AlarmSink>, config: &AlarmConfig) -> Self {
        Self {
            sink,
            thresholds: RwLock::new(AlarmThresholds::from(config)),
            cooldown: config.cooldown,
            last_fired: Mutex::new(HashMap::new()),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Replaces the thresholds.
    pub fn set_thresholds(&self, thresholds: AlarmThresholds) {
        *self.thresholds.write() = thresholds;
    }

    /// Current thresholds.
    #[must_use]
    pub fn thresholds(&self) -> AlarmThresholds {
        *self.thresholds.read()
    }

    /// Checks one published state record against the thresholds.
    pub async fn check_state(&self, state: &StateMetrics) {
        let thresholds = self.thresholds();

        if state.total_delay > thresholds.max_delay {
            self.fire(
                "performance_delay".to_owned(),
                "total delay over threshold",
                AlarmEventType::Performance,
                format!(
                    "total delay {:.3}s exceeds {:.3}s (transfer {:.3}s, compute {:.3}s)",
                    state.total_delay,
                    thresholds.max_delay,
                    state.transfer_delay,
                    state.compute_delay
                ),
            )
            .await;
        }

        if state.total_energy > thresholds.max_energy {
            self.fire(
                "performance_energy".to_owned(),
                "total energy over threshold",
                AlarmEventType::Performance,
                format!(
                    "total energy {:.3}J exceeds {:.3}J (transfer {:.3}J, compute {:.3}J)",
                    state.total_energy,
                    thresholds.max_energy,
                    state.transfer_energy,
                    state.compute_energy
                ),
            )
            .await;
        }

        // The monitor's load measure is the total queue backlog.
        if state.total_queue > thresholds.max_load {
            self.fire(
                "performance_load".to_owned(),
                "system load over threshold",
                AlarmEventType::Performance,
                format!(
                    "queued backlog {:.0} bits exceeds load threshold {:.0}",
                    state.total_queue, thresholds.max_load
                ),
            )
            .await;
        }

        if state.total_queue > thresholds.max_queue {
            self.fire(
                "network_queue".to_owned(),
                "network queue backlog",
                AlarmEventType::Network,
                format!(
                    "total queue {:.2}MB exceeds {:.2}MB",
                    state.total_queue / 1e6,
                    thresholds.max_queue / 1e6
                ),
            )
            .await;
        }

        for (comm_id, queue) in &state.comm_queues {
            if *queue > thresholds.max_queue * 0.5 {
                self.fire(
                    format!("network_queue_comm_{comm_id}"),
                    "comm device queue backlog",
                    AlarmEventType::Network,
                    format!("comm {comm_id} holds {:.2}MB of queued data", queue / 1e6),
                )
                .await;
            }
        }
    }

    /// Emits a system alarm for a task that transitioned to failed.
    pub async fn task_failed(&self, task: &Task) {
        let reason = task.failure_reason.as_deref().unwrap_or("unknown");
        self.fire(
            format!("task_failed_{}", task.id),
            "task failed",
            AlarmEventType::System,
            format!(
                "task {} (user {}) failed: {} ({:.2}MB payload)",
                task.id,
                task.user_id,
                reason,
                task.data_size / 1e6
            ),
        )
        .await;
    }

    /// Drops keys that have been quiet for more than twice the cool-down.
    /// Time-gated so the engine can call it every tick.
    pub fn sweep(&self) {
        let now = Instant::now();
        {
            let mut last_sweep = self.last_sweep.lock();
            if now.duration_since(*last_sweep) < self.cooldown {
                return;
            }
            *last_sweep = now;
        }

        let horizon = self.cooldown * 2;
        self.last_fired
            .lock()
            .retain(|_, fired| now.duration_since(*fired) <= horizon);
    }

    /// Creates an alarm unless the same key fired within the cool-down.
    async fn fire(
        &self,
        key: String,
        name: &str,
        event_type: AlarmEventType,
        description: String,
    ) {
        {
            let mut last_fired = self.last_fired.lock();
            if let Some(fired) = last_fired.get(&key) {
                if fired.elapsed() < self.cooldown {
                    return;
                }
            }
            // Reserve the key before the async send so concurrent checks
            // cannot double-fire.
            last_fired.insert(key, Instant::now());
        }

        tracing::warn!(name, ?event_type, %description, "alarm raised");
        self.sink
            .create_alarm(Alarm {
                name: name.to_owned(),
                event_type,
                status: AlarmStatus::Active,
                description,
            })
            .await;
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.last_fired.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn monitor_with(cooldown: Duration) -> (AlarmMonitor, Arc<MemorySink>) {
        let config = AlarmConfig {
            max_delay: 1.0,
            max_energy: 10.0,
            max_load: 1e6,
            max_queue: 1e6,
            cooldown,
        };
        let sink = Arc::new(MemorySink::new());
        (AlarmMonitor::new(sink.clone(), &config), sink)
    }

    fn breached_state() -> StateMetrics {
        StateMetrics {
            total_delay: 5.0,
            transfer_delay: 4.0,
            compute_delay: 1.0,
            ..StateMetrics::default()
        }
    }

    #[tokio::test]
    async fn breach_emits_one_alarm() {
        let (monitor, sink) = monitor_with(Duration::from_secs(300));

        monitor.check_state(&breached_state()).await;

        let alarms = sink.alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].event_type, AlarmEventType::Performance);
        assert_eq!(alarms[0].status, AlarmStatus::Active);
    }

    #[tokio::test]
    async fn cooldown_suppresses_duplicates() {
        let (monitor, sink) = monitor_with(Duration::from_millis(50));

        monitor.check_state(&breached_state()).await;
        monitor.check_state(&breached_state()).await;
        assert_eq!(sink.alarms().len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.check_state(&breached_state()).await;
        assert_eq!(sink.alarms().len(), 2);
    }

    #[tokio::test]
    async fn per_comm_queue_alarms_are_keyed_by_comm() {
        let (monitor, sink) = monitor_with(Duration::from_secs(300));

        let mut state = StateMetrics::default();
        state.comm_queues.insert(10, 6e5);
        state.comm_queues.insert(11, 7e5);
        monitor.check_state(&state).await;

        let alarms = sink.alarms();
        assert_eq!(alarms.len(), 2);
        assert!(alarms.iter().all(|a| a.event_type == AlarmEventType::Network));
    }

    #[tokio::test]
    async fn below_threshold_is_quiet() {
        let (monitor, sink) = monitor_with(Duration::from_secs(300));
        monitor.check_state(&StateMetrics::default()).await;
        assert!(sink.alarms().is_empty());
    }

    #[tokio::test]
    async fn failed_task_raises_system_alarm() {
        let (monitor, sink) = monitor_with(Duration::from_secs(300));

        let mut task = Task::new(1, 1e6, "test", None);
        task.status = TaskStatus::Failed;
        task.failure_reason = Some("cancelled".to_owned());

        monitor.task_failed(&task).await;
        monitor.task_failed(&task).await;

        let alarms = sink.alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].event_type, AlarmEventType::System);
        assert!(alarms[0].description.contains("cancelled"));
    }

    #[tokio::test]
    async fn sweep_drops_stale_keys() {
        let (monitor, _sink) = monitor_with(Duration::from_millis(20));

        monitor.check_state(&breached_state()).await;
        assert_eq!(monitor.tracked_keys(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        monitor.sweep();
        assert_eq!(monitor.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn thresholds_are_mutable_at_runtime() {
        let (monitor, sink) = monitor_with(Duration::from_secs(300));

        let mut thresholds = monitor.thresholds();
        thresholds.max_delay = 100.0;
        monitor.set_thresholds(thresholds);

        monitor.check_state(&breached_state()).await;
        assert!(sink.alarms().is_empty());
    }
}
