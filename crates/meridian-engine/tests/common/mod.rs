//! Common test utilities for engine integration tests.

pub mod fixtures;

use meridian_engine::{
    api::AppState, AlarmConfig, Engine, EngineConfig, MemorySink, SchedulerMode, Task, Topology,
};
use std::sync::Arc;
use std::time::Duration;

/// Complete test engine setup with all components wired together.
pub struct TestEngine {
    pub engine: Arc<Engine>,
    pub sink: Arc<MemorySink>,
}

impl TestEngine {
    /// Engine over the single-cell topology with default configuration.
    pub fn new() -> Self {
        Self::with_config(fixtures::single_cell(), EngineConfig::default())
    }

    /// Engine over a custom topology and configuration.
    pub fn with_config(topology: Topology, config: EngineConfig) -> Self {
        let sink = Arc::new(MemorySink::new());
        let engine = Arc::new(Engine::new(topology, sink.clone(), config));
        Self { engine, sink }
    }

    /// Engine over a custom topology and scheduler mode.
    pub fn with_mode(topology: Topology, mode: SchedulerMode) -> Self {
        let mut config = EngineConfig::default();
        config.scheduler.mode = mode;
        Self::with_config(topology, config)
    }

    /// Engine with custom alarm settings over the single-cell topology.
    pub fn with_alarms(alarms: AlarmConfig) -> Self {
        let mut config = EngineConfig::default();
        config.alarms = alarms;
        Self::with_config(fixtures::single_cell(), config)
    }

    /// Submits a task and immediately parks the background loop, so the
    /// test drives every slot itself through [`TestEngine::run_slots`].
    pub async fn submit_paused(&self, user_id: u64, data_size: f64, priority: Option<i32>) -> Task {
        let task = self
            .engine
            .submit(user_id, data_size, "test", priority)
            .expect("submit");
        self.engine.stop();
        // Let the parked loop task observe the stop before its first tick.
        tokio::time::sleep(Duration::from_millis(2)).await;
        task
    }

    /// Drives `n` slots synchronously.
    pub async fn run_slots(&self, n: usize) {
        for _ in 0..n {
            self.engine.run_slot().await;
        }
    }

    /// Wires the engine into API application state.
    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            engine: self.engine.clone(),
        })
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
