//! Meridian engine - online task scheduling for a multi-hop edge-compute
//! network.
//!
//! User devices generate offloadable compute jobs; a mesh of compute/relay
//! devices receives, forwards, and processes them. Every slot the engine
//! decides:
//!
//! - **Placement**: which comm device each task is routed to
//! - **Routing**: the multi-hop transport path, from a Floyd–Warshall cache
//! - **Apportionment**: what fraction of each destination's CPU every
//!   queued task receives
//!
//! Two interchangeable schedulers drive the placement: a greedy
//! lowest-transfer-cost variant and a Lyapunov drift-plus-penalty search
//! that trades queue stability against delay, energy, and load.
//!
//! # Architecture
//!
//! The engine owns the task registry, the append-only assignment ledger,
//! the current-state holder, and the alarm monitor; the topology is built
//! once at startup and shared immutably. A dedicated tokio task ticks once
//! per slot and publishes a [`StateMetrics`] record per tick, so external
//! observers see atomic slot advancement.
//!
//! # Example
//!
//! ```ignore
//! use meridian_engine::{Engine, EngineConfig, Topology};
//!
//! let topology = Topology::build(&nodes, &links)?;
//! let engine = Arc::new(Engine::new(topology, sink, EngineConfig::default()));
//! let task = engine.submit(user_id, 1e6, "inference", None)?;
//! ```

pub mod alarm;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod physics;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod task;
pub mod topology;

// Re-export main types
pub use alarm::{Alarm, AlarmEventType, AlarmMonitor, AlarmSink, AlarmStatus, AlarmThresholds, MemorySink};
pub use config::{AlarmConfig, CostWeights, EngineConfig, SchedulerConfig, SchedulerMode, ServiceConfig};
pub use engine::{Engine, SystemInfo};
pub use error::{EngineError, Result};
pub use ledger::{Assignment, AssignmentLedger};
pub use metrics::StateMetrics;
pub use registry::TaskRegistry;
pub use scheduler::{GreedyScheduler, LyapunovScheduler, SchedulePolicy};
pub use store::{StaticSource, TopologySource};
pub use task::{Task, TaskStatus};
pub use topology::{LinkRecord, NodeKind, NodeRecord, Topology, TransferPath};
