//! Configuration types for the engine.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::physics;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduling loop configuration.
    pub scheduler: SchedulerConfig,
    /// Alarm monitor configuration.
    pub alarms: AlarmConfig,
}

/// Scheduling loop configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Active scheduler variant.
    pub mode: SchedulerMode,
    /// Control slot length in seconds.
    pub slot_duration_s: f64,
    /// Iteration budget of the Lyapunov search.
    pub max_iterations: usize,
    /// Early-termination cost bias of the Lyapunov search.
    pub early_stop_bias: f64,
    /// Penalty weights for delay, load, and energy.
    pub cost_weights: CostWeights,
    /// Lyapunov drift-vs-penalty trade-off weight.
    pub drift_weight_v: f64,
    /// Normaliser applied to drift and penalty terms.
    pub shrink_normalizer_s: f64,
}

impl SchedulerConfig {
    /// Slot length as a [`Duration`].
    #[must_use]
    pub fn slot_duration(&self) -> Duration {
        Duration::from_secs_f64(self.slot_duration_s)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::Lyapunov,
            slot_duration_s: physics::SLOT_DURATION_S,
            max_iterations: physics::MAX_ITERATIONS,
            early_stop_bias: physics::EARLY_STOP_BIAS,
            cost_weights: CostWeights::default(),
            drift_weight_v: physics::DRIFT_WEIGHT_V,
            shrink_normalizer_s: physics::SHRINK_NORMALIZER_S,
        }
    }
}

/// Scheduler variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    /// Single-pass lowest-transfer-cost placement.
    Greedy,
    /// Drift-plus-penalty randomised search.
    Lyapunov,
}

impl std::str::FromStr for SchedulerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greedy" => Ok(Self::Greedy),
            "lyapunov" => Ok(Self::Lyapunov),
            other => Err(format!("unknown scheduler mode: {other}")),
        }
    }
}

/// Weights of the penalty term.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    /// Weight on total delay.
    pub alpha: f64,
    /// Weight on total energy.
    pub beta: f64,
    /// Weight on load.
    pub gamma: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            alpha: physics::COST_ALPHA,
            beta: physics::COST_BETA,
            gamma: physics::COST_GAMMA,
        }
    }
}

/// Alarm monitor configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Threshold on total per-slot delay in seconds.
    pub max_delay: f64,
    /// Threshold on total per-slot energy in joules.
    pub max_energy: f64,
    /// Threshold on the load measure (total queued bits).
    pub max_load: f64,
    /// Threshold on total queued bits.
    pub max_queue: f64,
    /// Suppression window for repeated alarms with the same key.
    #[serde(with = "serde_duration_secs")]
    pub cooldown: Duration,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            max_delay: 10.0,
            max_energy: 100.0,
            max_load: 1e8,
            max_queue: 1e8,
            cooldown: Duration::from_secs(300),
        }
    }
}

/// Serde helper for Duration as seconds.
mod serde_duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Service configuration wrapping the engine plus the HTTP listener and
/// topology seed. Loaded by the binary via figment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP API configuration.
    pub api: ApiConfig,
    /// Engine configuration.
    pub engine: EngineConfig,
    /// Topology seed (nodes and links), read once at startup.
    pub topology: TopologySeed,
}

/// HTTP API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8084),
        }
    }
}

/// Declarative topology seed for the in-memory source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TopologySeed {
    /// Device records.
    pub nodes: Vec<crate::topology::NodeRecord>,
    /// Link records.
    pub links: Vec<crate::topology::LinkRecord>,
}
