//! Integration tests for alarm thresholds and cool-down behaviour.

mod common;

use common::TestEngine;
use meridian_engine::{AlarmConfig, AlarmEventType};
use std::time::Duration;

fn quiet_thresholds() -> AlarmConfig {
    AlarmConfig {
        max_delay: 1e9,
        max_energy: 1e9,
        max_load: 1e9,
        max_queue: 1e9,
        cooldown: Duration::from_secs(300),
    }
}

/// A zero delay threshold breaches on the first slot; repeated breaches
/// within the cool-down stay suppressed.
#[tokio::test]
async fn delay_breach_fires_once_per_cooldown() {
    let alarms = AlarmConfig {
        max_delay: 0.0,
        ..quiet_thresholds()
    };
    let setup = TestEngine::with_alarms(alarms);
    setup.submit_paused(1, 1e6, None).await;

    setup.run_slots(4).await;

    let delay_alarms: Vec<_> = setup
        .sink
        .alarms()
        .into_iter()
        .filter(|a| a.name == "total delay over threshold")
        .collect();
    assert_eq!(delay_alarms.len(), 1);
    assert_eq!(delay_alarms[0].event_type, AlarmEventType::Performance);
}

/// Once the cool-down window passes, the same breach fires again.
#[tokio::test]
async fn breach_fires_again_after_cooldown() {
    let alarms = AlarmConfig {
        max_delay: 0.0,
        cooldown: Duration::from_millis(100),
        ..quiet_thresholds()
    };
    let setup = TestEngine::with_alarms(alarms);
    setup.submit_paused(1, 1e6, None).await;

    setup.run_slots(2).await;
    let count_before = setup
        .sink
        .alarms()
        .iter()
        .filter(|a| a.name == "total delay over threshold")
        .count();
    assert_eq!(count_before, 1);

    tokio::time::sleep(Duration::from_millis(150)).await;
    setup.run_slots(1).await;

    let count_after = setup
        .sink
        .alarms()
        .iter()
        .filter(|a| a.name == "total delay over threshold")
        .count();
    assert_eq!(count_after, 2);
}

/// Queue backlog raises both the network alarm and the per-comm alarm.
#[tokio::test]
async fn queue_backlog_raises_network_alarms() {
    let alarms = AlarmConfig {
        max_queue: 1e4,
        ..quiet_thresholds()
    };
    let setup = TestEngine::with_alarms(alarms);
    // Processing-bound: the first slot leaves ~1.5e5 bits queued.
    setup.submit_paused(1, 2e5, None).await;

    setup.run_slots(1).await;

    let alarms = setup.sink.alarms();
    let network: Vec<_> = alarms
        .iter()
        .filter(|a| a.event_type == AlarmEventType::Network)
        .collect();
    assert_eq!(network.len(), 2, "total-queue and per-comm alarms");
    assert!(network.iter().any(|a| a.name == "network queue backlog"));
    assert!(network.iter().any(|a| a.name == "comm device queue backlog"));
}

/// Cancellation produces a system alarm carrying the failure reason.
#[tokio::test]
async fn cancelled_task_raises_system_alarm() {
    let setup = TestEngine::with_alarms(quiet_thresholds());
    let task = setup.submit_paused(1, 2e5, None).await;

    setup.run_slots(1).await;
    setup.engine.cancel(&task.id).await.unwrap();

    let system: Vec<_> = setup
        .sink
        .alarms()
        .into_iter()
        .filter(|a| a.event_type == AlarmEventType::System)
        .collect();
    assert_eq!(system.len(), 1);
    assert!(system[0].description.contains("cancelled"));
    assert!(system[0].description.contains(&task.id));
}

/// Raising a threshold at runtime silences subsequent checks.
#[tokio::test]
async fn runtime_threshold_change_applies_immediately() {
    let alarms = AlarmConfig {
        max_delay: 0.0,
        cooldown: Duration::from_millis(50),
        ..quiet_thresholds()
    };
    let setup = TestEngine::with_alarms(alarms);
    setup.submit_paused(1, 1e6, None).await;

    setup.run_slots(1).await;
    assert_eq!(setup.sink.alarms().len(), 1);

    let mut thresholds = setup.engine.alarm_monitor().thresholds();
    thresholds.max_delay = 1e9;
    setup.engine.alarm_monitor().set_thresholds(thresholds);

    tokio::time::sleep(Duration::from_millis(80)).await;
    setup.run_slots(2).await;
    assert_eq!(setup.sink.alarms().len(), 1, "no alarms after the raise");
}

/// A healthy run under generous thresholds stays quiet.
#[tokio::test]
async fn healthy_run_raises_nothing() {
    let setup = TestEngine::with_alarms(quiet_thresholds());
    setup.submit_paused(1, 1e4, None).await;

    setup.run_slots(2).await;

    assert!(setup.sink.alarms().is_empty());
}
