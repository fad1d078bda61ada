//! Topology fixtures for engine integration tests.

use meridian_engine::{LinkRecord, NodeKind, NodeRecord, Topology};

/// Creates a node record.
pub fn node(id: u64, kind: NodeKind, x: f64, y: f64) -> NodeRecord {
    let prefix = match kind {
        NodeKind::User => "ue",
        NodeKind::Comm => "bs",
    };
    NodeRecord {
        id,
        name: format!("{prefix}-{id}"),
        kind,
        x,
        y,
    }
}

/// One user at the origin, one comm 10 m away, linked at 1 Mb/s.
///
/// The uplink is fast enough that a 10⁴-bit task transfers and processes
/// within a single 50 ms slot.
pub fn single_cell() -> Topology {
    let nodes = vec![
        node(1, NodeKind::User, 0.0, 0.0),
        node(10, NodeKind::Comm, 10.0, 0.0),
    ];
    let links = vec![LinkRecord::new(1, 10).with_bandwidth(1e6)];
    Topology::build(&nodes, &links).expect("single-cell topology")
}

/// One user, two meshed comms: the entry comm at 10 m and a second comm
/// reachable over a 1 Mb/s backhaul link.
pub fn two_cell() -> Topology {
    let nodes = vec![
        node(1, NodeKind::User, 0.0, 0.0),
        node(10, NodeKind::Comm, 10.0, 0.0),
        node(11, NodeKind::Comm, 100.0, 0.0),
    ];
    let links = vec![LinkRecord::new(10, 11).with_bandwidth(1e6)];
    Topology::build(&nodes, &links).expect("two-cell topology")
}

/// Two users (one inside coverage, one 600 m out) sharing a single comm.
pub fn coverage_gap() -> Topology {
    let nodes = vec![
        node(1, NodeKind::User, 0.0, 0.0),
        node(2, NodeKind::User, 600.0, 0.0),
        node(10, NodeKind::Comm, 10.0, 0.0),
    ];
    Topology::build(&nodes, &[]).expect("coverage-gap topology")
}
