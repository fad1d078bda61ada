//! Device topology and all-pairs path cache.
//!
//! Built once at startup from the repository's node and link records and
//! immutable afterwards, so the scheduling loop shares it without locks.
//! Edge weights are inverse link bandwidth (a delay proxy); shortest paths
//! between every pair of comm devices are pre-computed with Floyd–Warshall
//! and cached together with per-hop rates and transmit powers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::physics;

/// Device kind as stored by the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Task-generating user device.
    #[serde(rename = "user_equipment")]
    User,
    /// Compute/relay device (base station, UAV).
    #[serde(rename = "base_station")]
    Comm,
}

/// Node record as returned by the persistence repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Device id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Device kind.
    pub kind: NodeKind,
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
}

/// Link record as returned by the persistence repository.
///
/// Carries a free-form property bag; `bandwidth` (bits/s) and `power` (W)
/// are the properties the engine reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Source device id.
    pub src_id: u64,
    /// Destination device id.
    pub dst_id: u64,
    /// Free-form link properties.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl LinkRecord {
    /// Creates a link with an empty property bag.
    #[must_use]
    pub fn new(src_id: u64, dst_id: u64) -> Self {
        Self {
            src_id,
            dst_id,
            properties: serde_json::Map::new(),
        }
    }

    /// Sets the `bandwidth` property in bits/s.
    #[must_use]
    pub fn with_bandwidth(mut self, bits_per_s: f64) -> Self {
        self.properties
            .insert("bandwidth".to_owned(), bits_per_s.into());
        self
    }

    /// Sets the `power` property in watts.
    #[must_use]
    pub fn with_power(mut self, watts: f64) -> Self {
        self.properties.insert("power".to_owned(), watts.into());
        self
    }

    /// Link bandwidth in bits/s, if present and positive.
    #[must_use]
    pub fn bandwidth(&self) -> Option<f64> {
        self.properties
            .get("bandwidth")
            .and_then(serde_json::Value::as_f64)
            .filter(|b| *b > 0.0)
    }

    /// Link transmit power in watts, if present and positive.
    #[must_use]
    pub fn power(&self) -> Option<f64> {
        self.properties
            .get("power")
            .and_then(serde_json::Value::as_f64)
            .filter(|p| *p > 0.0)
    }
}

/// A user device with its cached uplink.
#[derive(Debug, Clone)]
pub struct UserDevice {
    /// Device id.
    pub id: u64,
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
    /// Id of the nearest comm device.
    pub nearest_comm_id: u64,
    /// Shannon rate of the user-to-nearest-comm segment in bits/s.
    pub uplink_rate: f64,
}

/// A compute/relay device.
#[derive(Debug, Clone)]
pub struct CommDevice {
    /// Device id.
    pub id: u64,
    /// X coordinate in metres.
    pub x: f64,
    /// Y coordinate in metres.
    pub y: f64,
}

/// A pre-computed multi-hop route between two comm devices.
///
/// `path` holds comm device ids only. `speeds` and `powers` have one entry
/// per hop of the eventual user-to-destination route: index 0 is reserved
/// for the user-to-first-comm segment and is filled per task at schedule
/// time; indices 1.. describe the comm-to-comm hops.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPath {
    /// Comm device ids from the entry comm to the destination comm.
    pub path: Vec<u64>,
    /// Per-hop rates in bits/s.
    pub speeds: Vec<f64>,
    /// Per-hop transmit powers in W.
    pub powers: Vec<f64>,
}

/// Immutable device graph with the all-pairs comm path cache.
#[derive(Debug)]
pub struct Topology {
    users: HashMap<u64, UserDevice>,
    comms: HashMap<u64, CommDevice>,
    comm_paths: HashMap<(u64, u64), TransferPath>,
}

impl Topology {
    /// Builds the topology from repository records.
    ///
    /// Fails with [`EngineError::NotInitialized`] when no devices (or no
    /// comm devices) are available; scheduling is meaningless without them.
    pub fn build(nodes: &[NodeRecord], links: &[LinkRecord]) -> Result<Self> {
        if nodes.is_empty() {
            return Err(EngineError::NotInitialized);
        }

        let mut users = HashMap::new();
        let mut comms = HashMap::new();
        for node in nodes {
            match node.kind {
                NodeKind::User => {
                    users.insert(
                        node.id,
                        UserDevice {
                            id: node.id,
                            x: node.x,
                            y: node.y,
                            nearest_comm_id: 0,
                            uplink_rate: 0.0,
                        },
                    );
                }
                NodeKind::Comm => {
                    comms.insert(
                        node.id,
                        CommDevice {
                            id: node.id,
                            x: node.x,
                            y: node.y,
                        },
                    );
                }
            }
        }

        if comms.is_empty() {
            return Err(EngineError::NotInitialized);
        }

        // Cache each user's nearest comm and the uplink rate to it. A user
        // beyond the coverage radius of every comm keeps a zero uplink and
        // never receives a route.
        for user in users.values_mut() {
            let mut best_dist = f64::INFINITY;
            for comm in comms.values() {
                let d = physics::distance(user.x, user.y, comm.x, comm.y);
                if d < best_dist {
                    best_dist = d;
                    user.nearest_comm_id = comm.id;
                    user.uplink_rate = if d <= physics::COVERAGE_RADIUS_M {
                        physics::shannon_rate(physics::USER_TX_POWER_W, d)
                    } else {
                        0.0
                    };
                }
            }
        }

        let graph = NodeGraph::build(&users, &comms, links);
        let comm_paths = graph.cache_comm_paths(&comms);

        Ok(Self {
            users,
            comms,
            comm_paths,
        })
    }

    /// The cached route between two comm devices, `None` when unreachable.
    #[must_use]
    pub fn paths(&self, start_comm_id: u64, end_comm_id: u64) -> Option<&TransferPath> {
        self.comm_paths.get(&(start_comm_id, end_comm_id))
    }

    /// Assembles the full per-task route from a user to a destination comm.
    ///
    /// The route enters the mesh at the user's nearest comm; hop 0 carries
    /// the user's uplink rate and transmit power. Returns `None` when the
    /// user is unknown, outside coverage, or the destination is unreachable
    /// from the entry comm.
    #[must_use]
    pub fn task_path(&self, user_id: u64, dest_comm_id: u64) -> Option<TransferPath> {
        let user = self.users.get(&user_id)?;
        if user.uplink_rate <= 0.0 {
            return None;
        }
        let cached = self.paths(user.nearest_comm_id, dest_comm_id)?;

        let mut path = Vec::with_capacity(cached.path.len() + 1);
        path.push(user.id);
        path.extend_from_slice(&cached.path);

        let mut speeds = cached.speeds.clone();
        let mut powers = cached.powers.clone();
        speeds[0] = user.uplink_rate;
        powers[0] = physics::USER_TX_POWER_W;

        Some(TransferPath {
            path,
            speeds,
            powers,
        })
    }

    /// Looks up a user device.
    #[must_use]
    pub fn user(&self, user_id: u64) -> Option<&UserDevice> {
        self.users.get(&user_id)
    }

    /// Returns all comm device ids.
    #[must_use]
    pub fn comm_ids(&self) -> Vec<u64> {
        self.comms.keys().copied().collect()
    }

    /// Number of user devices.
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of comm devices.
    #[must_use]
    pub fn comm_count(&self) -> usize {
        self.comms.len()
    }
}

/// Working graph over all nodes used during the build.
struct NodeGraph {
    ids: Vec<u64>,
    index: HashMap<u64, usize>,
    /// Floyd edge weights (1/bandwidth).
    weights: Vec<Vec<f64>>,
    /// Link rates in bits/s, 0 where no edge exists.
    rates: Vec<Vec<f64>>,
    /// Per-edge transmit power overrides from link properties.
    powers: Vec<Vec<f64>>,
    /// Intermediate vertex of the shortest i-j path, if any.
    via: Vec<Vec<Option<usize>>>,
}

impl NodeGraph {
    fn build(
        users: &HashMap<u64, UserDevice>,
        comms: &HashMap<u64, CommDevice>,
        links: &[LinkRecord],
    ) -> Self {
        let mut ids: Vec<u64> = users.keys().chain(comms.keys()).copied().collect();
        ids.sort_unstable();
        let index: HashMap<u64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let n = ids.len();

        let mut weights = vec![vec![f64::INFINITY; n]; n];
        let mut rates = vec![vec![0.0; n]; n];
        let mut powers = vec![vec![physics::COMM_TX_POWER_W; n]; n];
        for (i, row) in weights.iter_mut().enumerate() {
            row[i] = 0.0;
        }

        // A link without a usable bandwidth never populates an edge weight,
        // so it must not suppress mirroring of its reverse direction.
        let declared: std::collections::HashSet<(u64, u64)> = links
            .iter()
            .filter(|l| l.bandwidth().is_some())
            .map(|l| (l.src_id, l.dst_id))
            .collect();

        for link in links {
            let Some(bandwidth) = link.bandwidth() else {
                continue;
            };
            let (Some(&src), Some(&dst)) = (index.get(&link.src_id), index.get(&link.dst_id))
            else {
                continue;
            };

            weights[src][dst] = 1.0 / bandwidth;
            rates[src][dst] = bandwidth;
            if let Some(power) = link.power() {
                powers[src][dst] = power;
            }

            // Mirror the edge when the reverse direction was not declared
            // and at most one endpoint is a user device.
            let user_endpoints = usize::from(users.contains_key(&link.src_id))
                + usize::from(users.contains_key(&link.dst_id));
            if user_endpoints < 2 && !declared.contains(&(link.dst_id, link.src_id)) {
                weights[dst][src] = 1.0 / bandwidth;
                rates[dst][src] = bandwidth;
                if let Some(power) = link.power() {
                    powers[dst][src] = power;
                }
            }
        }

        let mut graph = Self {
            ids,
            index,
            weights,
            rates,
            powers,
            via: vec![vec![None; n]; n],
        };
        graph.run_floyd();
        graph
    }

    fn run_floyd(&mut self) {
        let n = self.ids.len();
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let relaxed = self.weights[i][k] + self.weights[k][j];
                    if relaxed < self.weights[i][j] {
                        self.weights[i][j] = relaxed;
                        self.via[i][j] = Some(k);
                    }
                }
            }
        }
    }

    /// Recovers the node index sequence of the shortest i-j path, empty
    /// when unreachable.
    fn shortest_path(&self, start: usize, end: usize) -> Vec<usize> {
        match self.via[start][end] {
            None => {
                if self.weights[start][end].is_infinite() {
                    Vec::new()
                } else {
                    vec![start, end]
                }
            }
            Some(mid) => {
                let left = self.shortest_path(start, mid);
                let right = self.shortest_path(mid, end);
                if left.is_empty() || right.is_empty() {
                    return Vec::new();
                }
                let mut path = left;
                path.extend_from_slice(&right[1..]);
                path
            }
        }
    }

    fn cache_comm_paths(&self, comms: &HashMap<u64, CommDevice>) -> HashMap<(u64, u64), TransferPath> {
        let mut cache = HashMap::new();

        for &start in comms.keys() {
            for &end in comms.keys() {
                let route = if start == end {
                    vec![self.index[&start]]
                } else {
                    let route = self.shortest_path(self.index[&start], self.index[&end]);
                    if route.is_empty() {
                        continue;
                    }
                    route
                };

                let path: Vec<u64> = route.iter().map(|&i| self.ids[i]).collect();

                // Hop 0 is the user segment, filled at schedule time.
                let mut speeds = vec![0.0; path.len()];
                let mut powers = vec![0.0; path.len()];
                for hop in 1..route.len() {
                    let (prev, curr) = (route[hop - 1], route[hop]);
                    speeds[hop] = self.rates[prev][curr];
                    powers[hop] = self.powers[prev][curr];
                }

                cache.insert(
                    (start, end),
                    TransferPath {
                        path,
                        speeds,
                        powers,
                    },
                );
            }
        }

        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: u64, x: f64, y: f64) -> NodeRecord {
        NodeRecord {
            id,
            name: format!("ue-{id}"),
            kind: NodeKind::User,
            x,
            y,
        }
    }

    fn comm(id: u64, x: f64, y: f64) -> NodeRecord {
        NodeRecord {
            id,
            name: format!("bs-{id}"),
            kind: NodeKind::Comm,
            x,
            y,
        }
    }

    #[test]
    fn empty_device_set_fails() {
        assert!(matches!(
            Topology::build(&[], &[]),
            Err(EngineError::NotInitialized)
        ));
    }

    #[test]
    fn users_without_comms_fail() {
        let nodes = vec![user(1, 0.0, 0.0)];
        assert!(matches!(
            Topology::build(&nodes, &[]),
            Err(EngineError::NotInitialized)
        ));
    }

    #[test]
    fn nearest_comm_and_uplink_cached() {
        let nodes = vec![user(1, 0.0, 0.0), comm(10, 10.0, 0.0), comm(11, 200.0, 0.0)];
        let topo = Topology::build(&nodes, &[]).unwrap();

        let u = topo.user(1).unwrap();
        assert_eq!(u.nearest_comm_id, 10);
        assert!(u.uplink_rate > 0.0);
    }

    #[test]
    fn direct_link_yields_two_node_path() {
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 100.0, 0.0)];
        let links = vec![LinkRecord::new(10, 11).with_bandwidth(1e6)];
        let topo = Topology::build(&nodes, &links).unwrap();

        let path = topo.paths(10, 11).unwrap();
        assert_eq!(path.path, vec![10, 11]);
        assert_eq!(path.speeds.len(), 2);
        assert!((path.speeds[1] - 1e6).abs() < f64::EPSILON);
        assert!((path.powers[1] - physics::COMM_TX_POWER_W).abs() < f64::EPSILON);
    }

    #[test]
    fn undeclared_reverse_is_mirrored() {
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 100.0, 0.0)];
        let links = vec![LinkRecord::new(10, 11).with_bandwidth(1e6)];
        let topo = Topology::build(&nodes, &links).unwrap();

        let reverse = topo.paths(11, 10).unwrap();
        assert_eq!(reverse.path, vec![11, 10]);
    }

    #[test]
    fn reverse_link_without_bandwidth_still_mirrors() {
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 100.0, 0.0)];
        // The declared reverse carries no bandwidth, so it populates no
        // edge and must not block the mirror.
        let links = vec![
            LinkRecord::new(10, 11).with_bandwidth(1e6),
            LinkRecord::new(11, 10),
        ];
        let topo = Topology::build(&nodes, &links).unwrap();

        let reverse = topo.paths(11, 10).unwrap();
        assert_eq!(reverse.path, vec![11, 10]);
        assert!((reverse.speeds[1] - 1e6).abs() < f64::EPSILON);
    }

    #[test]
    fn declared_asymmetric_pair_is_kept() {
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 100.0, 0.0)];
        let links = vec![
            LinkRecord::new(10, 11).with_bandwidth(1e6),
            LinkRecord::new(11, 10).with_bandwidth(2e6),
        ];
        let topo = Topology::build(&nodes, &links).unwrap();

        assert!((topo.paths(10, 11).unwrap().speeds[1] - 1e6).abs() < f64::EPSILON);
        assert!((topo.paths(11, 10).unwrap().speeds[1] - 2e6).abs() < f64::EPSILON);
    }

    #[test]
    fn floyd_routes_through_faster_relay() {
        // Direct 10-12 link is slow; relaying through 11 is faster.
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 50.0, 0.0), comm(12, 100.0, 0.0)];
        let links = vec![
            LinkRecord::new(10, 12).with_bandwidth(1e3),
            LinkRecord::new(10, 11).with_bandwidth(1e8),
            LinkRecord::new(11, 12).with_bandwidth(1e8),
        ];
        let topo = Topology::build(&nodes, &links).unwrap();

        let path = topo.paths(10, 12).unwrap();
        assert_eq!(path.path, vec![10, 11, 12]);
        assert_eq!(path.speeds.len(), 3);
    }

    #[test]
    fn unreachable_pair_has_no_path() {
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 100.0, 0.0)];
        let topo = Topology::build(&nodes, &[]).unwrap();
        assert!(topo.paths(10, 11).is_none());
    }

    #[test]
    fn link_power_overrides_default() {
        let nodes = vec![comm(10, 0.0, 0.0), comm(11, 100.0, 0.0)];
        let links = vec![LinkRecord::new(10, 11).with_bandwidth(1e6).with_power(3.5)];
        let topo = Topology::build(&nodes, &links).unwrap();

        assert!((topo.paths(10, 11).unwrap().powers[1] - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn task_path_fills_the_user_hop() {
        let nodes = vec![user(1, 0.0, 0.0), comm(10, 10.0, 0.0), comm(11, 100.0, 0.0)];
        let links = vec![LinkRecord::new(10, 11).with_bandwidth(1e6)];
        let topo = Topology::build(&nodes, &links).unwrap();

        let route = topo.task_path(1, 11).unwrap();
        assert_eq!(route.path, vec![1, 10, 11]);
        assert_eq!(route.speeds.len(), 2);
        assert!((route.speeds[0] - topo.user(1).unwrap().uplink_rate).abs() < f64::EPSILON);
        assert!((route.powers[0] - physics::USER_TX_POWER_W).abs() < f64::EPSILON);
    }

    #[test]
    fn task_path_to_entry_comm_is_single_hop() {
        let nodes = vec![user(1, 0.0, 0.0), comm(10, 10.0, 0.0)];
        let topo = Topology::build(&nodes, &[]).unwrap();

        let route = topo.task_path(1, 10).unwrap();
        assert_eq!(route.path, vec![1, 10]);
        assert_eq!(route.speeds.len(), 1);
    }

    #[test]
    fn task_path_for_unknown_user_is_none() {
        let nodes = vec![comm(10, 0.0, 0.0)];
        let topo = Topology::build(&nodes, &[]).unwrap();
        assert!(topo.task_path(99, 10).is_none());
    }

    #[test]
    fn out_of_coverage_user_has_no_route() {
        let nodes = vec![user(1, 0.0, 0.0), comm(10, 500.0, 0.0)];
        let topo = Topology::build(&nodes, &[]).unwrap();

        assert_eq!(topo.user(1).unwrap().uplink_rate, 0.0);
        assert!(topo.task_path(1, 10).is_none());
    }
}
