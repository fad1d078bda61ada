//! Topology sources: where node and link records come from at startup.

use async_trait::async_trait;

use crate::config::TopologySeed;
use crate::error::Result;
use crate::topology::{LinkRecord, NodeRecord};

/// A repository of device and link records, read once at startup.
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Loads all node records.
    async fn load_nodes(&self) -> Result<Vec<NodeRecord>>;

    /// Loads all link records.
    async fn load_links(&self) -> Result<Vec<LinkRecord>>;
}

/// In-memory topology source backed by a declarative seed.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    nodes: Vec<NodeRecord>,
    links: Vec<LinkRecord>,
}

impl StaticSource {
    /// Creates a source over explicit records.
    #[must_use]
    pub fn new(nodes: Vec<NodeRecord>, links: Vec<LinkRecord>) -> Self {
        Self { nodes, links }
    }

    /// Creates a source from a configuration seed.
    #[must_use]
    pub fn from_seed(seed: TopologySeed) -> Self {
        Self {
            nodes: seed.nodes,
            links: seed.links,
        }
    }
}

#[async_trait]
impl TopologySource for StaticSource {
    async fn load_nodes(&self) -> Result<Vec<NodeRecord>> {
        Ok(self.nodes.clone())
    }

    async fn load_links(&self) -> Result<Vec<LinkRecord>> {
        Ok(self.links.clone())
    }
}
