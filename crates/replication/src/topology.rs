//! Static cluster topology: the full peer list and this node's identity.
//!
//! Peers are HTTP origins (`http://host:port`). The list is sorted and
//! deduplicated at construction so that every node derives the identical
//! ring regardless of the ordering in its config file. Immutable for the
//! lifetime of the process.

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("peer list is empty")]
    Empty,
    #[error("advertise endpoint {0:?} is not in the peer list")]
    UnknownSelf(String),
}

#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<String>,
    self_index: usize,
}

impl Topology {
    /// Build a topology from peer endpoints. `advertise` is this node's own
    /// endpoint and must be one of `peers`.
    pub fn new(peers: Vec<String>, advertise: &str) -> Result<Self, TopologyError> {
        let mut nodes = peers;
        nodes.sort();
        nodes.dedup();
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }
        let self_index = nodes
            .iter()
            .position(|node| node == advertise)
            .ok_or_else(|| TopologyError::UnknownSelf(advertise.to_string()))?;
        Ok(Self { nodes, self_index })
    }

    /// Number of nodes in the cluster.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All peer endpoints, in ring order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// This node's own endpoint.
    pub fn local(&self) -> &str {
        &self.nodes[self.self_index]
    }

    /// Whether `endpoint` identifies this node.
    pub fn is_local(&self, endpoint: &str) -> bool {
        self.local() == endpoint
    }
}
