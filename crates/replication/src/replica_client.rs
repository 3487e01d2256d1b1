//! Abstraction over coordinator-to-peer sub-requests.
//!
//! A trait in the domain crate with the HTTP implementation in `okv-net`,
//! so coordinator unit tests can plug in mocks.

use crate::rf::Rf;

/// Header marking an inter-coordinator request. The receiver answers with
/// its local opinion only, and GET answers carry the encoded record.
pub const PROXY_HEADER: &str = "X-OK-Proxy";

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("peer request failed: {0}")]
    RpcFailed(String),
    #[error("peer deadline exceeded")]
    Timeout,
}

/// Status and body of a peer's answer to a sub-request.
#[derive(Debug, Clone)]
pub struct PeerResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PeerResponse {
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }
}

/// Transport for entity sub-requests to a peer coordinator.
#[async_trait::async_trait]
pub trait ReplicaClient: Send + Sync + 'static {
    /// Fetch a peer's local opinion of a key.
    async fn replica_get(
        &self,
        target: &str,
        key: &str,
        rf: Rf,
    ) -> Result<PeerResponse, ReplicaError>;

    /// Forward a value write to a peer; the peer stamps it at receipt.
    async fn replica_put(
        &self,
        target: &str,
        key: &str,
        value: &[u8],
        rf: Rf,
    ) -> Result<PeerResponse, ReplicaError>;

    /// Forward a tombstone write to a peer.
    async fn replica_delete(
        &self,
        target: &str,
        key: &str,
        rf: Rf,
    ) -> Result<PeerResponse, ReplicaError>;
}
