//! HTTP client implementing `ReplicaClient`.
//!
//! One reqwest client per remote peer, built once from the topology and
//! shared across requests. Every forwarded request carries the proxy
//! header so the receiver answers with its local opinion only. Deadlines:
//! 100 ms to connect, 5 s per request.

use okv_replication::replica_client::{PeerResponse, ReplicaClient, ReplicaError, PROXY_HEADER};
use okv_replication::rf::Rf;
use okv_replication::topology::Topology;
use std::collections::HashMap;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(100);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// An HTTP-based replica transport.
#[derive(Debug)]
pub struct HttpReplicaClient {
    clients: HashMap<String, reqwest::Client>,
}

impl HttpReplicaClient {
    /// Build one client per remote peer in the topology.
    pub fn new(topology: &Topology) -> reqwest::Result<Self> {
        let mut clients = HashMap::new();
        for peer in topology.nodes() {
            if topology.is_local(peer) {
                continue;
            }
            let client = reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .timeout(REQUEST_TIMEOUT)
                .build()?;
            clients.insert(peer.clone(), client);
        }
        Ok(Self { clients })
    }

    fn client_for(&self, target: &str) -> Result<&reqwest::Client, ReplicaError> {
        self.clients
            .get(target)
            .ok_or_else(|| ReplicaError::RpcFailed(format!("unknown peer {target}")))
    }

    async fn read_response(response: reqwest::Response) -> Result<PeerResponse, ReplicaError> {
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_error)?.to_vec();
        Ok(PeerResponse { status, body })
    }
}

fn map_error(err: reqwest::Error) -> ReplicaError {
    if err.is_timeout() {
        ReplicaError::Timeout
    } else {
        ReplicaError::RpcFailed(err.to_string())
    }
}

#[async_trait::async_trait]
impl ReplicaClient for HttpReplicaClient {
    async fn replica_get(
        &self,
        target: &str,
        key: &str,
        rf: Rf,
    ) -> Result<PeerResponse, ReplicaError> {
        let response = self
            .client_for(target)?
            .get(format!("{target}/v0/entity"))
            .query(&[("id", key), ("replicas", rf.to_string().as_str())])
            .header(PROXY_HEADER, "True")
            .send()
            .await
            .map_err(map_error)?;
        Self::read_response(response).await
    }

    async fn replica_put(
        &self,
        target: &str,
        key: &str,
        value: &[u8],
        rf: Rf,
    ) -> Result<PeerResponse, ReplicaError> {
        let response = self
            .client_for(target)?
            .put(format!("{target}/v0/entity"))
            .query(&[("id", key), ("replicas", rf.to_string().as_str())])
            .header(PROXY_HEADER, "True")
            .body(value.to_vec())
            .send()
            .await
            .map_err(map_error)?;
        Self::read_response(response).await
    }

    async fn replica_delete(
        &self,
        target: &str,
        key: &str,
        rf: Rf,
    ) -> Result<PeerResponse, ReplicaError> {
        let response = self
            .client_for(target)?
            .delete(format!("{target}/v0/entity"))
            .query(&[("id", key), ("replicas", rf.to_string().as_str())])
            .header(PROXY_HEADER, "True")
            .send()
            .await
            .map_err(map_error)?;
        Self::read_response(response).await
    }
}
