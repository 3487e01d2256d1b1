//! Quorum coordinator: converts one parsed entity request into one reply.
//!
//! The coordinator:
//! 1. Maps the key to its `from` consecutive replicas (via placement)
//! 2. Dispatches local and remote sub-requests concurrently
//! 3. Awaits them all — no cancellation, no retry, per-peer deadlines live
//!    in the transport
//! 4. Tallies acks per method and, for GET, merges the replica answers
//!    last-writer-wins
//!
//! A request carrying the proxy header is another coordinator asking for
//! this node's local opinion only: the replica set collapses to `[self]`
//! and GET answers carry the encoded record so the caller can re-merge.

use crate::placement;
use crate::replica_client::{PeerResponse, ReplicaClient, ReplicaError};
use crate::rf::Rf;
use crate::topology::Topology;
use futures::future;
use okv_storage::engine::{Engine, EngineError};
use okv_storage::record::{merge, TimestampRecord};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Method of an entity request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Delete,
}

/// A parsed client entity request, ready for coordination.
#[derive(Debug, Clone)]
pub struct EntityRequest {
    pub method: Method,
    pub key: String,
    /// PUT value; empty for GET and DELETE.
    pub body: Vec<u8>,
    pub rf: Rf,
    pub proxied: bool,
}

/// The single reply a coordinated request produces. The HTTP front maps
/// each variant onto a status code and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 200 with the raw client bytes.
    Value(Vec<u8>),
    /// 200 with the encoded record (answer to a proxying peer).
    Record(Vec<u8>),
    /// 404 with the encoded tombstone (answer to a proxying peer).
    Tombstone(Vec<u8>),
    /// 404, empty body.
    Absent,
    /// 201.
    Created,
    /// 202.
    Accepted,
    /// 504: fewer than `ack` replicas acknowledged.
    QuorumFailed,
    /// 500: the local engine failed and no peer could answer instead.
    Internal(String),
}

/// Strictly increasing wall-clock milliseconds.
///
/// Mutations are stamped once, by the coordinator that first received them.
/// Only per-node monotonicity is required; cross-node skew is tolerated by
/// the merge tie-break.
#[derive(Debug, Default)]
pub struct WallClock {
    last: AtomicI64,
}

impl WallClock {
    pub fn now_millis(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let next = wall.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => prev = observed,
            }
        }
    }
}

/// One sub-request's failure: either the local engine or the peer transport.
#[derive(Debug)]
enum SubError {
    Engine(EngineError),
    Transport(ReplicaError),
}

type SubResult = Result<PeerResponse, SubError>;

/// Distributed entity coordinator.
///
/// Generic over `C: ReplicaClient` for testability — real deployments use
/// the HTTP client from `okv-net`; unit tests use mocks.
pub struct Coordinator<C: ReplicaClient> {
    topology: Arc<Topology>,
    engine: Engine,
    client: Arc<C>,
    clock: WallClock,
}

impl<C: ReplicaClient> std::fmt::Debug for Coordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl<C: ReplicaClient> Coordinator<C> {
    pub fn new(topology: Arc<Topology>, engine: Engine, client: Arc<C>) -> Self {
        Self {
            topology,
            engine,
            client,
            clock: WallClock::default(),
        }
    }

    /// Coordinate one entity request end to end.
    pub async fn coordinate(&self, request: EntityRequest) -> Reply {
        match request.method {
            Method::Get => {
                self.coordinate_get(&request.key, request.rf, request.proxied)
                    .await
            }
            Method::Put => {
                self.coordinate_put(&request.key, &request.body, request.rf, request.proxied)
                    .await
            }
            Method::Delete => {
                self.coordinate_delete(&request.key, request.rf, request.proxied)
                    .await
            }
        }
    }

    /// The replica set and ack threshold for a request. A proxied request
    /// is answered by this node alone.
    fn replica_set<'a>(&'a self, key: &str, rf: Rf, proxied: bool) -> (Vec<&'a str>, usize) {
        if proxied {
            (vec![self.topology.local()], 1)
        } else {
            (placement::replicas(&self.topology, key, rf.from), rf.ack)
        }
    }

    // -----------------------------------------------------------------------
    // GET
    // -----------------------------------------------------------------------

    pub async fn coordinate_get(&self, key: &str, rf: Rf, proxied: bool) -> Reply {
        let (replicas, needed) = self.replica_set(key, rf, proxied);
        let sole_replica = replicas.len() == 1;

        let outcomes =
            future::join_all(replicas.iter().map(|node| self.get_one(node, key, rf))).await;

        let mut acks = 0usize;
        let mut answers: Vec<TimestampRecord> = Vec::new();
        let mut local_failure: Option<String> = None;
        for outcome in outcomes {
            match outcome {
                // A received status below 500 acknowledges the sub-request.
                Ok(response) if response.status < 500 => {
                    acks += 1;
                    match TimestampRecord::decode(&response.body) {
                        Ok(record) => answers.push(record),
                        Err(err) => {
                            tracing::warn!(key, %err, "skipping undecodable replica answer");
                        }
                    }
                }
                Ok(response) => {
                    tracing::warn!(key, status = response.status, "replica reported failure");
                }
                Err(SubError::Engine(err)) => {
                    tracing::warn!(key, %err, "local read failed");
                    local_failure = Some(err.to_string());
                }
                Err(SubError::Transport(err)) => {
                    tracing::warn!(key, %err, "replica unreachable");
                }
            }
        }

        if acks < needed {
            return self.quorum_failed(sole_replica, local_failure);
        }

        let merged = merge(answers);
        if merged.is_value() {
            if proxied {
                Reply::Record(merged.encode())
            } else {
                Reply::Value(merged.into_value())
            }
        } else if merged.is_deleted() && proxied {
            Reply::Tombstone(merged.encode())
        } else {
            Reply::Absent
        }
    }

    async fn get_one(&self, node: &str, key: &str, rf: Rf) -> SubResult {
        if self.topology.is_local(node) {
            let record = self
                .engine
                .get_record(key.as_bytes())
                .map_err(SubError::Engine)?;
            Ok(if record.is_absent() {
                PeerResponse::empty(404)
            } else {
                PeerResponse::new(200, record.encode())
            })
        } else {
            okv_metrics::metrics()
                .replica_requests_sent
                .with_label_values(&["get"])
                .inc();
            let _timer = okv_metrics::start_replica_timer("get");
            self.client
                .replica_get(node, key, rf)
                .await
                .map_err(SubError::Transport)
        }
    }

    // -----------------------------------------------------------------------
    // PUT
    // -----------------------------------------------------------------------

    pub async fn coordinate_put(&self, key: &str, value: &[u8], rf: Rf, proxied: bool) -> Reply {
        let (replicas, needed) = self.replica_set(key, rf, proxied);
        let sole_replica = replicas.len() == 1;
        // The mutation is stamped once here; peers receiving the forwarded
        // value stamp it at their own receipt.
        let timestamp = self.clock.now_millis();

        let outcomes = future::join_all(
            replicas
                .iter()
                .map(|node| self.put_one(node, key, value, timestamp, rf)),
        )
        .await;

        self.tally_write(key, outcomes, needed, sole_replica, 201, Reply::Created)
    }

    async fn put_one(
        &self,
        node: &str,
        key: &str,
        value: &[u8],
        timestamp: i64,
        rf: Rf,
    ) -> SubResult {
        if self.topology.is_local(node) {
            self.engine
                .put_record(key.as_bytes(), value, timestamp)
                .map_err(SubError::Engine)?;
            Ok(PeerResponse::empty(201))
        } else {
            okv_metrics::metrics()
                .replica_requests_sent
                .with_label_values(&["put"])
                .inc();
            let _timer = okv_metrics::start_replica_timer("put");
            self.client
                .replica_put(node, key, value, rf)
                .await
                .map_err(SubError::Transport)
        }
    }

    // -----------------------------------------------------------------------
    // DELETE
    // -----------------------------------------------------------------------

    pub async fn coordinate_delete(&self, key: &str, rf: Rf, proxied: bool) -> Reply {
        let (replicas, needed) = self.replica_set(key, rf, proxied);
        let sole_replica = replicas.len() == 1;
        let timestamp = self.clock.now_millis();

        let outcomes = future::join_all(
            replicas
                .iter()
                .map(|node| self.delete_one(node, key, timestamp, rf)),
        )
        .await;

        self.tally_write(key, outcomes, needed, sole_replica, 202, Reply::Accepted)
    }

    async fn delete_one(&self, node: &str, key: &str, timestamp: i64, rf: Rf) -> SubResult {
        if self.topology.is_local(node) {
            self.engine
                .delete_record(key.as_bytes(), timestamp)
                .map_err(SubError::Engine)?;
            Ok(PeerResponse::empty(202))
        } else {
            okv_metrics::metrics()
                .replica_requests_sent
                .with_label_values(&["delete"])
                .inc();
            let _timer = okv_metrics::start_replica_timer("delete");
            self.client
                .replica_delete(node, key, rf)
                .await
                .map_err(SubError::Transport)
        }
    }

    // -----------------------------------------------------------------------
    // Tally
    // -----------------------------------------------------------------------

    /// Count write acks: only the method's exact success status counts.
    fn tally_write(
        &self,
        key: &str,
        outcomes: Vec<SubResult>,
        needed: usize,
        sole_replica: bool,
        ack_status: u16,
        success: Reply,
    ) -> Reply {
        let mut acks = 0usize;
        let mut local_failure: Option<String> = None;
        for outcome in outcomes {
            match outcome {
                Ok(response) if response.status == ack_status => acks += 1,
                Ok(response) => {
                    tracing::warn!(key, status = response.status, "replica rejected write");
                }
                Err(SubError::Engine(err)) => {
                    tracing::warn!(key, %err, "local write failed");
                    local_failure = Some(err.to_string());
                }
                Err(SubError::Transport(err)) => {
                    tracing::warn!(key, %err, "replica unreachable");
                }
            }
        }
        if acks >= needed {
            success
        } else {
            self.quorum_failed(sole_replica, local_failure)
        }
    }

    fn quorum_failed(&self, sole_replica: bool, local_failure: Option<String>) -> Reply {
        if sole_replica {
            // The local node was the only replica: this is a plain local
            // error, not a quorum problem.
            if let Some(message) = local_failure {
                return Reply::Internal(message);
            }
        }
        okv_metrics::metrics().quorum_failures.inc();
        Reply::QuorumFailed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
