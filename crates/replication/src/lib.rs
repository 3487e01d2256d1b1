//! Replication layer for okv.
//!
//! Provides: the static cluster topology, deterministic key placement,
//! tunable ack/from replication factors, and the coordinator that fans
//! entity operations out to replicas and reconciles their answers.

pub mod coordinator;
pub mod placement;
pub mod replica_client;
pub mod rf;
pub mod topology;

pub use coordinator::{Coordinator, EntityRequest, Method, Reply};
pub use replica_client::{PeerResponse, ReplicaClient, ReplicaError, PROXY_HEADER};
pub use rf::Rf;
pub use topology::Topology;
