//! HTTP networking layer for okv.
//!
//! Provides:
//! - `HttpReplicaClient`: implements `ReplicaClient` over reqwest for
//!   coordinator-to-peer sub-requests
//! - `NodeState` + `serve`: the hyper HTTP/1.1 front serving `/v0/status`,
//!   `/v0/entity`, `/v0/entities` and `/v0/compact`

pub mod client;
pub mod server;

pub use client::HttpReplicaClient;
pub use server::{serve, NodeState};
