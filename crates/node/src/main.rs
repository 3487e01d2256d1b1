//! okv-node: entry point for a replicated KV node.
//!
//! Loads config, opens the storage engine, wires the topology, replica
//! clients and coordinator, then serves the HTTP front on the configured
//! listen address.

use okv_net::{HttpReplicaClient, NodeState};
use okv_replication::{Coordinator, Topology};
use okv_storage::engine::Engine;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    okv_metrics::init_tracing();

    // Optional first CLI arg: path to the YAML config.
    let config_path = std::env::args().nth(1);
    let config = okv_config::load(config_path.as_deref().map(Path::new))?;

    let engine = Engine::open(&config.data_dir)?;
    let advertise = config.advertise_endpoint();
    let topology = Arc::new(Topology::new(config.peer_endpoints(), &advertise)?);
    tracing::info!(
        cluster = topology.len(),
        "node {} joining cluster {:?}",
        advertise,
        topology.nodes()
    );

    let client = Arc::new(HttpReplicaClient::new(&topology)?);
    let coordinator = Coordinator::new(topology.clone(), engine.clone(), client);
    let state = Arc::new(NodeState {
        coordinator,
        engine: engine.clone(),
        topology,
    });

    if let Some(metrics_port) = config.metrics_port {
        let metrics_addr: std::net::SocketAddr = format!("0.0.0.0:{metrics_port}").parse()?;
        tokio::spawn(async move {
            if let Err(err) = okv_metrics::serve_metrics(metrics_addr).await {
                tracing::warn!("metrics server failed: {err}");
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    tracing::info!("serving HTTP on {}", config.listen);
    tokio::select! {
        result = okv_net::serve(listener, state) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
    }

    engine.close()?;
    Ok(())
}
