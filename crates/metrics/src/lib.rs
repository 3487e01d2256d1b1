//! Metrics and tracing setup for okv nodes.
//!
//! Provides a global [`NodeMetrics`] singleton backed by the `prometheus`
//! crate, plus an optional lightweight HTTP server for Prometheus scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber with env-filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

/// Global metrics instance.
static METRICS: OnceLock<NodeMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static NodeMetrics {
    METRICS.get_or_init(NodeMetrics::new)
}

/// All Prometheus metrics for an okv node.
pub struct NodeMetrics {
    pub registry: Registry,

    // ── Entity operation counters ──
    pub entity_gets: IntCounter,
    pub entity_puts: IntCounter,
    pub entity_deletes: IntCounter,

    // ── Entity operation latency ──
    pub entity_latency_secs: HistogramVec,

    // ── Replica fan-out ──
    pub replica_requests_sent: IntCounterVec,
    pub replica_requests_received: IntCounter,
    pub replica_latency_secs: HistogramVec,

    // ── Quorum outcomes ──
    pub quorum_failures: IntCounter,
}

// Manual Debug impl because prometheus types don't derive Debug.
impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for entity/replica latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

impl NodeMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let entity_gets =
            IntCounter::with_opts(Opts::new("okv_entity_gets_total", "Entity GET requests"))
                .expect("entity_gets counter");
        let entity_puts =
            IntCounter::with_opts(Opts::new("okv_entity_puts_total", "Entity PUT requests"))
                .expect("entity_puts counter");
        let entity_deletes = IntCounter::with_opts(Opts::new(
            "okv_entity_deletes_total",
            "Entity DELETE requests",
        ))
        .expect("entity_deletes counter");

        let entity_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "okv_entity_latency_seconds",
                "Entity operation latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["op"],
        )
        .expect("entity_latency_secs histogram");

        let replica_requests_sent = IntCounterVec::new(
            Opts::new(
                "okv_replica_requests_sent_total",
                "Sub-requests forwarded to remote replicas, by op",
            ),
            &["op"],
        )
        .expect("replica_requests_sent counter vec");
        let replica_requests_received = IntCounter::with_opts(Opts::new(
            "okv_replica_requests_received_total",
            "Proxied sub-requests received from peer coordinators",
        ))
        .expect("replica_requests_received counter");

        let replica_latency_secs = HistogramVec::new(
            HistogramOpts::new(
                "okv_replica_latency_seconds",
                "Replica sub-request latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["op"],
        )
        .expect("replica_latency_secs histogram");

        let quorum_failures = IntCounter::with_opts(Opts::new(
            "okv_quorum_failures_total",
            "Requests that failed to reach their ack threshold",
        ))
        .expect("quorum_failures counter");

        registry
            .register(Box::new(entity_gets.clone()))
            .expect("register entity_gets");
        registry
            .register(Box::new(entity_puts.clone()))
            .expect("register entity_puts");
        registry
            .register(Box::new(entity_deletes.clone()))
            .expect("register entity_deletes");
        registry
            .register(Box::new(entity_latency_secs.clone()))
            .expect("register entity_latency_secs");
        registry
            .register(Box::new(replica_requests_sent.clone()))
            .expect("register replica_requests_sent");
        registry
            .register(Box::new(replica_requests_received.clone()))
            .expect("register replica_requests_received");
        registry
            .register(Box::new(replica_latency_secs.clone()))
            .expect("register replica_latency_secs");
        registry
            .register(Box::new(quorum_failures.clone()))
            .expect("register quorum_failures");

        Self {
            registry,
            entity_gets,
            entity_puts,
            entity_deletes,
            entity_latency_secs,
            replica_requests_sent,
            replica_requests_received,
            replica_latency_secs,
            quorum_failures,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&m.registry.gather(), &mut buf)
        .expect("prometheus text encoding");
    String::from_utf8(buf).expect("prometheus output is valid UTF-8")
}

/// Helper: start an entity-operation latency timer. Returns a guard that
/// records elapsed time on drop.
pub fn start_entity_timer(op: &str) -> prometheus::HistogramTimer {
    metrics()
        .entity_latency_secs
        .with_label_values(&[op])
        .start_timer()
}

/// Helper: start a replica sub-request latency timer.
pub fn start_replica_timer(op: &str) -> prometheus::HistogramTimer {
    metrics()
        .replica_latency_secs
        .with_label_values(&[op])
        .start_timer()
}

// ────────────────────────── Metrics HTTP server ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

async fn metrics_handler(
    _req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let body = encode_metrics();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("valid HTTP response"))
}

/// Serve Prometheus metrics on the given address (`GET /metrics`).
///
/// This spawns a lightweight HTTP/1.1 server. Call from a `tokio::spawn`.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::debug!("metrics connection error: {}", e);
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────
