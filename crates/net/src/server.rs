//! HTTP/1.1 front: request dispatch and range streaming.
//!
//! Routes:
//! - `GET /v0/status` — liveness probe
//! - `GET|PUT|DELETE /v0/entity?id=K[&replicas=A/F]` — coordinated entity ops
//! - `GET /v0/entities?start=S[&end=E]` — chunked ordered range scan,
//!   one `key LF value` chunk per visible record
//! - `GET /v0/compact` — best-effort local compaction
//!
//! The dispatcher validates parameters, derives the proxy flag from the
//! `X-OK-Proxy` header, parses the RF pair and hands off to the
//! coordinator. Exactly one response per accepted request.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method as HttpMethod, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use okv_replication::coordinator::{Coordinator, EntityRequest, Method, Reply};
use okv_replication::replica_client::{ReplicaClient, PROXY_HEADER};
use okv_replication::rf::Rf;
use okv_replication::topology::Topology;
use okv_storage::engine::Engine;
use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;

type HttpBody = BoxBody<Bytes, Infallible>;

/// Everything a request handler needs, shared across connections.
pub struct NodeState<C: ReplicaClient> {
    pub coordinator: Coordinator<C>,
    pub engine: Engine,
    pub topology: Arc<Topology>,
}

impl<C: ReplicaClient> std::fmt::Debug for NodeState<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState").finish_non_exhaustive()
    }
}

/// Accept loop: one spawned HTTP/1.1 connection per client socket.
pub async fn serve<C: ReplicaClient>(
    listener: TcpListener,
    state: Arc<NodeState<C>>,
) -> io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |request| handle(state.clone(), request));
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!("connection error: {err}");
            }
        });
    }
}

async fn handle<C: ReplicaClient>(
    state: Arc<NodeState<C>>,
    request: Request<Incoming>,
) -> Result<Response<HttpBody>, Infallible> {
    let (parts, body) = request.into_parts();
    let response = match parts.uri.path() {
        "/v0/status" => status(&parts),
        "/v0/entity" => entity(&state, &parts, body).await,
        "/v0/entities" => entities(&state, &parts).await,
        "/v0/compact" => compact(&state, &parts),
        _ => empty(StatusCode::BAD_REQUEST),
    };
    Ok(response)
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

fn status(parts: &Parts) -> Response<HttpBody> {
    if parts.method != HttpMethod::GET {
        return empty(StatusCode::METHOD_NOT_ALLOWED);
    }
    with_body(StatusCode::OK, Bytes::from_static(b"OK"))
}

async fn entity<C: ReplicaClient>(
    state: &NodeState<C>,
    parts: &Parts,
    body: Incoming,
) -> Response<HttpBody> {
    let params = query_params(parts.uri.query());
    let Some(id) = params.get("id").filter(|id| !id.is_empty()) else {
        return empty(StatusCode::BAD_REQUEST);
    };

    let rf = match Rf::parse(params.get("replicas").map(String::as_str), state.topology.len()) {
        Ok(rf) => rf,
        Err(err) => {
            tracing::debug!(%err, "rejecting request with bad replication factor");
            return empty(StatusCode::BAD_REQUEST);
        }
    };
    let proxied = parts.headers.contains_key(PROXY_HEADER);

    let metrics = okv_metrics::metrics();
    if proxied {
        metrics.replica_requests_received.inc();
    }
    let (method, op) = match parts.method {
        HttpMethod::GET => (Method::Get, "get"),
        HttpMethod::PUT => (Method::Put, "put"),
        HttpMethod::DELETE => (Method::Delete, "delete"),
        _ => return empty(StatusCode::METHOD_NOT_ALLOWED),
    };
    match method {
        Method::Get => metrics.entity_gets.inc(),
        Method::Put => metrics.entity_puts.inc(),
        Method::Delete => metrics.entity_deletes.inc(),
    }
    let _timer = okv_metrics::start_entity_timer(op);

    let value = if method == Method::Put {
        match body.collect().await {
            Ok(collected) => collected.to_bytes().to_vec(),
            Err(err) => {
                tracing::debug!(%err, "failed to read request body");
                return empty(StatusCode::BAD_REQUEST);
            }
        }
    } else {
        Vec::new()
    };

    let reply = state
        .coordinator
        .coordinate(EntityRequest {
            method,
            key: id.clone(),
            body: value,
            rf,
            proxied,
        })
        .await;
    reply_to_response(reply)
}

async fn entities<C: ReplicaClient>(state: &NodeState<C>, parts: &Parts) -> Response<HttpBody> {
    if parts.method != HttpMethod::GET {
        return empty(StatusCode::METHOD_NOT_ALLOWED);
    }
    let params = query_params(parts.uri.query());
    let Some(start) = params.get("start").filter(|start| !start.is_empty()) else {
        return empty(StatusCode::BAD_REQUEST);
    };
    let start = start.clone();
    let end = params.get("end").filter(|end| !end.is_empty()).cloned();

    // Materialise the snapshot off the async path; the iterator must not
    // observe writes that land mid-stream.
    let engine = state.engine.clone();
    let rows = tokio::task::spawn_blocking(move || {
        engine.visible_range(start.as_bytes(), end.as_deref().map(str::as_bytes))
    })
    .await;

    let rows = match rows {
        Ok(Ok(rows)) => rows,
        Ok(Err(err)) => {
            tracing::error!(%err, "range scan failed");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
        Err(err) => {
            tracing::error!(%err, "range scan task failed");
            return empty(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let frames = rows.into_iter().map(|(key, value)| {
        let mut chunk = Vec::with_capacity(key.len() + 1 + value.len());
        chunk.extend_from_slice(&key);
        chunk.push(b'\n');
        chunk.extend_from_slice(&value);
        Ok::<_, Infallible>(Frame::data(Bytes::from(chunk)))
    });
    let body = StreamBody::new(futures::stream::iter(frames)).boxed();
    response_with(StatusCode::OK, body)
}

fn compact<C: ReplicaClient>(state: &NodeState<C>, parts: &Parts) -> Response<HttpBody> {
    if parts.method != HttpMethod::GET {
        return empty(StatusCode::METHOD_NOT_ALLOWED);
    }
    match state.engine.compact() {
        Ok(()) => with_body(StatusCode::OK, Bytes::from_static(b"OK")),
        Err(err) => {
            tracing::error!(%err, "compaction failed");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

fn reply_to_response(reply: Reply) -> Response<HttpBody> {
    match reply {
        Reply::Value(body) | Reply::Record(body) => with_body(StatusCode::OK, Bytes::from(body)),
        Reply::Tombstone(body) => with_body(StatusCode::NOT_FOUND, Bytes::from(body)),
        Reply::Absent => empty(StatusCode::NOT_FOUND),
        Reply::Created => empty(StatusCode::CREATED),
        Reply::Accepted => empty(StatusCode::ACCEPTED),
        Reply::QuorumFailed => empty(StatusCode::GATEWAY_TIMEOUT),
        Reply::Internal(message) => {
            tracing::error!(%message, "local operation failed");
            empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn empty(status: StatusCode) -> Response<HttpBody> {
    with_body(status, Bytes::new())
}

fn with_body(status: StatusCode, body: Bytes) -> Response<HttpBody> {
    response_with(status, Full::new(body).boxed())
}

fn response_with(status: StatusCode, body: HttpBody) -> Response<HttpBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

// ---------------------------------------------------------------------------
// Query parsing
// ---------------------------------------------------------------------------

fn query_params(query: Option<&str>) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let Some(query) = query else {
        return params;
    };
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(percent_decode(name), percent_decode(value));
    }
    params
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let escaped = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match escaped {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
