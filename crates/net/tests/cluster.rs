//! Integration tests: spin up real HTTP nodes and exercise the entity
//! surface across replica sets, including dead peers and proxied writes.

use okv_net::{serve, HttpReplicaClient, NodeState};
use okv_replication::{Coordinator, Topology};
use okv_storage::engine::Engine;
use okv_storage::record::TimestampRecord;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct TestCluster {
    endpoints: Vec<String>,
    _dirs: Vec<TempDir>,
    client: reqwest::Client,
}

impl TestCluster {
    fn entity_url(&self, node: usize, key: &str) -> String {
        format!("{}/v0/entity?id={key}", self.endpoints[node])
    }

    fn entity_url_rf(&self, node: usize, key: &str, rf: &str) -> String {
        format!("{}/v0/entity?id={key}&replicas={rf}", self.endpoints[node])
    }
}

/// Bind `live.len()` listeners up front so the full topology is known,
/// then start nodes only on the live ones. Dead endpoints refuse
/// connections, which is exactly what a killed peer looks like.
async fn spawn_cluster(live: &[bool]) -> TestCluster {
    let mut listeners = Vec::new();
    for _ in live {
        listeners.push(tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let endpoints: Vec<String> = listeners
        .iter()
        .map(|listener| format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port()))
        .collect();

    let mut dirs = Vec::new();
    for (i, listener) in listeners.into_iter().enumerate() {
        if !live[i] {
            continue;
        }
        let dir = TempDir::new().unwrap();
        let topology = Arc::new(Topology::new(endpoints.clone(), &endpoints[i]).unwrap());
        let engine = Engine::open(dir.path()).unwrap();
        let client = Arc::new(HttpReplicaClient::new(&topology).unwrap());
        let coordinator = Coordinator::new(topology.clone(), engine.clone(), client);
        let state = Arc::new(NodeState {
            coordinator,
            engine,
            topology,
        });
        tokio::spawn(async move {
            let _ = serve(listener, state).await;
        });
        dirs.push(dir);
    }

    TestCluster {
        endpoints,
        _dirs: dirs,
        client: reqwest::Client::new(),
    }
}

// ---------------------------------------------------------------------------
// Single node
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_status() {
    let cluster = spawn_cluster(&[true]).await;

    let response = cluster
        .client
        .get(format!("{}/v0/status", cluster.endpoints[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_node_lifecycle() {
    let cluster = spawn_cluster(&[true]).await;

    let response = cluster
        .client
        .put(cluster.entity_url(0, "k1"))
        .body("v1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = cluster
        .client
        .get(cluster.entity_url(0, "k1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"v1");

    let response = cluster
        .client
        .delete(cluster.entity_url(0, "k1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);

    let response = cluster
        .client
        .get(cluster.entity_url(0, "k1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bad_requests() {
    let cluster = spawn_cluster(&[true]).await;
    let base = &cluster.endpoints[0];

    // Missing and empty id.
    for url in [format!("{base}/v0/entity"), format!("{base}/v0/entity?id=")] {
        let response = cluster.client.get(url).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    // Unknown path.
    let response = cluster
        .client
        .get(format!("{base}/v0/nowhere"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Unsupported entity method.
    let response = cluster
        .client
        .post(cluster.entity_url(0, "k"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);

    // Malformed and out-of-range RF.
    for rf in ["2", "a/b", "0/1", "2/1", "1/2"] {
        let response = cluster
            .client
            .get(cluster.entity_url_rf(0, "k", rf))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400, "rf={rf}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_proxied_get_carries_encoded_record() {
    let cluster = spawn_cluster(&[true]).await;

    cluster
        .client
        .put(cluster.entity_url(0, "k"))
        .body("payload")
        .send()
        .await
        .unwrap();

    let response = cluster
        .client
        .get(cluster.entity_url(0, "k"))
        .header("X-OK-Proxy", "True")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body = response.bytes().await.unwrap();
    let record = TimestampRecord::decode(&body).unwrap();
    assert!(record.is_value());
    assert!(record.timestamp() > 0);
    assert_eq!(record.value_bytes(), b"payload");

    // Deleted keys answer a proxied GET with the encoded tombstone.
    cluster
        .client
        .delete(cluster.entity_url(0, "k"))
        .send()
        .await
        .unwrap();
    let response = cluster
        .client
        .get(cluster.entity_url(0, "k"))
        .header("X-OK-Proxy", "True")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body = response.bytes().await.unwrap();
    let record = TimestampRecord::decode(&body).unwrap();
    assert!(record.is_deleted());
}

// ---------------------------------------------------------------------------
// Replicated clusters
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quorum_survives_one_dead_peer() {
    let cluster = spawn_cluster(&[true, true, false]).await;

    let response = cluster
        .client
        .put(cluster.entity_url_rf(0, "a", "2/3"))
        .body("1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = cluster
        .client
        .get(cluster.entity_url_rf(1, "a", "2/3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_quorum_fails_with_two_dead_peers() {
    let cluster = spawn_cluster(&[true, false, false]).await;

    let response = cluster
        .client
        .put(cluster.entity_url_rf(0, "a", "2/3"))
        .body("1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 504);

    let response = cluster
        .client
        .get(cluster.entity_url_rf(0, "a", "2/3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 504);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_default_rf_is_majority() {
    let cluster = spawn_cluster(&[true, true, false]).await;

    // Two of three nodes alive: the 2/3 default succeeds.
    let response = cluster
        .client
        .put(cluster.entity_url(0, "maj"))
        .body("ok")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = cluster
        .client
        .get(cluster.entity_url(1, "maj"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_newer_direct_write_wins_full_quorum_read() {
    let cluster = spawn_cluster(&[true, true, true]).await;

    // Replicate X everywhere.
    let response = cluster
        .client
        .put(cluster.entity_url_rf(0, "k", "3/3"))
        .body("X")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // Let the clock advance, then write Y to a single node via the proxy
    // header: only that node's store sees it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let response = cluster
        .client
        .put(cluster.entity_url(1, "k"))
        .header("X-OK-Proxy", "True")
        .body("Y")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // A full-quorum read from any node must surface the newer Y.
    let response = cluster
        .client
        .get(cluster.entity_url_rf(2, "k", "3/3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"Y");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_then_put_revives_key() {
    let cluster = spawn_cluster(&[true, true, true]).await;

    for (body, expect) in [(Some("old"), 201u16), (None, 202)] {
        let request = match body {
            Some(body) => cluster.client.put(cluster.entity_url_rf(0, "k", "2/3")).body(body),
            None => cluster.client.delete(cluster.entity_url_rf(0, "k", "2/3")),
        };
        assert_eq!(request.send().await.unwrap().status().as_u16(), expect);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The tombstone wins for now.
    let response = cluster
        .client
        .get(cluster.entity_url_rf(1, "k", "2/3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // A newer PUT revives the key past the tombstone.
    let response = cluster
        .client
        .put(cluster.entity_url_rf(1, "k", "2/3"))
        .body("Z")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = cluster
        .client
        .get(cluster.entity_url_rf(2, "k", "2/3"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"Z");
}

// ---------------------------------------------------------------------------
// Range streaming
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_entities_streams_ordered_range() {
    let cluster = spawn_cluster(&[true]).await;

    for key in ["a", "aa", "ab", "ac", "b", "c", "cc", "d"] {
        let response = cluster
            .client
            .put(cluster.entity_url(0, key))
            .body(format!("v{key}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
    }

    let response = cluster
        .client
        .get(format!(
            "{}/v0/entities?start=aa&end=cc",
            cluster.endpoints[0]
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let expected: Vec<u8> = ["aa", "ab", "ac", "b", "c"]
        .iter()
        .flat_map(|key| {
            let mut chunk = key.as_bytes().to_vec();
            chunk.push(b'\n');
            chunk.extend_from_slice(format!("v{key}").as_bytes());
            chunk
        })
        .collect();
    assert_eq!(response.bytes().await.unwrap().as_ref(), &expected[..]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_entities_hides_deleted_keys_and_validates() {
    let cluster = spawn_cluster(&[true]).await;
    let base = &cluster.endpoints[0];

    for key in ["p", "q", "r"] {
        cluster
            .client
            .put(cluster.entity_url(0, key))
            .body(key.to_string())
            .send()
            .await
            .unwrap();
    }
    cluster
        .client
        .delete(cluster.entity_url(0, "q"))
        .send()
        .await
        .unwrap();

    let response = cluster
        .client
        .get(format!("{base}/v0/entities?start=p"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    // q is tombstoned and must not appear.
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"p\npr\nr" as &[u8]);

    // Missing start is rejected; wrong method is rejected.
    let response = cluster
        .client
        .get(format!("{base}/v0/entities"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = cluster
        .client
        .post(format!("{base}/v0/entities?start=a"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 405);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_compact_endpoint() {
    let cluster = spawn_cluster(&[true]).await;

    cluster
        .client
        .put(cluster.entity_url(0, "c1"))
        .body("x")
        .send()
        .await
        .unwrap();

    let response = cluster
        .client
        .get(format!("{}/v0/compact", cluster.endpoints[0]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Data survives compaction.
    let response = cluster
        .client
        .get(cluster.entity_url(0, "c1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
