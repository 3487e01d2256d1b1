//! Key placement: maps a key to its ordered replica set.
//!
//! The hash must be bit-identical on every node, so it is the classic
//! 31-multiplier string hash over the key's UTF-8 bytes (the same function
//! heterogeneous clients compute), sign-masked to 31 bits. Replicas are the
//! `from` consecutive nodes on the ring starting at `hash mod N`.

use crate::topology::Topology;

/// 31-multiplier hash over the key's UTF-8 bytes, wrapping in `i32`.
pub fn key_hash(key: &str) -> i32 {
    key.bytes()
        .fold(0i32, |hash, byte| {
            hash.wrapping_mul(31).wrapping_add(i32::from(byte))
        })
}

/// The ordered replica set for `key`: `from` consecutive nodes starting at
/// the key's home position. `from` must be `1..=topology.len()`.
pub fn replicas<'a>(topology: &'a Topology, key: &str, from: usize) -> Vec<&'a str> {
    let n = topology.len();
    let start = (key_hash(key) & 0x7FFF_FFFF) as usize % n;
    (0..from)
        .map(|i| topology.nodes()[(start + i) % n].as_str())
        .collect()
}

/// The single owning node of `key` (the degenerate non-replicated mapping).
pub fn owner<'a>(topology: &'a Topology, key: &str) -> &'a str {
    let n = topology.len();
    let start = (key_hash(key) & 0x7FFF_FFFF) as usize % n;
    topology.nodes()[start].as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology(n: usize) -> Topology {
        let peers = (0..n).map(|i| format!("http://10.0.0.{i}:8080")).collect();
        Topology::new(peers, "http://10.0.0.0:8080").unwrap()
    }

    #[test]
    fn test_key_hash_reference_values() {
        // Reference values of the 31-multiplier string hash.
        assert_eq!(key_hash(""), 0);
        assert_eq!(key_hash("a"), 97);
        assert_eq!(key_hash("ab"), 97 * 31 + 98);
        assert_eq!(key_hash("hello"), 99_162_322);
        assert_eq!(key_hash("polynomial rolling hash"), -746_062_891);
    }

    #[test]
    fn test_key_hash_deterministic() {
        assert_eq!(key_hash("some-key"), key_hash("some-key"));
        assert_ne!(key_hash("key-a"), key_hash("key-b"));
    }

    #[test]
    fn test_replicas_are_consecutive_on_the_ring() {
        let topology = topology(5);
        let replicas = replicas(&topology, "k1", 3);
        assert_eq!(replicas.len(), 3);

        let nodes = topology.nodes();
        let start = nodes.iter().position(|n| n == replicas[0]).unwrap();
        for (i, replica) in replicas.iter().enumerate() {
            assert_eq!(*replica, nodes[(start + i) % nodes.len()]);
        }
    }

    #[test]
    fn test_replicas_wrap_around() {
        let topology = topology(3);
        let all = replicas(&topology, "any", 3);
        // Full replication touches every node exactly once.
        let mut sorted: Vec<&str> = all.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn test_placement_deterministic_across_instances() {
        let a = topology(5);
        let b = topology(5);
        for key in ["alpha", "beta", "gamma", "delta"] {
            assert_eq!(replicas(&a, key, 3), replicas(&b, key, 3));
        }
    }

    #[test]
    fn test_owner_is_first_replica() {
        let topology = topology(4);
        for key in ["x", "y", "z"] {
            assert_eq!(owner(&topology, key), replicas(&topology, key, 4)[0]);
        }
    }

    #[test]
    fn test_negative_hash_is_masked() {
        // This key hashes negative; placement must still land in range.
        let key = "polynomial rolling hash";
        assert!(key_hash(key) < 0);
        let topology = topology(3);
        let replicas = replicas(&topology, key, 2);
        assert_eq!(replicas.len(), 2);
    }
}
