//! Deterministic key-to-node shard routing.
//!
//! Routing is a pure function of the key bytes and the configured node list:
//! `fnv1a32(key) % nodes.len()`. No consistent hashing is used — adding or
//! removing a node changes the modulus and reshuffles the entire key space,
//! which is an accepted limitation of this static-partition design.

use anyhow::{ensure, Result};

/// Ordered, fixed list of node base URLs with hash-modulo selection.
pub struct ShardRouter {
    nodes: Vec<String>,
}

impl ShardRouter {
    pub fn new(nodes: Vec<String>) -> Result<Self> {
        ensure!(!nodes.is_empty(), "router requires at least one node");
        Ok(Self { nodes })
    }

    /// Selects the node responsible for `key`. Returns the node's base URL
    /// and the shard index it was derived from.
    pub fn route(&self, key: &str) -> (&str, usize) {
        let index = (fnv1a32(key.as_bytes()) as usize) % self.nodes.len();
        (&self.nodes[index], index)
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }
}

/// FNV-1a hash of a byte slice → u32 shard token.
///
/// Implemented locally so the mapping is stable across processes and
/// platforms; the standard library's hasher is randomly seeded.
fn fnv1a32(data: &[u8]) -> u32 {
    const OFFSET: u32 = 2_166_136_261;
    const PRIME: u32 = 16_777_619;
    let mut h = OFFSET;
    for &b in data {
        h ^= b as u32;
        h = h.wrapping_mul(PRIME);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_nodes() -> ShardRouter {
        ShardRouter::new(vec![
            "http://localhost:8080".into(),
            "http://localhost:8081".into(),
            "http://localhost:8082".into(),
        ])
        .expect("valid node list")
    }

    #[test]
    fn empty_node_list_is_rejected() {
        assert!(ShardRouter::new(Vec::new()).is_err());
    }

    #[test]
    fn route_is_deterministic() {
        let router = three_nodes();
        let (addr, index) = router.route("user42");
        for _ in 0..100 {
            assert_eq!(router.route("user42"), (addr, index));
        }
    }

    #[test]
    fn route_index_selects_matching_node() {
        let router = three_nodes();
        let (addr, index) = router.route("some-key");
        assert_eq!(addr, router.nodes()[index]);
    }

    #[test]
    fn fnv1a32_matches_reference_vectors() {
        // Published FNV-1a test vectors.
        assert_eq!(fnv1a32(b""), 0x811c9dc5);
        assert_eq!(fnv1a32(b"a"), 0xe40c292c);
        assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn shard_indices_are_roughly_uniform() {
        let router = three_nodes();
        let mut counts = [0usize; 3];
        for i in 0..3000 {
            let (_, index) = router.route(&format!("key-{i}"));
            counts[index] += 1;
        }
        // Statistical check, generous bounds: each shard within ±30% of fair.
        for &count in &counts {
            assert!(
                (700..=1300).contains(&count),
                "skewed shard distribution: {counts:?}"
            );
        }
    }
}
