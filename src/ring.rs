use std::collections::BTreeMap;

use crate::{Error, Node};

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Immutable consistent-hash snapshot of the cluster membership.
///
/// Each node contributes exactly one ring point, placed by hashing its
/// canonical address. A key routes to the first point at or after the key's
/// own hash, wrapping past the highest point back to the first. Rings are
/// built once and never mutated; the selector replaces whole rings
/// atomically.
pub struct HashRing {
    points: Vec<(u64, Node)>,
}

impl HashRing {
    /// Build a ring from a membership list.
    ///
    /// Duplicate addresses collapse to a single point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMembership`] if `nodes` is empty.
    pub fn build(nodes: &[Node]) -> Result<Self, Error> {
        if nodes.is_empty() {
            return Err(Error::EmptyMembership);
        }

        let mut points = BTreeMap::new();
        for node in nodes {
            points.insert(hash(node.addr().as_bytes()), node.clone());
        }

        Ok(Self {
            points: points.into_iter().collect(),
        })
    }

    /// Route a key to its owning node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyMembership`] on a zero-point ring.
    pub fn pick(&self, key: impl AsRef<[u8]>) -> Result<&Node, Error> {
        if self.points.is_empty() {
            return Err(Error::EmptyMembership);
        }

        let key_hash = hash(key.as_ref());
        let idx = self.points.partition_point(|(point, _)| *point < key_hash);
        let (_, node) = &self.points[idx % self.points.len()];
        Ok(node)
    }

    /// Nodes in ring order (ascending point hash).
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.points.iter().map(|(_, node)| node)
    }

    /// Whether `addr` is represented on this ring.
    pub fn contains(&self, addr: &str) -> bool {
        self.points.iter().any(|(_, node)| node.addr() == addr)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// FNV-1a, applied to node addresses and lookup keys alike so both land in
/// the same hash space.
fn hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
