// Nearest-neighbour index over the `Embedding` relation (§4.1
// `vector_search`). Distance is monotonic with dissimilarity: smaller
// is more similar, matching the contract's phrasing exactly.
//
// Implemented as an exact brute-force scan. The teacher carries an
// optional `hnsw` dependency behind its `advanced-search` feature for
// the same role; this crate drops it (see DESIGN.md) rather than guess
// at an unfamiliar generic API, and keeps the same `Metric`-free
// `search(query, k)` surface so a real HNSW-backed index can be dropped
// in behind this module without touching callers.

use crate::types::EntityId;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: EntityId,
    pub distance: f32,
}

#[derive(Debug, Default)]
pub struct VectorIndex {
    vectors: HashMap<EntityId, Vec<f32>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, id: EntityId, vector: Vec<f32>) {
        self.vectors.insert(id, vector);
    }

    pub fn remove(&mut self, id: &EntityId) {
        self.vectors.remove(id);
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Nearest `k` vectors to `query`, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<VectorHit> {
        let mut hits: Vec<VectorHit> = self
            .vectors
            .iter()
            .map(|(id, v)| VectorHit {
                id: id.clone(),
                distance: euclidean(query, v),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_nearest_first() {
        let mut index = VectorIndex::new();
        index.upsert(EntityId::new("a".into()), vec![0.0, 0.0]);
        index.upsert(EntityId::new("b".into()), vec![10.0, 10.0]);
        index.upsert(EntityId::new("c".into()), vec![0.1, 0.1]);

        let hits = index.search(&[0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id.as_str(), "a");
        assert_eq!(hits[1].id.as_str(), "c");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn handles_removal() {
        let mut index = VectorIndex::new();
        index.upsert(EntityId::new("a".into()), vec![0.0]);
        index.remove(&EntityId::new("a".into()));
        assert!(index.is_empty());
    }

    #[test]
    fn distance_is_monotonic_with_dissimilarity() {
        let mut index = VectorIndex::new();
        index.upsert(EntityId::new("near".into()), vec![1.0, 0.0]);
        index.upsert(EntityId::new("far".into()), vec![5.0, 0.0]);
        let hits = index.search(&[0.0, 0.0], 2);
        assert!(hits[0].distance < hits[1].distance);
    }
}
