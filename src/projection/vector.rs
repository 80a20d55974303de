//! HNSW vector index over node description embeddings.
//!
//! Thin wrapper around `hnsw_rs` with cosine distance. The index is rebuilt
//! from scratch on every full sync; it never outlives the projection it was
//! built from.

use anndists::dist::DistCosine;
use dashmap::DashMap;
use hnsw_rs::hnsw::Hnsw;

use crate::error::ProjectionError;

/// Cosine-distance ANN index mapping internal ids back to individual ids.
pub struct VectorIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    id_map: DashMap<usize, String>,
    dimensions: usize,
}

// Safety: Hnsw synchronizes internally; the projection serializes rebuilds
// behind its own lock.
unsafe impl Send for VectorIndex {}
unsafe impl Sync for VectorIndex {}

impl VectorIndex {
    /// Build an index over `(id, embedding)` pairs. Vectors whose length
    /// disagrees with `dimensions` are rejected.
    pub fn build(
        dimensions: usize,
        embeddings: &[(String, Vec<f32>)],
    ) -> Result<Self, ProjectionError> {
        let capacity = embeddings.len().max(16);
        let hnsw = Hnsw::new(16, capacity, 16, 200, DistCosine {});
        let id_map = DashMap::new();

        for (internal_id, (id, embedding)) in embeddings.iter().enumerate() {
            if embedding.len() != dimensions {
                return Err(ProjectionError::VectorIndex {
                    message: format!(
                        "embedding for {id} has {} dimensions, index expects {dimensions}",
                        embedding.len()
                    ),
                });
            }
            hnsw.insert((embedding, internal_id));
            id_map.insert(internal_id, id.clone());
        }

        Ok(Self {
            hnsw,
            id_map,
            dimensions,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Top-k ids by cosine similarity, descending. Scores are clamped to
    /// [0, 1].
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(String, f32)>, ProjectionError> {
        if query.len() != self.dimensions {
            return Err(ProjectionError::VectorIndex {
                message: format!(
                    "query has {} dimensions, index expects {}",
                    query.len(),
                    self.dimensions
                ),
            });
        }
        let ef_search = (top_k * 2).max(32);
        let neighbours = self.hnsw.search(query, top_k, ef_search);

        let mut results: Vec<(String, f32)> = neighbours
            .into_iter()
            .filter_map(|n| {
                let id = self.id_map.get(&n.d_id)?.value().clone();
                // HNSW returns cosine distance; convert to similarity.
                let score = (1.0 - n.distance).clamp(0.0, 1.0);
                Some((id, score))
            })
            .collect();
        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }
}

/// Plain cosine similarity, used for the in-process category search.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_search() {
        let embeddings = vec![
            ("couch_32".to_string(), vec![1.0, 0.0, 0.0]),
            ("oven_53".to_string(), vec![0.0, 1.0, 0.0]),
            ("bed_7".to_string(), vec![0.7, 0.7, 0.0]),
        ];
        let index = VectorIndex::build(3, &embeddings).unwrap();
        let hits = index.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, "couch_32");
        assert!(hits[0].1 >= hits[1].1);
        assert!(hits.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let embeddings = vec![("a".to_string(), vec![1.0, 0.0])];
        assert!(VectorIndex::build(3, &embeddings).is_err());

        let index = VectorIndex::build(2, &embeddings).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
