//! ANN vector index
//!
//! In-memory HNSW index (usearch, cosine metric) over the persisted entry
//! vectors. Hydrated from the `entries_vec` table at open; every write that
//! touches a vector row updates this index in the same call path.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::{Result, StoreError};

/// HNSW connectivity parameter (higher = better recall, more memory)
const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search
const DEFAULT_EXPANSION_SEARCH: usize = 64;

/// HNSW vector index keyed by entry id
pub struct VectorIndex {
    index: Index,
    dimensions: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given width
    pub fn new(dimensions: usize) -> Result<Self> {
        let options = IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            multi: false,
        };

        let index = Index::new(&options)
            .map_err(|e| StoreError::Init(format!("vector index creation failed: {e}")))?;

        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    /// Number of indexed vectors
    pub fn len(&self) -> usize {
        self.index.size()
    }

    /// Whether the index holds no vectors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector width
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Add or replace the vector for an entry
    pub fn add(&mut self, entry_id: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        if let Some(&existing) = self.key_to_id.get(entry_id) {
            self.index
                .remove(existing)
                .map_err(|e| StoreError::Init(format!("vector index remove failed: {e}")))?;
            self.reserve_for(self.index.size() + 1)?;
            self.index
                .add(existing, vector)
                .map_err(|e| StoreError::Init(format!("vector index add failed: {e}")))?;
            return Ok(());
        }

        // usearch requires reserve() ahead of add()
        if self.index.size() >= self.index.capacity() {
            let new_capacity = std::cmp::max(self.index.capacity() * 2, 16);
            self.reserve_for(new_capacity)?;
        }

        let key = self.next_id;
        self.next_id += 1;
        self.index
            .add(key, vector)
            .map_err(|e| StoreError::Init(format!("vector index add failed: {e}")))?;
        self.key_to_id.insert(entry_id.to_string(), key);
        self.id_to_key.insert(key, entry_id.to_string());
        Ok(())
    }

    fn reserve_for(&self, capacity: usize) -> Result<()> {
        self.index
            .reserve(capacity)
            .map_err(|e| StoreError::Init(format!("vector index reserve failed: {e}")))
    }

    /// Drop an entry's vector; unknown ids are a no-op
    pub fn remove(&mut self, entry_id: &str) -> Result<()> {
        if let Some(key) = self.key_to_id.remove(entry_id) {
            self.id_to_key.remove(&key);
            self.index
                .remove(key)
                .map_err(|e| StoreError::Init(format!("vector index remove failed: {e}")))?;
        }
        Ok(())
    }

    /// Nearest entries by cosine distance: `(id, 1 - distance)` best first
    pub fn search(&self, query: &[f32], count: usize) -> Result<Vec<(String, f64)>> {
        if query.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }
        if self.is_empty() || count == 0 {
            return Ok(Vec::new());
        }

        let matches = self
            .index
            .search(query, count)
            .map_err(|e| StoreError::Init(format!("vector search failed: {e}")))?;

        let mut out = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(id) = self.id_to_key.get(key) {
                out.push((id.clone(), 1.0 - *distance as f64));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(mut v: Vec<f32>) -> Vec<f32> {
        crate::embeddings::l2_normalize(&mut v);
        v
    }

    #[test]
    fn nearest_neighbour_ordering() {
        let mut index = VectorIndex::new(3).unwrap();
        index.add("a", &unit(vec![1.0, 0.0, 0.0])).unwrap();
        index.add("b", &unit(vec![0.9, 0.1, 0.0])).unwrap();
        index.add("c", &unit(vec![0.0, 0.0, 1.0])).unwrap();

        let hits = index.search(&unit(vec![1.0, 0.0, 0.0]), 3).unwrap();
        assert_eq!(hits[0].0, "a");
        assert_eq!(hits[1].0, "b");
        // closer hits score higher
        assert!(hits[0].1 > hits[1].1);
        assert!(hits[1].1 > hits[2].1);
    }

    #[test]
    fn add_replaces_existing_key() {
        let mut index = VectorIndex::new(2).unwrap();
        index.add("a", &unit(vec![1.0, 0.0])).unwrap();
        index.add("a", &unit(vec![0.0, 1.0])).unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&unit(vec![0.0, 1.0]), 1).unwrap();
        assert_eq!(hits[0].0, "a");
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn remove_then_search() {
        let mut index = VectorIndex::new(2).unwrap();
        index.add("a", &unit(vec![1.0, 0.0])).unwrap();
        index.add("b", &unit(vec![0.0, 1.0])).unwrap();
        index.remove("a").unwrap();
        index.remove("missing").unwrap(); // no-op

        let hits = index.search(&unit(vec![1.0, 0.0]), 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "b");
    }

    #[test]
    fn dimension_mismatch_is_refused() {
        let mut index = VectorIndex::new(4).unwrap();
        assert!(matches!(
            index.add("a", &[1.0, 0.0]),
            Err(StoreError::DimensionMismatch { expected: 4, got: 2 })
        ));
        assert!(matches!(
            index.search(&[1.0], 1),
            Err(StoreError::DimensionMismatch { expected: 4, got: 1 })
        ));
    }

    #[test]
    fn empty_index_yields_empty_results() {
        let index = VectorIndex::new(2).unwrap();
        assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
    }
}
