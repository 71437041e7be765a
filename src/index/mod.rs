//! Exhaustive nearest-neighbor search over dense embeddings.
//!
//! [`FlatIndex`] stores every vector in one contiguous row-major buffer and
//! answers queries by scanning all of them. Distances are squared Euclidean
//! (L2): lower is more similar. There is no approximation or pruning, so the
//! index is meant for corpora of hundreds to low thousands of documents.


use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use thiserror::Error;
use tracing::debug;

/// Id reported in a result slot that holds no neighbor
pub const NO_NEIGHBOR: i64 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Index dimension must be greater than zero")]
    ZeroDimension,
    #[error("Stored vector buffer of {len} floats is not a multiple of dimension {dimension}")]
    CorruptStorage { len: usize, dimension: usize },
}

/// Flat (brute force) L2 index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<f32>,
}

/// Result of a k-nearest-neighbor search.
///
/// Always holds exactly `k` slots in ascending distance order. Slots beyond the
/// number of stored vectors contain [`NO_NEIGHBOR`] and an infinite distance.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHits {
    pub ids: Vec<i64>,
    pub distances: Vec<f32>,
}

impl SearchHits {
    /// Iterate over the slots that hold a real neighbor, best match first
    #[inline]
    pub fn neighbors(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.ids
            .iter()
            .zip(self.distances.iter())
            .filter_map(|(&id, &distance)| usize::try_from(id).ok().map(|id| (id, distance)))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    distance: f32,
    id: usize,
}

// Max-heap ordering: the worst candidate (largest distance, then largest id) sits on top
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dimension,
            vectors: Vec::new(),
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors currently indexed
    #[inline]
    pub fn count(&self) -> usize {
        self.vectors.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Append a batch of vectors. Ids continue from the current count.
    ///
    /// The batch is rejected as a whole if any vector has the wrong dimension.
    #[inline]
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }

        debug!(
            "Added {} vectors to flat index (total {})",
            vectors.len(),
            self.count()
        );
        Ok(())
    }

    /// Stored vector by id
    #[inline]
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        self.vectors.chunks_exact(self.dimension).nth(id)
    }

    /// Find the `k` nearest stored vectors to `query`
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<SearchHits, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k.saturating_add(1));

        if k > 0 {
            for (id, stored) in self.vectors.chunks_exact(self.dimension).enumerate() {
                let candidate = Candidate {
                    distance: squared_l2(query, stored),
                    id,
                };

                if heap.len() < k {
                    heap.push(candidate);
                } else if heap.peek().is_some_and(|worst| candidate < *worst) {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }

        let ranked = heap.into_sorted_vec();

        let mut ids = Vec::with_capacity(k);
        let mut distances = Vec::with_capacity(k);
        for candidate in &ranked {
            ids.push(candidate.id as i64);
            distances.push(candidate.distance);
        }
        ids.resize(k, NO_NEIGHBOR);
        distances.resize(k, f32::INFINITY);

        Ok(SearchHits { ids, distances })
    }

    /// Check internal consistency after deserialization
    #[inline]
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.dimension == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if self.vectors.len() % self.dimension != 0 {
            return Err(IndexError::CorruptStorage {
                len: self.vectors.len(),
                dimension: self.dimension,
            });
        }
        Ok(())
    }
}

#[inline]
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
