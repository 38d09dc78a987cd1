//! Flat (brute-force) vector index with exact squared-L2 search.
//!
//! Vectors are identified by their insertion position; there is no removal.

/// A single nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the matched vector
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Append-only collection of fixed-dimension vectors.
///
/// Storage is one contiguous buffer of `len * dimensions` floats.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    data: Vec<f32>,
    dimensions: usize,
}

impl FlatIndex {
    /// Create a new empty index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            data: Vec::new(),
            dimensions,
        }
    }

    /// Create an index with room for `capacity` vectors.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(dimensions * capacity),
            ..Self::new(dimensions)
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of vectors in the index.
    pub fn len(&self) -> usize {
        if self.dimensions == 0 {
            return 0;
        }
        self.data.len() / self.dimensions
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector; its position is the previous `len()`.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        if self.dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        let position = self.len();
        self.data.extend_from_slice(vector);
        Ok(position)
    }

    /// Vector stored at `position`.
    #[cfg(test)]
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Iterate over all vectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimensions.max(1))
    }

    /// Return the `k` nearest vectors to `query`, closest first.
    ///
    /// Ties keep insertion order, so repeated searches are stable.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        if k == 0 || self.is_empty() {
            return Ok(vec![]);
        }

        let mut results: Vec<Neighbor> = self
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position,
                distance: Self::squared_l2(query, vector),
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(k);

        Ok(results)
    }

    fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index dimensionality must be greater than zero")]
    ZeroDimensions,
}
