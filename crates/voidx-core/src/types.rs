//! Domain types exchanged between the embedder, the store and its callers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primary key of a stored row.
pub type DocId = i64;

/// An ingest row: field name to value. The primary key must be convertible
/// to `i64`; every indexable text field must carry its text.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Whether an embedder can produce sparse term weights next to dense vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SupportStatus {
    Dense,
    DenseAndSparse,
}

impl SupportStatus {
    pub fn supports_sparse(self) -> bool {
        matches!(self, Self::DenseAndSparse)
    }
}

/// Term-weight map (token index to weight).
///
/// Ordering of entries carries no meaning; `packed` returns ascending indices
/// for backends that want parallel `(indices, values)` arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SparseVector(pub BTreeMap<u32, f32>);

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u32, weight: f32) {
        self.0.insert(index, weight);
    }

    /// Keeps the larger weight when the index is already present.
    pub fn insert_max(&mut self, index: u32, weight: f32) {
        let slot = self.0.entry(index).or_insert(weight);
        if weight > *slot {
            *slot = weight;
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.0.iter().map(|(&i, &w)| (i, w))
    }

    pub fn packed(&self) -> (Vec<u32>, Vec<f32>) {
        self.0.iter().map(|(&i, &w)| (i, w)).unzip()
    }

    pub fn from_packed(indices: &[u32], values: &[f32]) -> Self {
        Self(indices.iter().copied().zip(values.iter().copied()).collect())
    }

    /// Inner product over shared indices.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (small, large) = if self.len() <= other.len() { (self, other) } else { (other, self) };
        small.iter().filter_map(|(i, w)| large.0.get(&i).map(|v| v * w)).sum()
    }
}

impl FromIterator<(u32, f32)> for SparseVector {
    fn from_iter<T: IntoIterator<Item = (u32, f32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A retrieval result.
///
/// `score` is the fused score (higher is better). `matched_field` names the
/// indexable field whose sub-search produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredDocument {
    pub id: DocId,
    pub score: f32,
    pub fields: Document,
    pub matched_field: String,
}
