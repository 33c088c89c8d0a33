use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{SparseVector, SupportStatus};

/// Text to vector capability consumed by the store.
///
/// Implementations return one vector per input text, in input order, each of
/// length `dimensions()`. Empty input yields empty output.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn support_status(&self) -> SupportStatus;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dense vectors plus sparse term weights. Only valid when
    /// `support_status()` is `DenseAndSparse`.
    async fn embed_hybrid(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, Vec<SparseVector>)> {
        let _ = texts;
        Err(Error::invalid_arg("embedder does not support sparse vectors"))
    }
}

/// Checks the embedder honoured its contract for a batch of `expected` texts.
pub fn check_dense_batch(vectors: &[Vec<f32>], expected: usize, dim: usize) -> Result<()> {
    if vectors.len() != expected {
        return Err(Error::Embedding(format!(
            "embedder returned {} vectors for {} texts",
            vectors.len(),
            expected
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(Error::Embedding(format!("dim mismatch: got {} expected {}", bad.len(), dim)));
    }
    Ok(())
}
