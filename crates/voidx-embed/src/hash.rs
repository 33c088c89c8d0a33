use async_trait::async_trait;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use voidx_core::traits::Embedder;
use voidx_core::types::{SparseVector, SupportStatus};
use voidx_core::Result;

const DENSE_SEED: u64 = 0;
const SPARSE_SEED: u64 = 0x5eed;

/// Deterministic, model-free embedder.
///
/// Whitespace tokens are lowercased and hashed into `dim` buckets; the result
/// is L2-normalized and non-negative. When sparse output is enabled each
/// distinct token also contributes a term weight (its relative frequency)
/// keyed by a second hash.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    sparse: bool,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), sparse: false }
    }

    pub fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    pub fn dense_vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokens(text).enumerate() {
            let h = hash_token(&token, DENSE_SEED);
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }

    pub fn sparse_vector(&self, text: &str) -> SparseVector {
        let toks: Vec<String> = tokens(text).collect();
        if toks.is_empty() {
            return SparseVector::new();
        }
        let unit = 1.0 / toks.len() as f32;
        let mut out = SparseVector::new();
        for token in &toks {
            let idx = (hash_token(token, SPARSE_SEED) & u64::from(u32::MAX >> 1)) as u32;
            let current = out.0.get(&idx).copied().unwrap_or(0.0);
            out.insert(idx, current + unit);
        }
        out
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(str::to_lowercase)
}

fn hash_token(token: &str, seed: u64) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    token.hash(&mut hasher);
    hasher.finish()
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dim
    }

    fn support_status(&self) -> SupportStatus {
        if self.sparse { SupportStatus::DenseAndSparse } else { SupportStatus::Dense }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.dense_vector(t)).collect())
    }

    async fn embed_hybrid(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, Vec<SparseVector>)> {
        if !self.sparse {
            return Err(voidx_core::Error::invalid_arg("hash embedder built without sparse output"));
        }
        let dense = texts.iter().map(|t| self.dense_vector(t)).collect();
        let sparse = texts.iter().map(|t| self.sparse_vector(t)).collect();
        Ok((dense, sparse))
    }
}
