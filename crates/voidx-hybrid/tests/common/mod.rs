#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use voidx_core::cancel::CancellationToken;
use voidx_core::traits::Embedder;
use voidx_core::types::{Document, SparseVector, SupportStatus};
use voidx_core::{Error, Result};
use voidx_embed::HashEmbedder;
use voidx_hybrid::{CreateRequest, Field, Manager, ManagerOptions, SearchStore};
use voidx_vector::MemoryClient;

pub const DIM: usize = 4;
pub const COLLECTION: &str = "kb_docs";

pub fn dense_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(DIM))
}

pub fn hybrid_embedder() -> Arc<dyn Embedder> {
    Arc::new(HashEmbedder::new(DIM).with_sparse(true))
}

pub fn manager(
    client: &Arc<MemoryClient>,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
) -> Manager {
    let options = ManagerOptions::new(client.clone(), embedder)
        .with_batch_size(batch_size)
        .with_poll_interval(Duration::from_millis(1));
    Manager::new(options).expect("manager")
}

pub fn s1_fields() -> Vec<Field> {
    vec![Field::int64("id").primary(), Field::text("text_content").indexed()]
}

pub async fn store_with(manager: &Manager, fields: Vec<Field>) -> SearchStore {
    let token = CancellationToken::new();
    let request = CreateRequest::new(COLLECTION, fields);
    let loaded = manager.create(&request, &token).await.expect("create");
    assert!(loaded);
    manager.get_search_store(COLLECTION, &token).await.expect("store")
}

pub fn doc(id: i64, text: &str, creator: i64) -> Document {
    json!({ "id": id, "text_content": text, "creator_id": creator })
        .as_object()
        .cloned()
        .expect("object")
}

pub fn numbered_docs(n: i64) -> Vec<Document> {
    (1..=n).map(|i| doc(i, &format!("document number {i}"), 10 + i % 2)).collect()
}

/// Delegates to a hash embedder and fails on the `fail_on`-th call (1-based).
pub struct FailingEmbedder {
    inner: HashEmbedder,
    fail_on: usize,
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new(fail_on: usize) -> Self {
        Self { inner: HashEmbedder::new(DIM), fail_on, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> usize {
        DIM
    }

    fn support_status(&self) -> SupportStatus {
        SupportStatus::Dense
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on {
            return Err(Error::Embedding("model server unavailable".into()));
        }
        self.inner.embed(texts).await
    }
}

/// Cancels `token` while serving the `cancel_on`-th call, then answers it.
pub struct CancellingEmbedder {
    inner: HashEmbedder,
    token: CancellationToken,
    cancel_on: usize,
    calls: AtomicUsize,
}

impl CancellingEmbedder {
    pub fn new(token: CancellationToken, cancel_on: usize) -> Self {
        Self { inner: HashEmbedder::new(DIM), token, cancel_on, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl Embedder for CancellingEmbedder {
    fn dimensions(&self) -> usize {
        DIM
    }

    fn support_status(&self) -> SupportStatus {
        SupportStatus::Dense
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.cancel_on {
            self.token.cancel();
        }
        self.inner.embed(texts).await
    }
}

/// Returns fixed vectors per text so fusion scores can be predicted.
pub struct TableEmbedder {
    pub entries: Vec<(&'static str, Vec<f32>, SparseVector)>,
}

#[async_trait]
impl Embedder for TableEmbedder {
    fn dimensions(&self) -> usize {
        DIM
    }

    fn support_status(&self) -> SupportStatus {
        SupportStatus::DenseAndSparse
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.embed_hybrid(texts).await?.0)
    }

    async fn embed_hybrid(&self, texts: &[String]) -> Result<(Vec<Vec<f32>>, Vec<SparseVector>)> {
        let mut dense = Vec::new();
        let mut sparse = Vec::new();
        for t in texts {
            let (_, d, s) = self
                .entries
                .iter()
                .find(|(k, _, _)| *k == t.as_str())
                .ok_or_else(|| Error::Embedding(format!("no vector for '{t}'")))?;
            dense.push(d.clone());
            sparse.push(s.clone());
        }
        Ok((dense, sparse))
    }
}
