use std::sync::Arc;

use voidx_core::cancel::{cancellable, CancellationToken};
use voidx_core::traits::{check_dense_batch, Embedder};
use voidx_core::types::{DocId, Document, ScoredDocument, SparseVector};
use voidx_core::{Error, IndexAborted, Result};
use voidx_vector::VectorClient;

use crate::field::FieldSet;
use crate::indexer::{self, IndexOptions};
use crate::retriever::{self, RetrieveOptions};

/// Per-manager settings every store of that manager shares.
#[derive(Debug, Clone)]
pub(crate) struct Tuning {
    pub dense_metric: String,
    pub sparse_metric: String,
    pub batch_size: usize,
    pub fusion_alpha: f32,
}

pub(crate) struct StoreContext {
    pub collection: String,
    pub client: Arc<dyn VectorClient>,
    pub embedder: Arc<dyn Embedder>,
    pub fields: FieldSet,
    pub hybrid: bool,
    pub tuning: Tuning,
}

impl StoreContext {
    /// Embeds `texts` once, dense plus sparse when the store is hybrid.
    pub async fn embed(
        &self,
        texts: &[String],
    ) -> Result<(Vec<Vec<f32>>, Option<Vec<SparseVector>>)> {
        let dim = self.embedder.dimensions();
        if self.hybrid {
            let (dense, sparse) = self.embedder.embed_hybrid(texts).await?;
            check_dense_batch(&dense, texts.len(), dim)?;
            if sparse.len() != texts.len() {
                return Err(Error::Embedding(format!(
                    "embedder returned {} sparse vectors for {} texts",
                    sparse.len(),
                    texts.len()
                )));
            }
            Ok((dense, Some(sparse)))
        } else {
            let dense = self.embedder.embed(texts).await?;
            check_dense_batch(&dense, texts.len(), dim)?;
            Ok((dense, None))
        }
    }
}

/// Handle to one loaded collection. Cheap to clone and safe to share; the
/// database client is borrowed from the manager, never closed here.
#[derive(Clone)]
pub struct SearchStore {
    ctx: Arc<StoreContext>,
}

impl SearchStore {
    pub(crate) fn new(ctx: StoreContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn collection(&self) -> &str {
        &self.ctx.collection
    }

    pub fn fields(&self) -> &FieldSet {
        &self.ctx.fields
    }

    pub fn is_hybrid(&self) -> bool {
        self.ctx.hybrid
    }

    /// Embeds and writes `documents` batch by batch. On failure the error
    /// carries the ids of every batch committed before it.
    pub async fn index(
        &self,
        documents: &[Document],
        options: IndexOptions,
        token: &CancellationToken,
    ) -> std::result::Result<Vec<DocId>, IndexAborted> {
        indexer::run(&self.ctx, documents, options, token).await
    }

    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
        token: &CancellationToken,
    ) -> Result<Vec<ScoredDocument>> {
        retriever::run(&self.ctx, query, options, token).await
    }

    /// Deletes rows by primary key in one backend call. Unknown ids are
    /// ignored; an empty list is a no-op.
    pub async fn delete(&self, ids: &[DocId], token: &CancellationToken) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
        let filter = format!("{} in [{list}]", self.ctx.fields.primary().name);
        cancellable(token, self.ctx.client.delete(&self.ctx.collection, &filter)).await?;
        tracing::debug!(collection = %self.ctx.collection, count = ids.len(), "deleted rows");
        Ok(())
    }
}
