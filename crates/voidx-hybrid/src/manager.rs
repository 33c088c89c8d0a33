//! Collection lifecycle: create (idempotent), drop (idempotent), and
//! handing out search stores for loaded collections.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use voidx_core::cancel::{cancellable, CancellationToken};
use voidx_core::config::{IndexConfig, StoreSettings};
use voidx_core::traits::Embedder;
use voidx_core::{Error, Result};
use voidx_vector::collection::{ensure_collection, ensure_indexes, ensure_loaded};
use voidx_vector::{CollectionSchema, CreateCollection, VectorClient};

use crate::field::{sparse_column, Field, FieldSet, IndexDefaults};
use crate::store::{SearchStore, StoreContext, Tuning};

#[derive(Clone)]
pub struct ManagerOptions {
    pub client: Arc<dyn VectorClient>,
    pub embedder: Arc<dyn Embedder>,
    /// `None`: hybrid iff the embedder produces sparse vectors.
    pub enable_hybrid: Option<bool>,
    pub dense_index: IndexConfig,
    pub dense_metric: String,
    pub sparse_index: IndexConfig,
    pub sparse_metric: String,
    pub shard_num: u32,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub fusion_alpha: f32,
}

impl ManagerOptions {
    pub fn new(client: Arc<dyn VectorClient>, embedder: Arc<dyn Embedder>) -> Self {
        Self::from_settings(client, embedder, &StoreSettings::default())
    }

    pub fn from_settings(
        client: Arc<dyn VectorClient>,
        embedder: Arc<dyn Embedder>,
        settings: &StoreSettings,
    ) -> Self {
        Self {
            client,
            embedder,
            enable_hybrid: settings.enable_hybrid,
            dense_index: settings.dense_index.clone(),
            dense_metric: settings.dense_metric.clone(),
            sparse_index: settings.sparse_index.clone(),
            sparse_metric: settings.sparse_metric.clone(),
            shard_num: settings.shard_num,
            batch_size: settings.batch_size,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            fusion_alpha: settings.fusion_alpha,
        }
    }

    pub fn with_hybrid(mut self, enable: bool) -> Self {
        self.enable_hybrid = Some(enable);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll_interval = poll;
        self
    }

    pub fn with_fusion_alpha(mut self, alpha: f32) -> Self {
        self.fusion_alpha = alpha;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub name: String,
    pub fields: Vec<Field>,
    /// Stored as collection properties.
    pub metadata: BTreeMap<String, String>,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self { name: name.into(), fields, metadata: BTreeMap::new() }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Owns the database client and embedder; every store it hands out shares
/// them.
pub struct Manager {
    client: Arc<dyn VectorClient>,
    embedder: Arc<dyn Embedder>,
    hybrid: bool,
    indexes: IndexDefaults,
    shard_num: u32,
    poll_interval: Duration,
    tuning: Tuning,
}

impl Manager {
    pub fn new(options: ManagerOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(Error::invalid_arg("batch_size must be at least 1"));
        }
        if options.shard_num == 0 {
            return Err(Error::invalid_arg("shard_num must be at least 1"));
        }
        if !(0.0..=1.0).contains(&options.fusion_alpha) {
            let msg = format!("fusion_alpha {} is outside [0, 1]", options.fusion_alpha);
            return Err(Error::invalid_arg(msg));
        }
        let supports_sparse = options.embedder.support_status().supports_sparse();
        let hybrid = match options.enable_hybrid {
            None => supports_sparse,
            Some(true) if !supports_sparse => {
                tracing::warn!("embedder has no sparse output; hybrid search falls back to dense");
                false
            }
            Some(enabled) => enabled,
        };
        tracing::debug!(backend = options.client.kind(), hybrid, "search store manager ready");
        Ok(Self {
            client: options.client,
            embedder: options.embedder,
            hybrid,
            indexes: IndexDefaults {
                dense: options.dense_index,
                dense_metric: options.dense_metric.clone(),
                sparse: options.sparse_index,
                sparse_metric: options.sparse_metric.clone(),
            },
            shard_num: options.shard_num,
            poll_interval: options.poll_interval,
            tuning: Tuning {
                dense_metric: options.dense_metric,
                sparse_metric: options.sparse_metric,
                batch_size: options.batch_size,
                fusion_alpha: options.fusion_alpha,
            },
        })
    }

    pub fn is_hybrid(&self) -> bool {
        self.hybrid
    }

    /// Backend identifier, e.g. `milvus`.
    pub fn get_type(&self) -> &'static str {
        self.client.kind()
    }

    /// Creates the collection, its indexes, and loads it. Every step skips
    /// what already exists, so a failed or cancelled call can be retried.
    ///
    /// Returns `false` when the collection is being released and cannot be
    /// loaded now; `Error::Transient` when someone else's load is running.
    pub async fn create(&self, req: &CreateRequest, token: &CancellationToken) -> Result<bool> {
        validate_name(&req.name)?;
        let fields = FieldSet::resolve(req.fields.clone())?;
        let schema = fields.to_schema(self.embedder.dimensions(), self.hybrid);
        let create = CreateCollection {
            name: req.name.clone(),
            schema,
            shard_num: self.shard_num,
            properties: req.metadata.clone(),
        };

        let client = self.client.as_ref();
        if !ensure_collection(client, &create, token).await? {
            let existing = cancellable(token, client.describe_collection(&req.name)).await?;
            check_compatible(&req.name, &create.schema, &existing.schema)?;
        }
        let specs = fields.index_specs(self.hybrid, &self.indexes);
        let built = ensure_indexes(client, &req.name, &specs, self.poll_interval, token).await?;
        if built > 0 {
            tracing::info!(collection = %req.name, built, "indexes ready");
        }
        ensure_loaded(client, &req.name, self.poll_interval, token).await
    }

    /// Drops the collection with its indexes. Missing collections are fine.
    pub async fn drop(&self, name: &str, token: &CancellationToken) -> Result<()> {
        if !cancellable(token, self.client.has_collection(name)).await? {
            tracing::debug!(collection = name, "drop: collection absent");
            return Ok(());
        }
        cancellable(token, self.client.drop_collection(name)).await?;
        tracing::info!(collection = name, "dropped collection");
        Ok(())
    }

    /// Returns a store for a loaded collection, loading it first if needed.
    pub async fn get_search_store(
        &self,
        name: &str,
        token: &CancellationToken,
    ) -> Result<SearchStore> {
        if !ensure_loaded(self.client.as_ref(), name, self.poll_interval, token).await? {
            return Err(Error::not_found(format!("collection '{name}'")));
        }
        let info = cancellable(token, self.client.describe_collection(name)).await?;
        let fields = FieldSet::from_schema(&info.schema)?;
        let collection_hybrid =
            fields.indexable().any(|f| info.schema.column(&sparse_column(&f.name)).is_some());
        if collection_hybrid && !self.embedder.support_status().supports_sparse() {
            return Err(Error::invalid_arg(format!(
                "collection '{name}' stores sparse vectors but the embedder cannot produce them"
            )));
        }
        Ok(SearchStore::new(StoreContext {
            collection: name.to_string(),
            client: Arc::clone(&self.client),
            embedder: Arc::clone(&self.embedder),
            fields,
            hybrid: collection_hybrid,
            tuning: self.tuning.clone(),
        }))
    }
}

/// Collection names: a letter or `_`, then letters, digits or `_`.
fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') || name.len() > 255 {
        return Err(Error::invalid_arg(format!("invalid collection name '{name}'")));
    }
    Ok(())
}

/// An existing collection must have the same columns the request computes.
fn check_compatible(
    name: &str,
    wanted: &CollectionSchema,
    existing: &CollectionSchema,
) -> Result<()> {
    for col in &wanted.columns {
        match existing.column(&col.name) {
            Some(found) if found.data_type == col.data_type => {}
            Some(found) => {
                return Err(Error::Conflict(format!(
                    "collection '{name}' column '{}' is {:?}, requested {:?}",
                    col.name, found.data_type, col.data_type
                )))
            }
            None => {
                let msg = format!("collection '{name}' has no column '{}'", col.name);
                return Err(Error::Conflict(msg));
            }
        }
    }
    if existing.columns.len() != wanted.columns.len() {
        return Err(Error::Conflict(format!("collection '{name}' has a different column set")));
    }
    Ok(())
}
