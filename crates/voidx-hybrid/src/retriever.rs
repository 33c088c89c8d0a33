//! Query pipeline: embed once, fan out dense (and sparse) searches per
//! target field, fuse, merge, threshold, order.

use futures::future::try_join_all;

use voidx_core::cancel::{cancellable, CancellationToken};
use voidx_core::types::ScoredDocument;
use voidx_core::{Error, Result};
use voidx_vector::{AnnSearch, Hit, QueryVector};

use crate::dsl::Filter;
use crate::field::{dense_column, sparse_column};
use crate::fusion::{fuse, merge_fields};
use crate::partition::partition_name;
use crate::store::StoreContext;

pub const DEFAULT_TOP_K: usize = 4;

/// Search the same query over several indexable fields and keep each
/// document's best field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiMatch {
    pub fields: Vec<String>,
    /// Overrides the query text when set.
    pub query: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub multi_match: Option<MultiMatch>,
    /// With no explicit `partitions`, partitions are read off `eq`/`in`
    /// conditions on this field at the filter root.
    pub partition_key: Option<String>,
    /// Logical partition values, mapped like ingest routing.
    pub partitions: Vec<String>,
    pub filter: Option<Filter>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            score_threshold: None,
            multi_match: None,
            partition_key: None,
            partitions: Vec::new(),
            filter: None,
        }
    }
}

impl RetrieveOptions {
    pub fn top_k(k: usize) -> Self {
        Self { top_k: k, ..Self::default() }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_partitions<S: Into<String>>(
        mut self,
        partitions: impl IntoIterator<Item = S>,
    ) -> Self {
        self.partitions = partitions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_multi_match(mut self, multi_match: MultiMatch) -> Self {
        self.multi_match = Some(multi_match);
        self
    }
}

pub(crate) async fn run(
    ctx: &StoreContext,
    query: &str,
    options: &RetrieveOptions,
    token: &CancellationToken,
) -> Result<Vec<ScoredDocument>> {
    if options.top_k == 0 {
        return Err(Error::invalid_arg("top_k must be at least 1"));
    }
    let query = options
        .multi_match
        .as_ref()
        .and_then(|m| m.query.as_deref())
        .filter(|q| !q.trim().is_empty())
        .unwrap_or(query);
    if query.trim().is_empty() {
        return Err(Error::invalid_arg("query must not be empty"));
    }
    let targets = target_fields(ctx, options)?;
    let filter = options.filter.as_ref().map(|f| f.compile(&ctx.fields)).transpose()?;

    let Some(partitions) = resolve_partitions(ctx, options, token).await? else {
        tracing::debug!(collection = %ctx.collection, "no requested partition exists");
        return Ok(Vec::new());
    };

    let (mut dense, sparse) = cancellable(token, ctx.embed(&[query.to_string()])).await?;
    let dense = dense.pop().ok_or_else(|| Error::Embedding("no query vector".into()))?;
    let sparse = sparse.and_then(|mut s| s.pop());

    let output_fields = ctx.fields.scalar_names();
    let primary_key = ctx.fields.primary().name.clone();
    let request = |column: String, vector: QueryVector, metric: &str| AnnSearch {
        collection: ctx.collection.clone(),
        anns_field: column,
        primary_key: primary_key.clone(),
        vector,
        metric: metric.to_string(),
        limit: options.top_k,
        filter: filter.clone(),
        partitions: partitions.clone(),
        output_fields: output_fields.clone(),
        params: Default::default(),
    };

    let mut requests = Vec::new();
    let dense_metric = ctx.tuning.dense_metric.as_str();
    let sparse_metric = ctx.tuning.sparse_metric.as_str();
    for field in &targets {
        let query = QueryVector::Dense(dense.clone());
        requests.push(request(dense_column(field), query, dense_metric));
        if let Some(s) = &sparse {
            let query = QueryVector::Sparse(s.clone());
            requests.push(request(sparse_column(field), query, sparse_metric));
        }
    }
    let mut results: Vec<Vec<Hit>> =
        try_join_all(requests.iter().map(|r| cancellable(token, ctx.client.search(r)))).await?;

    let per_field = if sparse.is_some() {
        let mut out = Vec::with_capacity(targets.len());
        for field in targets.iter().rev() {
            let sparse_hits = results.pop().unwrap_or_default();
            let dense_hits = results.pop().unwrap_or_default();
            let fused = fuse(&dense_hits, Some(sparse_hits.as_slice()), ctx.tuning.fusion_alpha);
            out.push((field.clone(), fused));
        }
        out.reverse();
        out
    } else {
        let fused = results.iter().map(|hits| fuse(hits, None, ctx.tuning.fusion_alpha));
        targets.iter().cloned().zip(fused).collect()
    };

    let docs = merge_fields(per_field, options.score_threshold, options.top_k);
    tracing::debug!(collection = %ctx.collection, hits = docs.len(), "retrieve finished");
    Ok(docs)
}

fn target_fields(ctx: &StoreContext, options: &RetrieveOptions) -> Result<Vec<String>> {
    match &options.multi_match {
        Some(m) if !m.fields.is_empty() => {
            let mut out: Vec<String> = Vec::new();
            for name in &m.fields {
                match ctx.fields.get(name) {
                    Some(f) if f.is_indexable() => {
                        if !out.contains(name) {
                            out.push(name.clone());
                        }
                    }
                    _ => {
                        let msg = format!("'{name}' is not an indexable field");
                        return Err(Error::invalid_arg(msg));
                    }
                }
            }
            Ok(out)
        }
        _ => ctx
            .fields
            .indexable()
            .next()
            .map(|f| vec![f.name.clone()])
            .ok_or_else(|| {
                let msg = format!("collection '{}' has no indexable field", ctx.collection);
                Error::invalid_arg(msg)
            }),
    }
}

/// Backend partition names to search; empty means the whole collection.
/// `None` when partitions were requested but none of them exists yet.
async fn resolve_partitions(
    ctx: &StoreContext,
    options: &RetrieveOptions,
    token: &CancellationToken,
) -> Result<Option<Vec<String>>> {
    let logical = if !options.partitions.is_empty() {
        options.partitions.clone()
    } else {
        match (&options.partition_key, &options.filter) {
            (Some(key), Some(filter)) => filter.partition_values(key),
            _ => Vec::new(),
        }
    };
    if logical.is_empty() {
        return Ok(Some(Vec::new()));
    }
    let mut names = Vec::with_capacity(logical.len());
    for value in &logical {
        let name = partition_name(value);
        if names.contains(&name) {
            continue;
        }
        if cancellable(token, ctx.client.has_partition(&ctx.collection, &name)).await? {
            names.push(name);
        }
    }
    Ok(if names.is_empty() { None } else { Some(names) })
}
