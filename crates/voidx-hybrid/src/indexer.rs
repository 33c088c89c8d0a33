//! Ingest pipeline: validate, batch, embed per field, route to partitions,
//! insert, report progress.

use futures::future::try_join_all;
use serde_json::Value;
use std::collections::HashSet;

use voidx_core::cancel::{cancellable, check, CancellationToken};
use voidx_core::progress::ProgressBar;
use voidx_core::types::{DocId, Document, SparseVector};
use voidx_core::{Error, IndexAborted, Result};
use voidx_vector::collection::ensure_partition;
use voidx_vector::schema::MAX_TEXT_LENGTH;
use voidx_vector::{FieldValue, Row};

use crate::field::{dense_column, sparse_column, Field, FieldType};
use crate::partition::{partition_name, partition_value};
use crate::store::StoreContext;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Field whose value picks each document's partition.
    pub partition_key: Option<String>,
    /// Fixed target partition; takes precedence over `partition_key`.
    pub partition: Option<String>,
    /// Indexable fields to embed in this call; all of them when `None`.
    pub indexing_fields: Option<Vec<String>>,
    pub progress_bar: Option<ProgressBar>,
}

impl IndexOptions {
    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn with_indexing_fields<S: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        self.indexing_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }
}

/// Options checked against the collection before any write.
struct Plan {
    embed: Vec<String>,
    /// Indexable fields skipped this call; they get zero vectors.
    skipped: Vec<String>,
    partition_key: Option<String>,
    partition: Option<String>,
}

impl Plan {
    fn new(ctx: &StoreContext, options: &IndexOptions) -> Result<Self> {
        let indexable: Vec<&Field> = ctx.fields.indexable().collect();
        let embed: Vec<String> = match &options.indexing_fields {
            None => indexable.iter().map(|f| f.name.clone()).collect(),
            Some(list) if list.is_empty() => {
                return Err(Error::invalid_arg("indexing_fields must name at least one field"));
            }
            Some(list) => {
                let mut seen = HashSet::new();
                let mut out = Vec::new();
                for name in list {
                    if !indexable.iter().any(|f| &f.name == name) {
                        let msg = format!("'{name}' is not an indexable field");
                        return Err(Error::invalid_arg(msg));
                    }
                    if seen.insert(name.as_str()) {
                        out.push(name.clone());
                    }
                }
                out
            }
        };
        let skipped =
            indexable.iter().filter(|f| !embed.contains(&f.name)).map(|f| f.name.clone()).collect();

        if let Some(key) = &options.partition_key {
            match ctx.fields.get(key) {
                Some(f) if !f.is_vector() => {}
                _ => {
                    let msg = format!("partition key '{key}' is not a scalar field");
                    return Err(Error::invalid_arg(msg));
                }
            }
        }
        Ok(Self {
            embed,
            skipped,
            partition_key: options.partition_key.clone(),
            partition: options.partition.as_deref().map(partition_name),
        })
    }

    fn route(&self, doc: &Document) -> Option<String> {
        if self.partition.is_some() {
            return self.partition.clone();
        }
        let key = self.partition_key.as_deref()?;
        partition_value(doc.get(key)).map(|v| partition_name(&v))
    }
}

/// A validated document: its id, scalar row and target partition.
struct Prepared {
    id: DocId,
    row: Row,
    partition: Option<String>,
}

pub(crate) async fn run(
    ctx: &StoreContext,
    documents: &[Document],
    options: IndexOptions,
    token: &CancellationToken,
) -> std::result::Result<Vec<DocId>, IndexAborted> {
    if let Some(bar) = &options.progress_bar {
        bar.reset(documents.len() as u64);
    }
    let mut written = Vec::with_capacity(documents.len());
    match index_batches(ctx, documents, &options, token, &mut written).await {
        Ok(()) => {
            tracing::info!(collection = %ctx.collection, rows = written.len(), "indexing finished");
            Ok(written)
        }
        Err(source) => {
            if let Some(bar) = &options.progress_bar {
                bar.report_error(&source);
            }
            tracing::warn!(
                collection = %ctx.collection,
                written = written.len(),
                error = %source,
                "indexing aborted"
            );
            Err(IndexAborted { written_ids: written, source })
        }
    }
}

async fn index_batches(
    ctx: &StoreContext,
    documents: &[Document],
    options: &IndexOptions,
    token: &CancellationToken,
    written: &mut Vec<DocId>,
) -> Result<()> {
    let plan = Plan::new(ctx, options)?;
    let dim = ctx.embedder.dimensions();
    let prepared = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| prepare(ctx, &plan, doc, dim).map_err(|e| at_document(i, e)))
        .collect::<Result<Vec<_>>>()?;

    let mut known_partitions: HashSet<String> = HashSet::new();
    for (n, batch) in prepared.chunks(ctx.tuning.batch_size).enumerate() {
        check(token)?;
        let mut rows: Vec<Row> = batch.iter().map(|p| p.row.clone()).collect();
        attach_vectors(ctx, &plan, &mut rows, dim, token).await?;

        let mut committed = vec![false; batch.len()];
        let outcome =
            insert_groups(ctx, batch, rows, &mut known_partitions, &mut committed, token).await;

        // rows of groups that made it in count even when a later group failed
        let ids: Vec<DocId> = batch
            .iter()
            .zip(&committed)
            .filter(|(_, done)| **done)
            .map(|(p, _)| p.id)
            .collect();
        if let Some(bar) = &options.progress_bar {
            bar.add_n(ids.len() as u64);
        }
        written.extend(ids);
        outcome?;
        let rows = batch.len();
        tracing::debug!(collection = %ctx.collection, batch = n, rows, "batch committed");
    }
    Ok(())
}

/// Embeds every selected field of the batch concurrently, one embedder call
/// per field, and writes the vector columns into `rows`.
async fn attach_vectors(
    ctx: &StoreContext,
    plan: &Plan,
    rows: &mut [Row],
    dim: usize,
    token: &CancellationToken,
) -> Result<()> {
    let texts: Vec<Vec<String>> = plan
        .embed
        .iter()
        .map(|field| {
            rows.iter()
                .map(|r| r.get(field).and_then(FieldValue::as_text).unwrap_or_default().to_string())
                .collect()
        })
        .collect();
    let embedded = try_join_all(texts.iter().map(|t| cancellable(token, ctx.embed(t)))).await?;

    for (field, (dense, sparse)) in plan.embed.iter().zip(embedded) {
        for (row, v) in rows.iter_mut().zip(dense) {
            row.insert(dense_column(field), FieldValue::DenseVector(v));
        }
        if let Some(sparse) = sparse {
            for (row, s) in rows.iter_mut().zip(sparse) {
                row.insert(sparse_column(field), FieldValue::SparseVector(s));
            }
        }
    }
    for field in &plan.skipped {
        for row in rows.iter_mut() {
            row.insert(dense_column(field), FieldValue::DenseVector(vec![0.0; dim]));
            if ctx.hybrid {
                row.insert(sparse_column(field), FieldValue::SparseVector(SparseVector::new()));
            }
        }
    }
    Ok(())
}

/// Inserts one embedded batch, one call per target partition. Marks the
/// batch positions of every group the backend accepted in `committed`.
async fn insert_groups(
    ctx: &StoreContext,
    batch: &[Prepared],
    rows: Vec<Row>,
    known_partitions: &mut HashSet<String>,
    committed: &mut [bool],
    token: &CancellationToken,
) -> Result<()> {
    for (partition, positions, group) in group_by_partition(batch, rows) {
        if let Some(p) = &partition {
            if !known_partitions.contains(p) {
                ensure_partition(ctx.client.as_ref(), &ctx.collection, p, token).await?;
                known_partitions.insert(p.clone());
            }
        }
        cancellable(token, ctx.client.insert(&ctx.collection, partition.as_deref(), &group)).await?;
        for i in positions {
            committed[i] = true;
        }
    }
    Ok(())
}

type PartitionGroup = (Option<String>, Vec<usize>, Vec<Row>);

/// Splits a batch by partition, keeping input order inside each group and
/// ordering groups by first appearance. Each group carries the batch
/// positions of its rows.
fn group_by_partition(batch: &[Prepared], rows: Vec<Row>) -> Vec<PartitionGroup> {
    let mut groups: Vec<PartitionGroup> = Vec::new();
    for (i, (p, row)) in batch.iter().zip(rows).enumerate() {
        match groups.iter_mut().find(|(k, _, _)| *k == p.partition) {
            Some((_, positions, g)) => {
                positions.push(i);
                g.push(row);
            }
            None => groups.push((p.partition.clone(), vec![i], vec![row])),
        }
    }
    groups
}

fn at_document(i: usize, e: Error) -> Error {
    match e {
        Error::InvalidArg(msg) => Error::InvalidArg(format!("document {i}: {msg}")),
        other => other,
    }
}

fn prepare(ctx: &StoreContext, plan: &Plan, doc: &Document, dim: usize) -> Result<Prepared> {
    let mut row = Row::new();
    let mut id = None;
    for field in ctx.fields.fields() {
        let value = doc.get(&field.name).filter(|v| !v.is_null());
        let converted = match value {
            None if field.is_primary => {
                return Err(Error::invalid_arg(format!("missing primary key '{}'", field.name)));
            }
            None if field.is_indexable() => {
                let msg = format!("missing text for indexable field '{}'", field.name);
                return Err(Error::invalid_arg(msg));
            }
            None if field.nullable => FieldValue::Null,
            None => {
                let msg = format!("missing required field '{}'", field.name);
                return Err(Error::invalid_arg(msg));
            }
            Some(v) => convert(field, v, dim)?,
        };
        if field.is_primary {
            id = converted.as_i64();
        }
        row.insert(field.name.clone(), converted);
    }
    let id = id.ok_or_else(|| Error::invalid_arg("primary key is not an integer"))?;
    Ok(Prepared { id, row, partition: plan.route(doc) })
}

fn convert(field: &Field, value: &Value, dim: usize) -> Result<FieldValue> {
    let bad =
        || Error::invalid_arg(format!("field '{}' has a value of the wrong type", field.name));
    match field.field_type {
        FieldType::Int64 => to_i64(value).map(FieldValue::Int64).ok_or_else(bad),
        FieldType::Text => {
            let s = value.as_str().ok_or_else(bad)?;
            Ok(FieldValue::Text(truncate(s, MAX_TEXT_LENGTH as usize).to_string()))
        }
        FieldType::DenseVector => {
            let items = value.as_array().ok_or_else(bad)?;
            let v = items
                .iter()
                .map(|x| x.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(bad)?;
            if v.len() != dim {
                return Err(Error::invalid_arg(format!(
                    "field '{}' has {} dims, expected {dim}",
                    field.name,
                    v.len()
                )));
            }
            Ok(FieldValue::DenseVector(v))
        }
        FieldType::SparseVector => {
            let obj = value.as_object().ok_or_else(bad)?;
            let mut sparse = SparseVector::new();
            for (k, w) in obj {
                let idx = k.parse::<u32>().map_err(|_| bad())?;
                let w = w.as_f64().ok_or_else(bad)? as f32;
                sparse.insert(idx, w);
            }
            Ok(FieldValue::SparseVector(sparse))
        }
        FieldType::Unknown => Err(bad()),
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Cuts `s` to at most `max` bytes on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
