//! In-process backend with Milvus semantics: brute-force inner product,
//! partitions, load states and duplicate-key rejection. Used by tests and
//! by the CLI when no server is configured.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use voidx_core::{Error, Result};

use crate::client::{LoadState, VectorClient};
use crate::expr;
use crate::index::{IndexSpec, IndexState};
use crate::rows::{FieldValue, Row};
use crate::schema::{CollectionInfo, CreateCollection, DataType};
use crate::search::{AnnSearch, Hit, QueryVector};

pub const DEFAULT_PARTITION: &str = "_default";

/// Operations that can be made to fail once via [`MemoryClient::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateCollection,
    CreateIndex,
    LoadCollection,
    Insert,
    Search,
    Delete,
}

struct MemCollection {
    info: CollectionInfo,
    indexes: BTreeMap<String, IndexSpec>,
    load_state: LoadState,
    /// Insertion-ordered rows per partition.
    partitions: BTreeMap<String, Vec<Row>>,
    primary_keys: HashSet<i64>,
}

impl MemCollection {
    fn primary_key(&self) -> Result<&str> {
        self.info
            .schema
            .primary()
            .map(|c| c.name.as_str())
            .ok_or_else(|| {
                let msg = format!("{} has no primary key", self.info.name);
                Error::backend("collection schema", msg)
            })
    }
}

#[derive(Default)]
pub struct MemoryClient {
    collections: Mutex<HashMap<String, MemCollection>>,
    failures: Mutex<HashSet<FailPoint>>,
    writes: AtomicU64,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of state-changing calls served so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Forces the load state, e.g. to simulate a collection mid-load.
    pub fn set_load_state(&self, collection: &str, state: LoadState) -> Result<()> {
        let mut guard = self.collections.lock();
        let coll = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        coll.load_state = state;
        Ok(())
    }

    /// The next call of `point` fails with a backend error.
    pub fn fail_next(&self, point: FailPoint) {
        self.failures.lock().insert(point);
    }

    /// Total stored rows across partitions.
    pub fn row_count(&self, collection: &str) -> Result<usize> {
        let guard = self.collections.lock();
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll.partitions.values().map(Vec::len).sum())
    }

    pub fn partition_row_count(&self, collection: &str, partition: &str) -> Result<usize> {
        let guard = self.collections.lock();
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll.partitions.get(partition).map(Vec::len).unwrap_or(0))
    }

    pub fn partition_names(&self, collection: &str) -> Result<Vec<String>> {
        let guard = self.collections.lock();
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll.partitions.keys().cloned().collect())
    }

    fn injected(&self, point: FailPoint) -> Result<()> {
        if self.failures.lock().remove(&point) {
            return Err(Error::backend(format!("{point:?}"), "injected failure"));
        }
        Ok(())
    }

    fn bump(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn missing(collection: &str) -> Error {
    Error::not_found(format!("collection '{collection}'"))
}

fn check_row(info: &CollectionInfo, row: &Row) -> Result<()> {
    for col in &info.schema.columns {
        let value = row.get(&col.name).unwrap_or(&FieldValue::Null);
        let ok = match (&col.data_type, value) {
            (_, FieldValue::Null) => col.nullable && !col.is_primary,
            (DataType::Int64, FieldValue::Int64(_)) => true,
            (DataType::VarChar { max_length }, FieldValue::Text(s)) => {
                s.len() <= *max_length as usize
            }
            (DataType::FloatVector { dim }, FieldValue::DenseVector(v)) => v.len() == *dim,
            (DataType::SparseFloatVector, FieldValue::SparseVector(_)) => true,
            _ => false,
        };
        if !ok {
            return Err(Error::backend(
                "insert rows",
                format!(
                    "column '{}' of {} rejects value {:?}",
                    col.name,
                    info.name,
                    value_kind(value)
                ),
            ));
        }
    }
    if let Some(extra) = row.keys().find(|k| info.schema.column(k).is_none()) {
        return Err(Error::backend("insert rows", format!("unknown column '{extra}'")));
    }
    Ok(())
}

fn value_kind(v: &FieldValue) -> &'static str {
    match v {
        FieldValue::Null => "null",
        FieldValue::Int64(_) => "int64",
        FieldValue::Text(_) => "text",
        FieldValue::DenseVector(_) => "dense vector",
        FieldValue::SparseVector(_) => "sparse vector",
    }
}

fn score(row: &Row, field: &str, query: &QueryVector) -> Option<f32> {
    match (row.get(field)?, query) {
        (FieldValue::DenseVector(v), QueryVector::Dense(q)) if v.len() == q.len() => {
            Some(v.iter().zip(q.iter()).map(|(a, b)| a * b).sum())
        }
        (FieldValue::SparseVector(v), QueryVector::Sparse(q)) => Some(v.dot(q)),
        _ => None,
    }
}

#[async_trait]
impl VectorClient for MemoryClient {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().contains_key(name))
    }

    async fn create_collection(&self, req: &CreateCollection) -> Result<()> {
        self.injected(FailPoint::CreateCollection)?;
        let mut guard = self.collections.lock();
        if guard.contains_key(&req.name) {
            return Err(Error::Conflict(format!("collection '{}' already exists", req.name)));
        }
        if req.schema.primary().is_none() {
            let msg = format!("collection '{}' needs a primary key", req.name);
            return Err(Error::invalid_arg(msg));
        }
        let mut partitions = BTreeMap::new();
        partitions.insert(DEFAULT_PARTITION.to_string(), Vec::new());
        guard.insert(
            req.name.clone(),
            MemCollection {
                info: CollectionInfo {
                    name: req.name.clone(),
                    schema: req.schema.clone(),
                    shard_num: req.shard_num,
                    properties: req.properties.clone(),
                },
                indexes: BTreeMap::new(),
                load_state: LoadState::NotLoad,
                partitions,
                primary_keys: HashSet::new(),
            },
        );
        self.bump();
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionInfo> {
        let guard = self.collections.lock();
        guard.get(name).map(|c| c.info.clone()).ok_or_else(|| missing(name))
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        if self.collections.lock().remove(name).is_some() {
            self.bump();
        }
        Ok(())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        let guard = self.collections.lock();
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll.indexes.keys().cloned().collect())
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        self.injected(FailPoint::CreateIndex)?;
        let mut guard = self.collections.lock();
        let coll = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        let col = coll
            .info
            .schema
            .column(&spec.field_name)
            .ok_or_else(|| {
                Error::invalid_arg(format!("no column '{}' to index", spec.field_name))
            })?;
        if !col.data_type.is_vector() {
            return Err(Error::invalid_arg(format!("column '{}' is not a vector", spec.field_name)));
        }
        if coll.indexes.contains_key(&spec.index_name) {
            return Err(Error::Conflict(format!("index '{}' already exists", spec.index_name)));
        }
        coll.indexes.insert(spec.index_name.clone(), spec.clone());
        self.bump();
        Ok(())
    }

    async fn index_state(&self, collection: &str, index_name: &str) -> Result<IndexState> {
        let guard = self.collections.lock();
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        if coll.indexes.contains_key(index_name) {
            Ok(IndexState::Finished)
        } else {
            Err(Error::not_found(format!("index '{index_name}' on '{collection}'")))
        }
    }

    async fn load_state(&self, collection: &str) -> Result<LoadState> {
        let guard = self.collections.lock();
        Ok(guard.get(collection).map(|c| c.load_state).unwrap_or(LoadState::NotExist))
    }

    async fn load_collection(&self, collection: &str) -> Result<()> {
        self.injected(FailPoint::LoadCollection)?;
        let mut guard = self.collections.lock();
        let coll = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        let unindexed = coll
            .info
            .schema
            .columns
            .iter()
            .filter(|c| c.data_type.is_vector())
            .find(|c| !coll.indexes.values().any(|i| i.field_name == c.name));
        if let Some(col) = unindexed {
            let msg = format!("vector column '{}' has no index", col.name);
            return Err(Error::backend("load collection", msg));
        }
        coll.load_state = LoadState::Loaded;
        self.bump();
        Ok(())
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool> {
        let guard = self.collections.lock();
        let coll = guard.get(collection).ok_or_else(|| missing(collection))?;
        Ok(coll.partitions.contains_key(partition))
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<()> {
        let mut guard = self.collections.lock();
        let coll = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        if coll.partitions.contains_key(partition) {
            return Err(Error::Conflict(format!("partition '{partition}' already exists")));
        }
        coll.partitions.insert(partition.to_string(), Vec::new());
        self.bump();
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        partition: Option<&str>,
        rows: &[Row],
    ) -> Result<usize> {
        self.injected(FailPoint::Insert)?;
        let mut guard = self.collections.lock();
        let coll = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        let partition = partition.unwrap_or(DEFAULT_PARTITION);
        if !coll.partitions.contains_key(partition) {
            return Err(Error::backend("insert rows", format!("partition '{partition}' not found")));
        }
        let pk = coll.primary_key()?.to_string();

        // validate the whole batch first so a rejected insert writes nothing
        let mut batch_keys = HashSet::with_capacity(rows.len());
        for row in rows {
            check_row(&coll.info, row)?;
            let id = row.get(&pk).and_then(FieldValue::as_i64).ok_or_else(|| {
                Error::backend("insert rows", format!("row without integer primary key '{pk}'"))
            })?;
            if coll.primary_keys.contains(&id) || !batch_keys.insert(id) {
                return Err(Error::backend("insert rows", format!("duplicate primary key {id}")));
            }
        }
        coll.primary_keys.extend(batch_keys);
        if let Some(target) = coll.partitions.get_mut(partition) {
            target.extend(rows.iter().cloned());
        }
        self.bump();
        Ok(rows.len())
    }

    async fn search(&self, req: &AnnSearch) -> Result<Vec<Hit>> {
        self.injected(FailPoint::Search)?;
        let filter = expr::parse(req.filter.as_deref().unwrap_or(""))?;
        let guard = self.collections.lock();
        let coll = guard.get(&req.collection).ok_or_else(|| missing(&req.collection))?;
        if coll.load_state != LoadState::Loaded {
            let msg = format!("collection '{}' not loaded", req.collection);
            return Err(Error::backend("search", msg));
        }
        if !coll.indexes.values().any(|i| i.field_name == req.anns_field) {
            return Err(Error::backend("search", format!("no index on '{}'", req.anns_field)));
        }
        let pk = coll.primary_key()?;

        let selected: Vec<&Vec<Row>> = if req.partitions.is_empty() {
            coll.partitions.values().collect()
        } else {
            req.partitions
                .iter()
                .map(|p| {
                    coll.partitions
                        .get(p)
                        .ok_or_else(|| {
                            Error::backend("search", format!("partition '{p}' not found"))
                        })
                })
                .collect::<Result<_>>()?
        };

        let mut hits: Vec<Hit> = selected
            .into_iter()
            .flatten()
            .filter(|row| filter.eval(row))
            .filter_map(|row| {
                let s = score(row, &req.anns_field, &req.vector)?;
                let id = row.get(pk).and_then(FieldValue::as_i64)?;
                let fields = req
                    .output_fields
                    .iter()
                    .map(|f| (f.clone(), row.get(f).map(FieldValue::to_json).unwrap_or_default()))
                    .collect();
                Some(Hit { id, score: s, fields })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(req.limit);
        Ok(hits)
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<()> {
        self.injected(FailPoint::Delete)?;
        let filter = expr::parse(filter)?;
        let mut guard = self.collections.lock();
        let coll = guard.get_mut(collection).ok_or_else(|| missing(collection))?;
        let pk = coll.primary_key()?.to_string();
        let mut removed = Vec::new();
        for rows in coll.partitions.values_mut() {
            rows.retain(|row| {
                if filter.eval(row) {
                    if let Some(id) = row.get(&pk).and_then(FieldValue::as_i64) {
                        removed.push(id);
                    }
                    false
                } else {
                    true
                }
            });
        }
        for id in removed {
            coll.primary_keys.remove(&id);
        }
        self.bump();
        Ok(())
    }
}
