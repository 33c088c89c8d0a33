use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use voidx_core::cancel::CancellationToken;
use voidx_core::config::IndexConfig;
use voidx_core::types::SparseVector;
use voidx_core::{Error, Result};
use voidx_vector::collection::{ensure_collection, ensure_indexes, ensure_loaded, ensure_partition};
use voidx_vector::memory::FailPoint;
use voidx_vector::*;

const POLL: Duration = Duration::from_millis(5);

fn create_req(name: &str) -> CreateCollection {
    CreateCollection {
        name: name.to_string(),
        schema: CollectionSchema::fixed(vec![
            ColumnSpec::new("id", DataType::Int64).primary(),
            ColumnSpec::new("text", DataType::VarChar { max_length: 64 }),
            ColumnSpec::new("tag", DataType::Int64).nullable(true),
            ColumnSpec::new("dense_text", DataType::FloatVector { dim: 2 }),
            ColumnSpec::new("sparse_text", DataType::SparseFloatVector),
        ]),
        shard_num: 1,
        properties: BTreeMap::new(),
    }
}

fn index_specs() -> Vec<IndexSpec> {
    vec![
        IndexSpec {
            field_name: "dense_text".into(),
            index_name: "index_dense_text".into(),
            metric: "IP".into(),
            config: IndexConfig::hnsw(30, 360),
        },
        IndexSpec {
            field_name: "sparse_text".into(),
            index_name: "index_sparse_text".into(),
            metric: "IP".into(),
            config: IndexConfig::sparse_inverted(0.2),
        },
    ]
}

fn row(id: i64, text: &str, tag: Option<i64>, dense: [f32; 2], sparse: &[(u32, f32)]) -> Row {
    let mut r = Row::new();
    r.insert("id".into(), FieldValue::Int64(id));
    r.insert("text".into(), FieldValue::Text(text.into()));
    r.insert("tag".into(), tag.map(FieldValue::Int64).unwrap_or(FieldValue::Null));
    r.insert("dense_text".into(), FieldValue::DenseVector(dense.to_vec()));
    let sparse: SparseVector = sparse.iter().copied().collect();
    r.insert("sparse_text".into(), FieldValue::SparseVector(sparse));
    r
}

async fn ready(client: &MemoryClient, name: &str) {
    let token = CancellationToken::new();
    ensure_collection(client, &create_req(name), &token).await.expect("collection");
    ensure_indexes(client, name, &index_specs(), POLL, &token).await.expect("indexes");
    assert!(ensure_loaded(client, name, POLL, &token).await.expect("load"));
}

fn dense_search(name: &str, q: [f32; 2], filter: Option<&str>) -> AnnSearch {
    AnnSearch {
        collection: name.into(),
        anns_field: "dense_text".into(),
        primary_key: "id".into(),
        vector: QueryVector::Dense(q.to_vec()),
        metric: "IP".into(),
        limit: 10,
        filter: filter.map(str::to_string),
        partitions: vec![],
        output_fields: vec!["id".into(), "text".into(), "tag".into()],
        params: Default::default(),
    }
}

#[tokio::test]
async fn ensure_helpers_are_idempotent() {
    let client = MemoryClient::new();
    let token = CancellationToken::new();
    assert!(ensure_collection(&client, &create_req("c"), &token).await.unwrap());
    assert_eq!(ensure_indexes(&client, "c", &index_specs(), POLL, &token).await.unwrap(), 2);
    assert!(ensure_loaded(&client, "c", POLL, &token).await.unwrap());
    let writes = client.write_count();

    assert!(!ensure_collection(&client, &create_req("c"), &token).await.unwrap());
    assert_eq!(ensure_indexes(&client, "c", &index_specs(), POLL, &token).await.unwrap(), 0);
    assert!(ensure_loaded(&client, "c", POLL, &token).await.unwrap());
    assert_eq!(client.write_count(), writes, "second pass issues no writes");
}

#[tokio::test]
async fn ensure_loaded_maps_transitions() {
    let client = MemoryClient::new();
    let token = CancellationToken::new();
    assert!(!ensure_loaded(&client, "absent", POLL, &token).await.unwrap());

    ready(&client, "c").await;
    client.set_load_state("c", LoadState::Loading).unwrap();
    let err = ensure_loaded(&client, "c", POLL, &token).await.unwrap_err();
    assert!(matches!(err, Error::Transient(_)));

    client.set_load_state("c", LoadState::Unloading).unwrap();
    assert!(!ensure_loaded(&client, "c", POLL, &token).await.unwrap());
}

#[tokio::test]
async fn cancelled_token_stops_before_any_write() {
    let client = MemoryClient::new();
    let token = CancellationToken::new();
    token.cancel();
    let err = ensure_collection(&client, &create_req("c"), &token).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(client.write_count(), 0);
}

#[tokio::test]
async fn search_ranks_by_inner_product_and_filters() {
    let client = MemoryClient::new();
    ready(&client, "c").await;
    let rows = vec![
        row(1, "alpha", Some(10), [1.0, 0.0], &[(1, 1.0)]),
        row(2, "beta", Some(20), [0.6, 0.8], &[(2, 1.0)]),
        row(3, "alphabet", None, [0.0, 1.0], &[(1, 0.5), (2, 0.5)]),
    ];
    assert_eq!(client.insert("c", None, &rows).await.unwrap(), 3);

    let hits = client.search(&dense_search("c", [1.0, 0.0], None)).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(hits[0].fields["text"], "alpha");
    assert!(hits[2].fields["tag"].is_null());

    let prefixed = dense_search("c", [1.0, 0.0], Some(r#"text like "alpha%""#));
    let hits = client.search(&prefixed).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1, 3]);

    let either = dense_search("c", [1.0, 0.0], Some("tag in [20, 30] || id == 3"));
    let hits = client.search(&either).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![2, 3]);

    let mut sparse = dense_search("c", [0.0, 0.0], None);
    sparse.anns_field = "sparse_text".into();
    sparse.vector = QueryVector::Sparse([(2, 1.0)].into_iter().collect());
    let hits = client.search(&sparse).await.unwrap();
    assert_eq!(hits[0].id, 2);
    assert!((hits[1].score - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn insert_rejects_duplicates_and_bad_rows_atomically() {
    let client = MemoryClient::new();
    ready(&client, "c").await;
    client.insert("c", None, &[row(1, "a", None, [1.0, 0.0], &[])]).await.unwrap();

    let err = client
        .insert(
            "c",
            None,
            &[row(2, "b", None, [1.0, 0.0], &[]), row(1, "dup", None, [0.0, 1.0], &[])],
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Backend"), "{err}");
    assert_eq!(client.row_count("c").unwrap(), 1, "rejected batch writes nothing");

    let mut bad = row(5, "x", None, [1.0, 0.0], &[]);
    bad.insert("dense_text".into(), FieldValue::DenseVector(vec![1.0, 0.0, 0.0]));
    assert!(client.insert("c", None, &[bad]).await.is_err());
}

#[tokio::test]
async fn partitions_scope_search_and_delete() {
    let client = MemoryClient::new();
    ready(&client, "c").await;
    let token = CancellationToken::new();
    ensure_partition(&client, "c", "p_10", &token).await.unwrap();
    ensure_partition(&client, "c", "p_10", &token).await.unwrap();
    client.insert("c", Some("p_10"), &[row(1, "a", Some(10), [1.0, 0.0], &[])]).await.unwrap();
    client.insert("c", None, &[row(2, "b", None, [1.0, 0.0], &[])]).await.unwrap();

    let mut req = dense_search("c", [1.0, 0.0], None);
    req.partitions = vec!["p_10".into()];
    let hits = client.search(&req).await.unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![1]);

    req.partitions = vec!["p_99".into()];
    assert!(client.search(&req).await.is_err());

    client.delete("c", "id in [1, 2]").await.unwrap();
    assert_eq!(client.row_count("c").unwrap(), 0);
    // deleted keys can be written again
    client.insert("c", None, &[row(1, "again", None, [1.0, 0.0], &[])]).await.unwrap();
}

#[tokio::test]
async fn search_requires_loaded_collection() {
    let client = MemoryClient::new();
    let token = CancellationToken::new();
    ensure_collection(&client, &create_req("c"), &token).await.unwrap();
    assert!(client.search(&dense_search("c", [1.0, 0.0], None)).await.is_err());

    // loading without indexes is refused
    assert!(client.load_collection("c").await.is_err());
}

#[tokio::test]
async fn injected_failure_fires_once() {
    let client = MemoryClient::new();
    let token = CancellationToken::new();
    ensure_collection(&client, &create_req("c"), &token).await.unwrap();
    client.fail_next(FailPoint::CreateIndex);
    assert!(ensure_indexes(&client, "c", &index_specs(), POLL, &token).await.is_err());
    assert_eq!(ensure_indexes(&client, "c", &index_specs(), POLL, &token).await.unwrap(), 2);
}

/// Answers the first `stale` existence checks with "absent", like a reader
/// that raced a concurrent creator.
struct StaleClient {
    inner: MemoryClient,
    stale: AtomicUsize,
}

impl StaleClient {
    fn new(inner: MemoryClient, stale: usize) -> Self {
        Self { inner, stale: AtomicUsize::new(stale) }
    }

    fn is_stale(&self) -> bool {
        self.stale
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl VectorClient for StaleClient {
    fn kind(&self) -> &'static str {
        "stale"
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(!self.is_stale() && self.inner.has_collection(name).await?)
    }

    async fn create_collection(&self, req: &CreateCollection) -> Result<()> {
        self.inner.create_collection(req).await
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionInfo> {
        self.inner.describe_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.inner.drop_collection(name).await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>> {
        if self.is_stale() {
            return Ok(Vec::new());
        }
        self.inner.list_indexes(collection).await
    }

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()> {
        self.inner.create_index(collection, spec).await
    }

    async fn index_state(&self, collection: &str, index_name: &str) -> Result<IndexState> {
        self.inner.index_state(collection, index_name).await
    }

    async fn load_state(&self, collection: &str) -> Result<LoadState> {
        self.inner.load_state(collection).await
    }

    async fn load_collection(&self, collection: &str) -> Result<()> {
        self.inner.load_collection(collection).await
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool> {
        Ok(!self.is_stale() && self.inner.has_partition(collection, partition).await?)
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<()> {
        self.inner.create_partition(collection, partition).await
    }

    async fn insert(
        &self,
        collection: &str,
        partition: Option<&str>,
        rows: &[Row],
    ) -> Result<usize> {
        self.inner.insert(collection, partition, rows).await
    }

    async fn search(&self, req: &AnnSearch) -> Result<Vec<Hit>> {
        self.inner.search(req).await
    }

    async fn delete(&self, collection: &str, filter: &str) -> Result<()> {
        self.inner.delete(collection, filter).await
    }
}

#[tokio::test]
async fn ensure_helpers_accept_losing_a_create_race() {
    let memory = MemoryClient::new();
    ready(&memory, "c").await;
    memory.create_partition("c", "shared").await.unwrap();
    let writes = memory.write_count();
    let token = CancellationToken::new();

    let client = StaleClient::new(memory, 1);
    assert!(!ensure_collection(&client, &create_req("c"), &token).await.unwrap());

    client.stale.store(1, Ordering::SeqCst);
    assert_eq!(ensure_indexes(&client, "c", &index_specs(), POLL, &token).await.unwrap(), 0);

    client.stale.store(1, Ordering::SeqCst);
    ensure_partition(&client, "c", "shared", &token).await.unwrap();

    assert_eq!(client.inner.write_count(), writes, "nothing was created twice");
    assert_eq!(
        client.inner.partition_names("c").unwrap(),
        vec!["_default".to_string(), "shared".to_string()]
    );
}

#[tokio::test]
async fn create_failures_other_than_conflict_still_surface() {
    let memory = MemoryClient::new();
    let token = CancellationToken::new();
    memory.fail_next(FailPoint::CreateCollection);
    let err = ensure_collection(&memory, &create_req("other"), &token).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!memory.has_collection("other").await.unwrap());
}
