use async_trait::async_trait;

use voidx_core::Result;

use crate::index::{IndexSpec, IndexState};
use crate::rows::Row;
use crate::schema::{CollectionInfo, CreateCollection};
use crate::search::{AnnSearch, Hit};

/// Serving state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    NotExist,
    NotLoad,
    Loading,
    Loaded,
    Unloading,
}

/// The vector database seam. One implementation talks to Milvus over REST,
/// the other keeps everything in process.
///
/// Lookups on a collection that does not exist return `Error::NotFound`,
/// except `has_collection` and `load_state` which report absence as a value.
#[async_trait]
pub trait VectorClient: Send + Sync {
    /// Short backend identifier, e.g. `milvus`.
    fn kind(&self) -> &'static str;

    async fn has_collection(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, req: &CreateCollection) -> Result<()>;

    async fn describe_collection(&self, name: &str) -> Result<CollectionInfo>;

    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Index names present on the collection.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>>;

    async fn create_index(&self, collection: &str, spec: &IndexSpec) -> Result<()>;

    async fn index_state(&self, collection: &str, index_name: &str) -> Result<IndexState>;

    async fn load_state(&self, collection: &str) -> Result<LoadState>;

    /// Starts loading; completion is observed through `load_state`.
    async fn load_collection(&self, collection: &str) -> Result<()>;

    async fn has_partition(&self, collection: &str, partition: &str) -> Result<bool>;

    async fn create_partition(&self, collection: &str, partition: &str) -> Result<()>;

    /// Inserts rows into `partition` (the default partition when `None`) and
    /// returns the number written.
    async fn insert(
        &self,
        collection: &str,
        partition: Option<&str>,
        rows: &[Row],
    ) -> Result<usize>;

    async fn search(&self, req: &AnnSearch) -> Result<Vec<Hit>>;

    /// Deletes every row matching `filter`.
    async fn delete(&self, collection: &str, filter: &str) -> Result<()>;
}
