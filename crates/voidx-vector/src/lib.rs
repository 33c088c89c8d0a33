//! Vector database access: the [`VectorClient`] seam, a Milvus REST client,
//! an in-memory backend and the collection housekeeping built on top.

pub mod client;
pub mod collection;
pub mod expr;
pub mod index;
pub mod memory;
pub mod milvus;
pub mod rows;
pub mod schema;
pub mod search;

pub use client::{LoadState, VectorClient};
pub use index::{IndexSpec, IndexState};
pub use memory::MemoryClient;
pub use milvus::MilvusClient;
pub use rows::{FieldValue, Row};
pub use schema::{CollectionInfo, CollectionSchema, ColumnSpec, CreateCollection, DataType};
pub use search::{AnnSearch, Hit, QueryVector};
