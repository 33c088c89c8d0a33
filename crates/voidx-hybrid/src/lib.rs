//! Hybrid dense + sparse search store over a vector database.
//!
//! [`Manager`] owns the collection lifecycle; a [`SearchStore`] indexes,
//! retrieves and deletes documents in one loaded collection.

pub mod dsl;
pub mod field;
pub mod fusion;
mod indexer;
pub mod manager;
pub mod partition;
mod retriever;
mod store;

pub use dsl::{Filter, Scalar};
pub use field::{Field, FieldSet, FieldType};
pub use indexer::IndexOptions;
pub use manager::{CreateRequest, Manager, ManagerOptions};
pub use retriever::{MultiMatch, RetrieveOptions, DEFAULT_TOP_K};
pub use store::SearchStore;
