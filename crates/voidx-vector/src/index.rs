pub use voidx_core::config::IndexConfig;

/// One ANN index on one vector column.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub field_name: String,
    pub index_name: String,
    pub metric: String,
    pub config: IndexConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    InProgress,
    Finished,
    Failed(String),
}
