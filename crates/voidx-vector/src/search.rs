use voidx_core::types::{DocId, Document, SparseVector};

#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

/// A single-vector ANN request against one vector column.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnSearch {
    pub collection: String,
    pub anns_field: String,
    pub primary_key: String,
    pub vector: QueryVector,
    pub metric: String,
    pub limit: usize,
    /// Boolean expression in the backend's filter language.
    pub filter: Option<String>,
    /// Empty means the whole collection.
    pub partitions: Vec<String>,
    pub output_fields: Vec<String>,
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// Raw hit: backend score (higher is better for IP) and requested fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: DocId,
    pub score: f32,
    pub fields: Document,
}
