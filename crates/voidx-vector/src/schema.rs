//! Backend-facing collection schema: the physical columns a collection is
//! created with, as opposed to the caller-facing `Field` model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cap for text columns.
pub const MAX_TEXT_LENGTH: u32 = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int64,
    VarChar { max_length: u32 },
    FloatVector { dim: usize },
    SparseFloatVector,
}

impl DataType {
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::FloatVector { .. } | Self::SparseFloatVector)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::VarChar { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub is_primary: bool,
    pub nullable: bool,
    pub description: String,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_primary: false,
            nullable: false,
            description: String::new(),
        }
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub columns: Vec<ColumnSpec>,
    pub auto_id: bool,
    pub enable_dynamic_field: bool,
}

impl CollectionSchema {
    /// Fixed-schema collection with caller-supplied primary keys.
    pub fn fixed(columns: Vec<ColumnSpec>) -> Self {
        Self { columns, auto_id: false, enable_dynamic_field: false }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary(&self) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.is_primary)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Non-vector columns: what a search materializes.
    pub fn scalar_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.data_type.is_vector())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCollection {
    pub name: String,
    pub schema: CollectionSchema,
    pub shard_num: u32,
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub schema: CollectionSchema,
    pub shard_num: u32,
    pub properties: BTreeMap<String, String>,
}
