//! Caller-facing field model and its mapping onto physical columns.
//!
//! An indexable text field `F` is stored as `F` and vectorized into
//! `dense_F` (index `index_dense_F`) and, in hybrid mode, `sparse_F`
//! (index `index_sparse_F`). These names are persisted; do not change them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use voidx_core::config::IndexConfig;
use voidx_core::{Error, Result};
use voidx_vector::schema::MAX_TEXT_LENGTH;
use voidx_vector::{CollectionSchema, ColumnSpec, DataType, IndexSpec};

pub const DEFAULT_PRIMARY_KEY: &str = "id";
pub const CREATOR_ID: &str = "creator_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Int64,
    Text,
    DenseVector,
    SparseVector,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub indexing: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            description: String::new(),
            nullable: false,
            is_primary: false,
            indexing: false,
        }
    }

    pub fn int64(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Int64)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexing = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_indexable(&self) -> bool {
        self.indexing && self.field_type == FieldType::Text
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.field_type, FieldType::DenseVector | FieldType::SparseVector)
    }
}

pub fn dense_column(field: &str) -> String {
    format!("dense_{field}")
}

pub fn sparse_column(field: &str) -> String {
    format!("sparse_{field}")
}

pub fn dense_index_name(field: &str) -> String {
    format!("index_dense_{field}")
}

pub fn sparse_index_name(field: &str) -> String {
    format!("index_sparse_{field}")
}

/// Index name for a caller-declared vector field.
pub fn vector_index_name(field: &str) -> String {
    format!("index_{field}")
}

/// Index definitions shared by every collection a manager creates.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefaults {
    pub dense: IndexConfig,
    pub dense_metric: String,
    pub sparse: IndexConfig,
    pub sparse_metric: String,
}

/// A validated field list with the reserved fields filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSet {
    fields: Vec<Field>,
    primary: usize,
}

impl FieldSet {
    /// Validates caller fields and adds `id` (when no primary is given) and
    /// `creator_id` (when absent).
    pub fn resolve(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::new();
        for f in &fields {
            if f.name.trim().is_empty() {
                return Err(Error::invalid_arg("field name must not be empty"));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(Error::invalid_arg(format!("duplicate field '{}'", f.name)));
            }
            if f.field_type == FieldType::Unknown {
                let msg = format!("field '{}' has an unsupported type", f.name);
                return Err(Error::invalid_arg(msg));
            }
            if f.indexing && f.field_type != FieldType::Text {
                return Err(Error::invalid_arg(format!(
                    "field '{}' cannot be indexed: only text fields are vectorized",
                    f.name
                )));
            }
            if f.is_primary && (f.field_type != FieldType::Int64 || f.nullable) {
                let msg = format!("primary field '{}' must be a non-null int64", f.name);
                return Err(Error::invalid_arg(msg));
            }
        }

        let texts: Vec<&str> = fields
            .iter()
            .filter(|f| f.field_type == FieldType::Text)
            .map(|f| f.name.as_str())
            .collect();
        if let Some(clash) = fields
            .iter()
            .find(|f| texts.iter().any(|t| f.name == dense_column(t) || f.name == sparse_column(t)))
        {
            let msg = format!("field name '{}' is reserved for a derived column", clash.name);
            return Err(Error::invalid_arg(msg));
        }

        let primaries = fields.iter().filter(|f| f.is_primary).count();
        if primaries > 1 {
            return Err(Error::invalid_arg("at most one primary field is allowed"));
        }

        let mut out = Vec::with_capacity(fields.len() + 2);
        if primaries == 0 {
            if seen.contains(DEFAULT_PRIMARY_KEY) {
                return Err(Error::invalid_arg(format!(
                    "field '{DEFAULT_PRIMARY_KEY}' is reserved for the primary key; mark it primary"
                )));
            }
            out.push(Field::int64(DEFAULT_PRIMARY_KEY).primary());
        }
        let has_creator = seen.contains(CREATOR_ID);
        out.extend(fields);
        if !has_creator {
            out.push(Field::int64(CREATOR_ID).nullable());
        }
        Self::with_primary(out)
    }

    /// Rebuilds the field list of an existing collection from its columns.
    pub fn from_schema(schema: &CollectionSchema) -> Result<Self> {
        let names: HashSet<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        let derived: HashSet<String> = schema
            .columns
            .iter()
            .filter(|c| c.data_type.is_text() && names.contains(dense_column(&c.name).as_str()))
            .flat_map(|c| [dense_column(&c.name), sparse_column(&c.name)])
            .collect();

        let mut fields = Vec::new();
        for col in &schema.columns {
            if derived.contains(&col.name) {
                continue;
            }
            let field_type = match col.data_type {
                DataType::Int64 => FieldType::Int64,
                DataType::VarChar { .. } => FieldType::Text,
                DataType::FloatVector { .. } => FieldType::DenseVector,
                DataType::SparseFloatVector => FieldType::SparseVector,
            };
            let indexing =
                field_type == FieldType::Text && names.contains(dense_column(&col.name).as_str());
            fields.push(Field {
                name: col.name.clone(),
                field_type,
                description: col.description.clone(),
                nullable: col.nullable,
                is_primary: col.is_primary,
                indexing,
            });
        }
        Self::with_primary(fields)
    }

    fn with_primary(fields: Vec<Field>) -> Result<Self> {
        let primary = fields
            .iter()
            .position(|f| f.is_primary)
            .ok_or_else(|| Error::invalid_arg("collection has no primary key"))?;
        Ok(Self { fields, primary })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary(&self) -> &Field {
        &self.fields[self.primary]
    }

    pub fn indexable(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_indexable())
    }

    /// Columns returned with search results.
    pub fn scalar_names(&self) -> Vec<String> {
        self.fields.iter().filter(|f| !f.is_vector()).map(|f| f.name.clone()).collect()
    }

    pub fn to_schema(&self, dim: usize, hybrid: bool) -> CollectionSchema {
        let mut columns = Vec::new();
        for f in &self.fields {
            let data_type = match f.field_type {
                FieldType::Int64 | FieldType::Unknown => DataType::Int64,
                FieldType::Text => DataType::VarChar { max_length: MAX_TEXT_LENGTH },
                FieldType::DenseVector => DataType::FloatVector { dim },
                FieldType::SparseVector => DataType::SparseFloatVector,
            };
            let mut col = ColumnSpec::new(&f.name, data_type)
                .nullable(f.nullable)
                .described(&f.description);
            col.is_primary = f.is_primary;
            columns.push(col);
            if f.is_indexable() {
                columns.push(ColumnSpec::new(dense_column(&f.name), DataType::FloatVector { dim }));
                if hybrid {
                    let sparse = sparse_column(&f.name);
                    columns.push(ColumnSpec::new(sparse, DataType::SparseFloatVector));
                }
            }
        }
        CollectionSchema::fixed(columns)
    }

    /// One index per vector column; the backend refuses to load otherwise.
    pub fn index_specs(&self, hybrid: bool, defaults: &IndexDefaults) -> Vec<IndexSpec> {
        let dense = |field_name: String, index_name: String| IndexSpec {
            field_name,
            index_name,
            metric: defaults.dense_metric.clone(),
            config: defaults.dense.clone(),
        };
        let sparse = |field_name: String, index_name: String| IndexSpec {
            field_name,
            index_name,
            metric: defaults.sparse_metric.clone(),
            config: defaults.sparse.clone(),
        };
        let mut specs = Vec::new();
        for f in &self.fields {
            match f.field_type {
                FieldType::Text if f.indexing => {
                    specs.push(dense(dense_column(&f.name), dense_index_name(&f.name)));
                    if hybrid {
                        specs.push(sparse(sparse_column(&f.name), sparse_index_name(&f.name)));
                    }
                }
                FieldType::DenseVector => {
                    specs.push(dense(f.name.clone(), vector_index_name(&f.name)))
                }
                FieldType::SparseVector => {
                    specs.push(sparse(f.name.clone(), vector_index_name(&f.name)))
                }
                _ => {}
            }
        }
        specs
    }
}
