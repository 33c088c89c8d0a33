use serde_json::Value;
use std::collections::BTreeMap;

use voidx_core::types::SparseVector;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Int64(i64),
    Text(String),
    DenseVector(Vec<f32>),
    SparseVector(SparseVector),
}

impl FieldValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON rendering used for result fields and REST payloads.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Int64(v) => Value::from(*v),
            Self::Text(s) => Value::from(s.as_str()),
            Self::DenseVector(v) => Value::from(v.clone()),
            Self::SparseVector(s) => {
                let obj = s.iter().map(|(i, w)| (i.to_string(), Value::from(w))).collect();
                Value::Object(obj)
            }
        }
    }
}

/// One physical row: column name to value.
pub type Row = BTreeMap<String, FieldValue>;
