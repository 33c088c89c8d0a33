//! Typed filter DSL and its compilation to the backend's boolean
//! expression language.
//!
//! On the wire a filter is tagged by `op`:
//! `{"op":"and","children":[{"op":"eq","field":"creator_id","value":10}]}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use voidx_core::types::Document;
use voidx_core::{Error, Result};
use voidx_vector::expr::like_match;

use crate::field::{FieldSet, FieldType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl Scalar {
    /// Partition routing key for this value.
    pub fn partition_value(&self) -> String {
        match self {
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Str(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
        }
    }

    fn matches(&self, value: &Value) -> Option<bool> {
        let eq = match (self, value) {
            (_, Value::Null) => return None,
            (Scalar::Int(a), Value::Number(n)) => match n.as_i64() {
                Some(b) => *a == b,
                None => n.as_f64() == Some(*a as f64),
            },
            (Scalar::Float(a), Value::Number(n)) => n.as_f64() == Some(*a),
            (Scalar::Str(a), Value::String(b)) => a == b,
            (Scalar::Bool(a), Value::Bool(b)) => a == b,
            _ => false,
        };
        Some(eq)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    And {
        #[serde(default)]
        children: Vec<Filter>,
    },
    Or {
        #[serde(default)]
        children: Vec<Filter>,
    },
    Eq {
        field: String,
        value: Scalar,
    },
    Ne {
        field: String,
        value: Scalar,
    },
    Like {
        field: String,
        #[serde(alias = "value")]
        pattern: String,
    },
    In {
        field: String,
        values: Vec<Scalar>,
    },
}

impl Filter {
    pub fn and(children: Vec<Filter>) -> Self {
        Self::And { children }
    }

    pub fn or(children: Vec<Filter>) -> Self {
        Self::Or { children }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::Eq { field: field.into(), value: value.into() }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self::Ne { field: field.into(), value: value.into() }
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like { field: field.into(), pattern: pattern.into() }
    }

    pub fn is_in<V: Into<Scalar>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In { field: field.into(), values: values.into_iter().map(Into::into).collect() }
    }

    /// Compiles to a boolean expression after checking every leaf against
    /// the collection's fields.
    pub fn compile(&self, fields: &FieldSet) -> Result<String> {
        match self {
            Filter::And { children } => join(children, " && ", "true", fields),
            Filter::Or { children } => join(children, " || ", "false", fields),
            Filter::Eq { field, value } => {
                let ty = scalar_field(fields, field)?;
                Ok(format!("{field} == {}", literal(field, ty, value)?))
            }
            Filter::Ne { field, value } => {
                let ty = scalar_field(fields, field)?;
                Ok(format!("{field} != {}", literal(field, ty, value)?))
            }
            Filter::Like { field, pattern } => {
                if scalar_field(fields, field)? != FieldType::Text {
                    return Err(invalid(format!("like needs a text field, '{field}' is not")));
                }
                Ok(format!("{field} like {}", quote(pattern)))
            }
            Filter::In { field, values } => {
                let ty = scalar_field(fields, field)?;
                let items =
                    values.iter().map(|v| literal(field, ty, v)).collect::<Result<Vec<_>>>()?;
                Ok(format!("{field} in [{}]", items.join(", ")))
            }
        }
    }

    /// Evaluates the filter over a document, with the same semantics the
    /// backend applies to the compiled expression. Null never matches.
    pub fn matches(&self, doc: &Document) -> bool {
        let get = |field: &str| doc.get(field).unwrap_or(&Value::Null);
        match self {
            Filter::And { children } => children.iter().all(|c| c.matches(doc)),
            Filter::Or { children } => children.iter().any(|c| c.matches(doc)),
            Filter::Eq { field, value } => value.matches(get(field)) == Some(true),
            Filter::Ne { field, value } => value.matches(get(field)) == Some(false),
            Filter::Like { field, pattern } => {
                get(field).as_str().is_some_and(|s| like_match(s, pattern))
            }
            Filter::In { field, values } => {
                values.iter().any(|v| v.matches(get(field)) == Some(true))
            }
        }
    }

    /// Values pinned for `key` by an `eq`/`in` at the root, or by a root
    /// `and` child. Empty when the filter does not pin the key.
    pub fn partition_values(&self, key: &str) -> Vec<String> {
        fn pinned(f: &Filter, key: &str) -> Option<Vec<String>> {
            match f {
                Filter::Eq { field, value } if field == key => Some(vec![value.partition_value()]),
                Filter::In { field, values } if field == key => {
                    Some(values.iter().map(Scalar::partition_value).collect())
                }
                _ => None,
            }
        }
        match self {
            Filter::And { children } => {
                children.iter().find_map(|c| pinned(c, key)).unwrap_or_default()
            }
            other => pinned(other, key).unwrap_or_default(),
        }
    }
}

fn invalid(msg: String) -> Error {
    Error::InvalidArg(format!("invalid filter: {msg}"))
}

fn join(children: &[Filter], sep: &str, empty: &str, fields: &FieldSet) -> Result<String> {
    if children.is_empty() {
        return Ok(empty.to_string());
    }
    let parts = children.iter().map(|c| c.compile(fields)).collect::<Result<Vec<_>>>()?;
    Ok(format!("( {} )", parts.join(sep)))
}

fn scalar_field(fields: &FieldSet, name: &str) -> Result<FieldType> {
    let field = fields.get(name).ok_or_else(|| invalid(format!("unknown field '{name}'")))?;
    if field.is_vector() {
        return Err(invalid(format!("vector field '{name}' cannot be filtered")));
    }
    Ok(field.field_type)
}

fn literal(field: &str, ty: FieldType, value: &Scalar) -> Result<String> {
    match (ty, value) {
        (FieldType::Int64, Scalar::Int(v)) => Ok(v.to_string()),
        (FieldType::Int64, Scalar::Float(v)) if v.is_finite() => {
            if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                Ok((*v as i64).to_string())
            } else {
                Ok(v.to_string())
            }
        }
        (FieldType::Text, Scalar::Str(s)) => Ok(quote(s)),
        _ => Err(invalid(format!("value {value:?} does not fit field '{field}'"))),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}
