use serde_json::Value;

/// Maps a logical partition value to a backend-safe partition name.
///
/// Distinct values always map to distinct names:
/// * all-digit values get a `p_` prefix (`10` is stored as `p_10`);
/// * identifiers (`[A-Za-z_][A-Za-z0-9_]*`) are kept as is unless they start
///   with one of the reserved prefixes `p_` or `x_`;
/// * anything else becomes `x_` plus the hex of its UTF-8 bytes.
///
/// Persisted; keep stable.
pub fn partition_name(value: &str) -> String {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return format!("p_{value}");
    }
    if is_identifier(value) && !value.starts_with("p_") && !value.starts_with("x_") {
        return value.to_string();
    }
    format!("x_{}", hex::encode(value))
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Partition value carried by a document field. Null or missing values and
/// non-scalar values route to the default partition.
pub fn partition_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
