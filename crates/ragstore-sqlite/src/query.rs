use ragstore_core::{Result, RetrievalError, SearchOptions};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// A `WHERE` body plus its positional parameters.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new(base: &str, params: Vec<SqlValue>) -> Self {
        Self {
            sql: base.to_string(),
            params,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(" AND ");
        self.sql.push_str(fragment);
    }

    /// Add metadata filters and id exclusions from `options`.
    ///
    /// JSON paths are bound as parameters; only the value shape decides the SQL.
    pub fn with_options(mut self, options: &SearchOptions) -> Result<Self> {
        for (key, expected) in &options.filter {
            let path = json_path(key)?;
            match expected {
                Value::Array(values) if values.is_empty() => {}
                Value::Array(values) => {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    self.push(&format!("json_extract(metadata, ?) IN ({placeholders})"));
                    self.params.push(SqlValue::Text(path));
                    self.params.extend(values.iter().map(to_sql_value));
                }
                Value::Null => {
                    self.push("json_extract(metadata, ?) IS NULL");
                    self.params.push(SqlValue::Text(path));
                }
                value => {
                    self.push("json_extract(metadata, ?) = ?");
                    self.params.push(SqlValue::Text(path));
                    self.params.push(to_sql_value(value));
                }
            }
        }
        if !options.exclude_ids.is_empty() {
            let placeholders = vec!["?"; options.exclude_ids.len()].join(", ");
            self.push(&format!("id NOT IN ({placeholders})"));
            self.params
                .extend(options.exclude_ids.iter().cloned().map(SqlValue::Text));
        }
        Ok(self)
    }
}

/// `$."key"`, so keys with dots or spaces address a single top-level field.
fn json_path(key: &str) -> Result<String> {
    if key.is_empty() || key.contains('"') {
        return Err(RetrievalError::Validation(format!(
            "unsupported metadata filter key: {key:?}"
        )));
    }
    Ok(format!("$.\"{key}\""))
}

/// Match what `json_extract` yields for the same JSON value.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
