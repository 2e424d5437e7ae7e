//! Schema definition and type inference for datasets.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    String,
    Boolean,
    Null,
    Unknown,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Boolean)
    }
}

/// Ordered schema of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
}

/// Schema for a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
}

impl SchemaDefinition {
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of a column that must be present.
    pub fn require(&self, name: &str) -> Result<usize, PipelineError> {
        self.position(name).ok_or_else(|| {
            PipelineError::schema(format!(
                "column '{name}' not found (available: {})",
                self.names().join(", ")
            ))
        })
    }

    /// Names of every column except `target`.
    pub fn feature_names(&self, target: &str) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.name != target)
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Parse a raw text cell into a typed JSON value.
pub fn parse_cell(raw: &str) -> Value {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan") {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        Value::Number(i.into())
    } else if let Ok(f) = s.parse::<f64>() {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    } else if s == "true" || s == "false" {
        Value::Bool(s == "true")
    } else {
        Value::String(s.to_string())
    }
}

/// Numeric view of a cell; `None` for nulls and non-numeric text.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Infer column type from a sample of values.
pub fn infer_column_type<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
    let mut seen_any = false;
    let mut has_int = false;
    let mut has_float = false;
    let mut has_bool = false;
    let mut has_string = false;

    for v in values {
        match v {
            Value::Null => continue,
            Value::Number(n) => {
                if n.is_f64() {
                    has_float = true;
                } else {
                    has_int = true;
                }
            }
            Value::Bool(_) => has_bool = true,
            Value::String(_) => has_string = true,
            _ => {}
        }
        seen_any = true;
    }

    if !seen_any {
        return ColumnType::Null;
    }
    if has_string {
        return ColumnType::String;
    }
    if has_float {
        return ColumnType::Float;
    }
    if has_int {
        return ColumnType::Integer;
    }
    if has_bool {
        return ColumnType::Boolean;
    }
    ColumnType::Unknown
}

/// Infer schema from column names and rows.
pub fn infer_schema(columns: &[String], rows: &[Vec<Value>]) -> SchemaDefinition {
    let columns = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values = rows.iter().filter_map(|row| row.get(i));
            let dtype = infer_column_type(values);
            let nullable = rows
                .iter()
                .any(|row| row.get(i).is_none_or(|v| v.is_null()));
            ColumnSchema {
                name: name.clone(),
                dtype,
                nullable,
            }
        })
        .collect();

    SchemaDefinition { columns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell("3"), json!(3));
        assert_eq!(parse_cell(" 5.1 "), json!(5.1));
        assert_eq!(parse_cell("\"setosa\""), json!("setosa"));
        assert_eq!(parse_cell("true"), json!(true));
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("NaN"), Value::Null);
    }

    #[test]
    fn test_infer_column_type() {
        assert_eq!(infer_column_type(&[json!(1), json!(2)]), ColumnType::Integer);
        assert_eq!(infer_column_type(&[json!(1), json!(2.5)]), ColumnType::Float);
        assert_eq!(infer_column_type(&[json!(1), json!("a")]), ColumnType::String);
        assert_eq!(infer_column_type(&[Value::Null]), ColumnType::Null);
    }

    #[test]
    fn test_infer_schema_tracks_nulls() {
        let columns = vec!["name".to_string(), "age".to_string()];
        let rows = vec![
            vec![json!("Alice"), json!(30)],
            vec![json!("Bob"), Value::Null],
        ];
        let schema = infer_schema(&columns, &rows);
        assert_eq!(schema.columns[0].dtype, ColumnType::String);
        assert!(!schema.columns[0].nullable);
        assert_eq!(schema.columns[1].dtype, ColumnType::Integer);
        assert!(schema.columns[1].nullable);
    }

    #[test]
    fn test_require_reports_available_columns() {
        let schema = infer_schema(&["a".to_string(), "b".to_string()], &[]);
        let err = schema.require("target").unwrap_err();
        assert!(err.to_string().contains("available: a, b"));
        assert_eq!(schema.feature_names("b"), vec!["a".to_string()]);
    }
}
