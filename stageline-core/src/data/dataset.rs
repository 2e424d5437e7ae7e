//! In-memory tabular dataset passed between stages.

use crate::data::schema::{SchemaDefinition, infer_schema, value_as_f64};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows of typed cells under an ordered schema.
///
/// `row_ids` holds the position each row had in the source table, so
/// partitions of one source can be compared by identity after shuffling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub schema: SchemaDefinition,
    pub rows: Vec<Vec<Value>>,
    pub row_ids: Vec<usize>,
}

impl Dataset {
    /// Build a dataset from column names and rows, inferring the schema.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, PipelineError> {
        let mut seen = std::collections::HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::schema(format!("duplicate column '{name}'")));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(PipelineError::schema(format!(
                    "row {i} has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
        }
        let schema = infer_schema(&columns, &rows);
        let row_ids = (0..rows.len()).collect();
        Ok(Self {
            schema,
            rows,
            row_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.contains(name)
    }

    /// All values of one column.
    pub fn column(&self, name: &str) -> Result<Vec<Value>, PipelineError> {
        let idx = self.schema.require(name)?;
        Ok(self.rows.iter().map(|r| r[idx].clone()).collect())
    }

    /// Rows at the given positions, in the given order.
    pub fn select_rows(&self, positions: &[usize]) -> Self {
        let rows = positions.iter().map(|&p| self.rows[p].clone()).collect();
        let row_ids = positions.iter().map(|&p| self.row_ids[p]).collect();
        Self {
            schema: self.schema.clone(),
            rows,
            row_ids,
        }
    }

    /// Keep rows for which `keep` returns true.
    pub fn filter_rows(&self, mut keep: impl FnMut(&[Value]) -> bool) -> Self {
        let positions: Vec<usize> = (0..self.rows.len())
            .filter(|&i| keep(&self.rows[i]))
            .collect();
        let mut out = self.select_rows(&positions);
        out.refresh_schema();
        out
    }

    /// Remove the named columns; every name must exist.
    pub fn drop_columns(&self, names: &[String]) -> Result<Self, PipelineError> {
        let mut drop = Vec::with_capacity(names.len());
        for name in names {
            drop.push(self.schema.require(name)?);
        }
        let keep: Vec<usize> = (0..self.schema.columns.len())
            .filter(|i| !drop.contains(i))
            .collect();
        Ok(self.project(&keep))
    }

    /// Reorder/select columns by name; every name must exist.
    pub fn select_columns(&self, names: &[String]) -> Result<Self, PipelineError> {
        let keep = names
            .iter()
            .map(|n| self.schema.require(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.project(&keep))
    }

    fn project(&self, keep: &[usize]) -> Self {
        let columns = keep
            .iter()
            .map(|&i| self.schema.columns[i].clone())
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Self {
            schema: SchemaDefinition { columns },
            rows,
            row_ids: self.row_ids.clone(),
        }
    }

    /// Rename every column, in order.
    pub fn rename_columns(&mut self, names: &[String]) -> Result<(), PipelineError> {
        if names.len() != self.schema.columns.len() {
            return Err(PipelineError::schema(format!(
                "cannot rename {} columns with {} names",
                self.schema.columns.len(),
                names.len()
            )));
        }
        for (col, name) in self.schema.columns.iter_mut().zip(names) {
            col.name = name.clone();
        }
        Ok(())
    }

    /// Append a column of values, one per row.
    pub fn push_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), PipelineError> {
        if self.has_column(name) {
            return Err(PipelineError::schema(format!("column '{name}' already exists")));
        }
        if values.len() != self.rows.len() {
            return Err(PipelineError::schema(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        for (row, v) in self.rows.iter_mut().zip(values) {
            row.push(v);
        }
        self.refresh_schema();
        Ok(())
    }

    /// Re-infer column types from the current rows.
    pub fn refresh_schema(&mut self) {
        let names = self.column_names();
        self.schema = infer_schema(&names, &self.rows);
    }

    /// Numeric matrix of the named columns, row-major.
    pub fn feature_matrix(&self, features: &[String]) -> Result<Vec<Vec<f64>>, PipelineError> {
        let idx = features
            .iter()
            .map(|n| self.schema.require(n))
            .collect::<Result<Vec<_>, _>>()?;
        self.rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                idx.iter()
                    .zip(features)
                    .map(|(&i, name)| {
                        value_as_f64(&row[i]).ok_or_else(|| {
                            PipelineError::schema(format!(
                                "non-numeric value {} in feature column '{name}' at row {r}",
                                row[i]
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample() -> Dataset {
        Dataset::new(
            vec!["a".into(), "b".into(), "target".into()],
            vec![
                vec![json!(1.0), json!(10), json!("x")],
                vec![json!(2.0), Value::Null, json!("y")],
                vec![json!(3.0), json!(30), json!("x")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_ragged_rows() {
        let err = Dataset::new(vec!["a".into()], vec![vec![json!(1), json!(2)]]).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }

    #[test]
    fn test_new_rejects_duplicate_columns() {
        assert!(Dataset::new(vec!["a".into(), "a".into()], vec![]).is_err());
    }

    #[test]
    fn test_select_rows_keeps_ids() {
        let ds = sample().select_rows(&[2, 0]);
        assert_eq!(ds.row_ids, vec![2, 0]);
        assert_eq!(ds.rows[0][0], json!(3.0));
    }

    #[test]
    fn test_drop_and_select_columns() {
        let ds = sample();
        let dropped = ds.drop_columns(&["b".into()]).unwrap();
        assert_eq!(dropped.column_names(), vec!["a", "target"]);
        assert!(ds.drop_columns(&["missing".into()]).is_err());

        let reordered = ds.select_columns(&["target".into(), "a".into()]).unwrap();
        assert_eq!(reordered.rows[1], vec![json!("y"), json!(2.0)]);
    }

    #[test]
    fn test_feature_matrix_rejects_nulls() {
        let ds = sample();
        assert_eq!(
            ds.feature_matrix(&["a".into()]).unwrap(),
            vec![vec![1.0], vec![2.0], vec![3.0]]
        );
        assert!(ds.feature_matrix(&["b".into()]).is_err());
        assert!(ds.feature_matrix(&["target".into()]).is_err());
    }

    #[test]
    fn test_push_column() {
        let mut ds = sample();
        ds.push_column("p", vec![json!(1), json!(2), json!(3)]).unwrap();
        assert_eq!(ds.column("p").unwrap().len(), 3);
        assert!(ds.push_column("p", vec![]).is_err());
    }
}
