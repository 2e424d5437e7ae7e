//! Column scalers fitted on training rows and replayed unchanged later.
//!
//! Min-max: `x' = (x - min) / (max - min)`; standard: `x' = (x - mean) / std`
//! (population standard deviation). A constant column keeps a divisor of 1.

use crate::data::dataset::Dataset;
use crate::data::schema::value_as_f64;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scaling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerKind {
    MinMax,
    Standard,
}

/// Learned parameters for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnScale {
    pub column: String,
    pub offset: f64,
    pub divisor: f64,
}

/// A fitted scaler over a fixed set of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedScaler {
    pub kind: ScalerKind,
    pub columns: Vec<ColumnScale>,
}

impl FittedScaler {
    /// Learn per-column parameters from every numeric column not in `exclude`.
    pub fn fit(kind: ScalerKind, data: &Dataset, exclude: &[String]) -> Result<Self, PipelineError> {
        if data.is_empty() {
            return Err(PipelineError::invalid_input("cannot fit a scaler on empty data"));
        }
        let mut columns = Vec::new();
        for (idx, col) in data.schema.columns.iter().enumerate() {
            if exclude.contains(&col.name) || !col.dtype.is_numeric() {
                continue;
            }
            let values: Vec<f64> = data
                .rows
                .iter()
                .filter_map(|row| value_as_f64(&row[idx]))
                .collect();
            if values.is_empty() {
                continue;
            }
            let (offset, divisor) = match kind {
                ScalerKind::MinMax => {
                    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    (min, non_zero(max - min))
                }
                ScalerKind::Standard => {
                    let n = values.len() as f64;
                    let mean = values.iter().sum::<f64>() / n;
                    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                    (mean, non_zero(var.sqrt()))
                }
            };
            columns.push(ColumnScale {
                column: col.name.clone(),
                offset,
                divisor,
            });
        }
        Ok(Self { kind, columns })
    }

    /// Apply the learned parameters. Nulls pass through.
    pub fn transform(&self, data: &Dataset) -> Result<Dataset, PipelineError> {
        let mut out = data.clone();
        for scale in &self.columns {
            let idx = out.schema.require(&scale.column)?;
            for (r, row) in out.rows.iter_mut().enumerate() {
                let cell = &mut row[idx];
                if cell.is_null() {
                    continue;
                }
                let x = value_as_f64(cell).ok_or_else(|| {
                    PipelineError::schema(format!(
                        "non-numeric value {cell} in scaled column '{}' at row {r}",
                        scale.column
                    ))
                })?;
                let scaled = (x - scale.offset) / scale.divisor;
                *cell = serde_json::Number::from_f64(scaled)
                    .map(Value::Number)
                    .unwrap_or(Value::Null);
            }
        }
        out.refresh_schema();
        Ok(out)
    }
}

fn non_zero(divisor: f64) -> f64 {
    if divisor == 0.0 { 1.0 } else { divisor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame() -> Dataset {
        Dataset::new(
            vec!["a".into(), "c".into(), "target".into()],
            vec![
                vec![json!(0.0), json!(5), json!(1)],
                vec![json!(5.0), json!(5), json!(0)],
                vec![json!(10.0), json!(5), json!(1)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_min_max() {
        let data = frame();
        let scaler = FittedScaler::fit(ScalerKind::MinMax, &data, &["target".into()]).unwrap();
        let out = scaler.transform(&data).unwrap();
        assert_eq!(out.column("a").unwrap(), vec![json!(0.0), json!(0.5), json!(1.0)]);
        // constant column only shifted
        assert_eq!(out.column("c").unwrap(), vec![json!(0.0), json!(0.0), json!(0.0)]);
        // target untouched
        assert_eq!(out.column("target").unwrap(), data.column("target").unwrap());
    }

    #[test]
    fn test_standard() {
        let data = frame();
        let scaler = FittedScaler::fit(ScalerKind::Standard, &data, &["target".into()]).unwrap();
        let a = scaler.columns.iter().find(|c| c.column == "a").unwrap();
        assert_eq!(a.offset, 5.0);
        assert!((a.divisor - (50.0f64 / 3.0).sqrt()).abs() < 1e-12);
        let out = scaler.transform(&data).unwrap();
        assert_eq!(out.column("a").unwrap()[1], json!(0.0));
    }

    #[test]
    fn test_transform_reuses_train_parameters() {
        let train = frame();
        let scaler = FittedScaler::fit(ScalerKind::MinMax, &train, &["target".into()]).unwrap();
        let test = Dataset::new(
            vec!["a".into(), "c".into(), "target".into()],
            vec![vec![json!(20.0), json!(6), json!(0)]],
        )
        .unwrap();
        let out = scaler.transform(&test).unwrap();
        assert_eq!(out.rows[0][0], json!(2.0));
        assert_eq!(out.rows[0][1], json!(1.0));
    }

    #[test]
    fn test_fit_empty_fails() {
        let empty = Dataset::new(vec!["a".into()], vec![]).unwrap();
        assert!(FittedScaler::fit(ScalerKind::MinMax, &empty, &[]).is_err());
    }
}
