//! Ordered preprocessing pipeline: fitted once on training data, replayed
//! without refitting on test and inference data.

use crate::data::dataset::Dataset;
use crate::data::schema::{ColumnType, SchemaDefinition, value_as_f64};
use crate::error::PipelineError;
use crate::preprocess::scaler::{FittedScaler, ScalerKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// An unfitted preprocessing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Remove rows containing any null cell.
    DropNa,
    /// Remove the named columns.
    DropColumns { columns: Vec<String> },
    /// Scale numeric columns, leaving `exclude` untouched.
    Normalize {
        scaler: ScalerKind,
        exclude: Vec<String>,
    },
    /// Pin the output to the column set and types seen at fit time.
    Cast,
}

impl TransformStep {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DropNa => "drop_na",
            Self::DropColumns { .. } => "drop_columns",
            Self::Normalize { .. } => "normalize",
            Self::Cast => "cast",
        }
    }
}

/// A preprocessing step with its learned state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FittedStep {
    DropNa,
    DropColumns { columns: Vec<String> },
    Normalize { scaler: FittedScaler },
    Cast { schema: SchemaDefinition },
}

/// A pipeline of preprocessing steps, before fitting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreprocessPipeline {
    pub steps: Vec<TransformStep>,
}

impl PreprocessPipeline {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn add_step(mut self, step: TransformStep) -> Self {
        self.steps.push(step);
        self
    }

    /// The feature-engineering pipeline: only the enabled steps, always
    /// ending in a cast to the training frame's columns.
    pub fn from_flags(drop_na: bool, normalize: bool, drop_columns: &[String], target: &str) -> Self {
        let mut pipeline = Self::new();
        if drop_na {
            pipeline = pipeline.add_step(TransformStep::DropNa);
        }
        if !drop_columns.is_empty() {
            pipeline = pipeline.add_step(TransformStep::DropColumns {
                columns: drop_columns.to_vec(),
            });
        }
        if normalize {
            pipeline = pipeline.add_step(TransformStep::Normalize {
                scaler: ScalerKind::MinMax,
                exclude: vec![target.to_string()],
            });
        }
        pipeline.add_step(TransformStep::Cast)
    }

    /// Fit every step in order on `data` and return the transformed data
    /// together with the fitted pipeline.
    pub fn fit_transform(
        &self,
        data: &Dataset,
        target: &str,
    ) -> Result<(Dataset, FittedPipeline), PipelineError> {
        let mut current = data.clone();
        let mut fitted = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let step = fit_step(step, &current)?;
            current = apply_step(&step, &current, None)?;
            debug!(step = ?step_name(&step), rows = current.len(), "Fitted preprocessing step");
            fitted.push(step);
        }
        Ok((
            current,
            FittedPipeline {
                steps: fitted,
                target: target.to_string(),
            },
        ))
    }
}

/// A fitted pipeline, persisted as an artifact and replayed at inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub steps: Vec<FittedStep>,
    /// Label column of the training frame.
    pub target: String,
}

impl FittedPipeline {
    /// Apply to labelled data (test split).
    pub fn transform(&self, data: &Dataset) -> Result<Dataset, PipelineError> {
        self.steps
            .iter()
            .try_fold(data.clone(), |current, step| apply_step(step, &current, None))
    }

    /// Apply to unlabelled data; the cast step leaves out the target column.
    pub fn transform_unlabeled(&self, data: &Dataset) -> Result<Dataset, PipelineError> {
        if data.has_column(&self.target) {
            return Err(PipelineError::schema(format!(
                "unlabelled data must not contain the target column '{}'",
                self.target
            )));
        }
        self.steps.iter().try_fold(data.clone(), |current, step| {
            apply_step(step, &current, Some(&self.target))
        })
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(step_name).collect()
    }
}

fn step_name(step: &FittedStep) -> &'static str {
    match step {
        FittedStep::DropNa => "drop_na",
        FittedStep::DropColumns { .. } => "drop_columns",
        FittedStep::Normalize { .. } => "normalize",
        FittedStep::Cast { .. } => "cast",
    }
}

fn fit_step(step: &TransformStep, data: &Dataset) -> Result<FittedStep, PipelineError> {
    Ok(match step {
        TransformStep::DropNa => FittedStep::DropNa,
        TransformStep::DropColumns { columns } => {
            for c in columns {
                data.schema.require(c)?;
            }
            FittedStep::DropColumns {
                columns: columns.clone(),
            }
        }
        TransformStep::Normalize { scaler, exclude } => FittedStep::Normalize {
            scaler: FittedScaler::fit(*scaler, data, exclude)?,
        },
        TransformStep::Cast => FittedStep::Cast {
            schema: data.schema.clone(),
        },
    })
}

fn apply_step(
    step: &FittedStep,
    data: &Dataset,
    skip_column: Option<&str>,
) -> Result<Dataset, PipelineError> {
    match step {
        FittedStep::DropNa => Ok(data.filter_rows(|row| row.iter().all(|v| !v.is_null()))),
        FittedStep::DropColumns { columns } => data.drop_columns(columns),
        FittedStep::Normalize { scaler } => scaler.transform(data),
        FittedStep::Cast { schema } => cast(data, schema, skip_column),
    }
}

fn cast(
    data: &Dataset,
    schema: &SchemaDefinition,
    skip_column: Option<&str>,
) -> Result<Dataset, PipelineError> {
    let columns: Vec<_> = schema
        .columns
        .iter()
        .filter(|c| Some(c.name.as_str()) != skip_column)
        .cloned()
        .collect();
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let mut out = data.select_columns(&names)?;

    for (idx, col) in columns.iter().enumerate() {
        for (r, row) in out.rows.iter_mut().enumerate() {
            let cell = &mut row[idx];
            if cell.is_null() {
                continue;
            }
            *cell = cast_cell(cell, col.dtype).ok_or_else(|| {
                PipelineError::schema(format!(
                    "value {cell} at row {r} cannot be cast to {:?} for column '{}'",
                    col.dtype, col.name
                ))
            })?;
        }
    }
    out.schema = SchemaDefinition { columns };
    Ok(out)
}

fn cast_cell(value: &Value, dtype: ColumnType) -> Option<Value> {
    match dtype {
        ColumnType::Float => {
            value_as_f64(value).and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
        }
        ColumnType::Integer => {
            let f = value_as_f64(value)?;
            (f.fract() == 0.0).then(|| Value::Number((f as i64).into()))
        }
        ColumnType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            other => value_as_f64(other).map(|f| Value::Bool(f != 0.0)),
        },
        ColumnType::String => Some(match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.to_string()),
        }),
        ColumnType::Null | ColumnType::Unknown => Some(value.clone()),
    }
}
