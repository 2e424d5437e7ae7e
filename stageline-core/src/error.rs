//! Error types for the stageline-core crate.

use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unsupported model type: {0}")]
    UnsupportedModelType(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn data_unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn unsupported_model(model_type: impl Into<String>) -> Self {
        Self::UnsupportedModelType(model_type.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    /// Wrap an error with the name of the stage that produced it.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, unwrapping stage context.
    pub fn root(&self) -> &PipelineError {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_wraps_once() {
        let err = PipelineError::unsupported_model("xyz")
            .in_stage("model_trainer")
            .in_stage("outer");
        match &err {
            PipelineError::Stage { stage, .. } => assert_eq!(stage, "model_trainer"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            err.root(),
            PipelineError::UnsupportedModelType(m) if m == "xyz"
        ));
    }

    #[test]
    fn test_display_includes_stage() {
        let err = PipelineError::schema("column 'a' missing").in_stage("data_preprocessor");
        assert_eq!(
            err.to_string(),
            "Stage 'data_preprocessor' failed: Schema mismatch: column 'a' missing"
        );
    }
}
