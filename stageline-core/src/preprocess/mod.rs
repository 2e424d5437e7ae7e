//! Preprocessing: null dropping, column dropping, scaling and schema casting.

pub mod pipeline;
pub mod scaler;

pub use pipeline::{FittedPipeline, FittedStep, PreprocessPipeline, TransformStep};
pub use scaler::{FittedScaler, ScalerKind};
