//! Concrete stages wired together by the pipelines.

pub mod data;
pub mod iris;
pub mod model;

pub use data::{DataLoader, DataPreprocessor, DataSplitter, InferencePreprocessor};
pub use iris::{CreateDataset, NormalizeDataset, TrainKnn};
pub use model::{CLASSIFIER_KEY, InferencePredict, ModelEvaluator, ModelPromoter, ModelTrainer};
