//! Classifiers: linear SGD, random forest and k-nearest-neighbours, plus
//! the trainer that binds a fitted estimator to its feature schema.

pub mod forest;
pub mod knn;
pub mod model;
pub mod sgd;
pub mod trainer;

pub use model::{Estimator, ModelSpec, ModelType, TrainedModel};
pub use trainer::{encode_labels, train_model};
