//! Accuracy scoring of a trained classifier on its train and test splits.

use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use crate::training::model::TrainedModel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Fraction of predictions equal to the actual labels.
pub fn accuracy(predicted: &[Value], actual: &[Value]) -> Result<f64, PipelineError> {
    if predicted.len() != actual.len() {
        return Err(PipelineError::invalid_input(format!(
            "{} predictions for {} labels",
            predicted.len(),
            actual.len()
        )));
    }
    if actual.is_empty() {
        return Err(PipelineError::invalid_input("cannot score an empty dataset"));
    }
    let hits = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
    Ok(hits as f64 / actual.len() as f64)
}

/// Train and test accuracy of one model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

/// Minimum accuracies below which a warning is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccuracyFloor {
    pub train: f64,
    pub test: f64,
}

/// Score `model` on both splits.
pub fn evaluate(
    model: &TrainedModel,
    train: &Dataset,
    test: &Dataset,
    target: &str,
    floor: AccuracyFloor,
) -> Result<Evaluation, PipelineError> {
    let score = |data: &Dataset| -> Result<f64, PipelineError> {
        let actual = data.column(target)?;
        let predicted = model.predict(data)?;
        accuracy(&predicted, &actual)
    };
    let evaluation = Evaluation {
        train_accuracy: score(train)?,
        test_accuracy: score(test)?,
    };

    info!(
        train_accuracy = evaluation.train_accuracy,
        test_accuracy = evaluation.test_accuracy,
        "Model evaluated"
    );
    if evaluation.train_accuracy < floor.train {
        warn!(
            train_accuracy = evaluation.train_accuracy,
            min = floor.train,
            "Train accuracy is below the configured minimum"
        );
    }
    if evaluation.test_accuracy < floor.test {
        warn!(
            test_accuracy = evaluation.test_accuracy,
            min = floor.test,
            "Test accuracy is below the configured minimum"
        );
    }
    Ok(evaluation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::{BundledIris, DataSource};
    use crate::data::splitter::train_test_split;
    use crate::training::{ModelSpec, train_model};
    use serde_json::json;

    #[test]
    fn test_accuracy() {
        let p = [json!("a"), json!("b"), json!("a"), json!("c")];
        let a = [json!("a"), json!("b"), json!("b"), json!("c")];
        assert_eq!(accuracy(&p, &a).unwrap(), 0.75);
        assert!(accuracy(&p[..2], &a).is_err());
        assert!(accuracy(&[], &[]).is_err());
    }

    #[tokio::test]
    async fn test_evaluate_knn_on_iris() {
        let iris = BundledIris.load().await.unwrap();
        let (train, test) = train_test_split(&iris, 0.2, 42).unwrap();
        let model = train_model(&train, "target", &ModelSpec::KNearest { n_neighbors: 3 }, 0).unwrap();
        let eval = evaluate(&model, &train, &test, "target", AccuracyFloor::default()).unwrap();
        assert!(eval.train_accuracy > 0.9);
        assert!(eval.test_accuracy > 0.85);
        assert!(eval.test_accuracy <= 1.0);
    }
}
