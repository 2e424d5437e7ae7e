//! Dataset loader: reserves a seeded inference slice of the source table.

use crate::data::dataset::Dataset;
use crate::data::source::DataSource;
use crate::error::PipelineError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

/// Share of the source rows held back for the inference pipeline.
pub const INFERENCE_FRACTION: f64 = 0.05;

/// Positions of the inference slice and the remaining training rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub inference: Vec<usize>,
    pub training: Vec<usize>,
}

/// Split `n_rows` positions into a seeded inference sample and the rest.
///
/// The inference slice has `floor(n_rows * INFERENCE_FRACTION)` rows in
/// sample order; training rows keep source order.
pub fn partition(n_rows: usize, random_state: u64) -> Partition {
    let size = (n_rows as f64 * INFERENCE_FRACTION) as usize;
    let mut rng = StdRng::seed_from_u64(random_state);
    let inference = rand::seq::index::sample(&mut rng, n_rows, size).into_vec();

    let mut reserved = vec![false; n_rows];
    for &i in &inference {
        reserved[i] = true;
    }
    let training = (0..n_rows).filter(|&i| !reserved[i]).collect();
    Partition {
        inference,
        training,
    }
}

/// Load the source table and return either the training rows (target
/// kept) or the inference slice (target removed).
pub async fn load_dataset(
    source: &dyn DataSource,
    random_state: u64,
    is_inference: bool,
    target: &str,
) -> Result<Dataset, PipelineError> {
    let table = source.load().await?;
    table.schema.require(target)?;

    let split = partition(table.len(), random_state);
    let dataset = if is_inference {
        table
            .select_rows(&split.inference)
            .drop_columns(&[target.to_string()])?
    } else {
        table.select_rows(&split.training)
    };

    info!(
        rows = dataset.len(),
        is_inference,
        source = %source.source_info().location,
        "Dataset loaded"
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::BundledIris;

    #[test]
    fn test_partition_sizes() {
        let p = partition(150, 17);
        assert_eq!(p.inference.len(), 7);
        assert_eq!(p.training.len(), 143);
        assert!(p.training.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_partition_is_seeded() {
        assert_eq!(partition(569, 3), partition(569, 3));
        assert_ne!(partition(569, 3).inference, partition(569, 4).inference);
    }

    #[test]
    fn test_partition_small_table_has_no_inference_rows() {
        let p = partition(10, 1);
        assert!(p.inference.is_empty());
        assert_eq!(p.training.len(), 10);
    }

    #[tokio::test]
    async fn test_load_training_and_inference() {
        let trn = load_dataset(&BundledIris, 17, false, "target").await.unwrap();
        let inf = load_dataset(&BundledIris, 17, true, "target").await.unwrap();
        assert_eq!(trn.len() + inf.len(), 150);
        assert!(trn.has_column("target"));
        assert!(!inf.has_column("target"));
        assert!(inf.row_ids.iter().all(|id| !trn.row_ids.contains(id)));
    }

    #[tokio::test]
    async fn test_missing_target_is_schema_mismatch() {
        let err = load_dataset(&BundledIris, 17, false, "label")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMismatch(_)));
    }
}
