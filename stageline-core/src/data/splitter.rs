//! Seeded train/test partitioning.

use crate::data::dataset::Dataset;
use crate::error::PipelineError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Number of test rows for a fraction, rounded up.
pub fn test_rows(n_rows: usize, test_size: f64) -> usize {
    (n_rows as f64 * test_size).ceil() as usize
}

/// Shuffle rows with `seed` and split off `ceil(n * test_size)` test rows.
///
/// Both halves keep the input's column order. Fails when the fraction is
/// outside (0, 1) or either half would be empty.
pub fn train_test_split(
    dataset: &Dataset,
    test_size: f64,
    seed: u64,
) -> Result<(Dataset, Dataset), PipelineError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::invalid_input(format!(
            "test_size must be within (0, 1) exclusive, got {test_size}"
        )));
    }
    let n = dataset.len();
    let n_test = test_rows(n, test_size);
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::invalid_input(format!(
            "test_size {test_size} leaves an empty split for {n} rows"
        )));
    }

    let mut positions: Vec<usize> = (0..n).collect();
    positions.shuffle(&mut StdRng::seed_from_u64(seed));
    let (test, train) = positions.split_at(n_test);
    Ok((dataset.select_rows(train), dataset.select_rows(test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbered(n: usize) -> Dataset {
        Dataset::new(
            vec!["x".into(), "target".into()],
            (0..n).map(|i| vec![json!(i), json!(i % 2)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_split_sizes() {
        let (trn, tst) = train_test_split(&numbered(143), 0.2, 42).unwrap();
        assert_eq!(tst.len(), 29);
        assert_eq!(trn.len(), 114);
        assert_eq!(trn.column_names(), tst.column_names());
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = train_test_split(&numbered(50), 0.3, 42).unwrap();
        let b = train_test_split(&numbered(50), 0.3, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        for bad in [0.0, 1.0, -1.0, 2.0, f64::NAN] {
            assert!(train_test_split(&numbered(10), bad, 42).is_err());
        }
    }

    #[test]
    fn test_split_rejects_empty_half() {
        assert!(train_test_split(&numbered(1), 0.5, 42).is_err());
        assert!(train_test_split(&numbered(0), 0.5, 42).is_err());
    }
}
