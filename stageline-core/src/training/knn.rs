//! k-nearest-neighbour classifier (Euclidean distance, majority vote).

use crate::error::PipelineError;
use crate::training::forest::argmax;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNearest {
    pub n_neighbors: usize,
    pub n_classes: usize,
    pub points: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl KNearest {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        n_neighbors: usize,
    ) -> Result<Self, PipelineError> {
        if n_neighbors == 0 {
            return Err(PipelineError::invalid_input("n_neighbors must be >= 1"));
        }
        if n_neighbors > x.len() {
            return Err(PipelineError::invalid_input(format!(
                "n_neighbors = {n_neighbors} exceeds the {} training rows",
                x.len()
            )));
        }
        Ok(Self {
            n_neighbors,
            n_classes,
            points: x.to_vec(),
            labels: y.to_vec(),
        })
    }

    /// Vote among the `k` closest training rows. Equal distances keep
    /// training order; tied votes go to the lower class index.
    pub fn predict_row(&self, row: &[f64]) -> usize {
        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (squared_distance(p, row), i))
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut votes = vec![0usize; self.n_classes];
        for &(_, i) in distances.iter().take(self.n_neighbors) {
            votes[self.labels[i]] += 1;
        }
        argmax(&votes)
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicts_nearest_cluster() {
        let x = vec![vec![0.0], vec![0.1], vec![0.2], vec![5.0], vec![5.1]];
        let y = vec![0, 0, 0, 1, 1];
        let knn = KNearest::fit(&x, &y, 2, 3).unwrap();
        assert_eq!(knn.predict_row(&[0.05]), 0);
        assert_eq!(knn.predict_row(&[4.9]), 1);
    }

    #[test]
    fn test_tie_goes_to_lower_class() {
        let x = vec![vec![-1.0], vec![1.0]];
        let y = vec![1, 0];
        let knn = KNearest::fit(&x, &y, 2, 2).unwrap();
        assert_eq!(knn.predict_row(&[0.0]), 0);
    }

    #[test]
    fn test_rejects_k_larger_than_data() {
        let x = vec![vec![0.0]];
        assert!(KNearest::fit(&x, &[0], 1, 2).is_err());
        assert!(KNearest::fit(&x, &[0], 1, 0).is_err());
    }
}
