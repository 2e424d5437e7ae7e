//! Linear classifier fitted by stochastic gradient descent.
//!
//! One-vs-rest hinge loss with an L2 penalty. The learning rate decays as
//! `1 / (alpha * (t0 + t))` with `t0 = 1 / (alpha * eta0)`, so the first
//! update uses `eta0`.

use crate::config::SgdConfig;
use crate::error::PipelineError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Fitted one-vs-rest linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSgd {
    /// One weight vector per class.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
    /// Epochs run for each class before stopping.
    pub epochs: Vec<usize>,
}

impl LinearSgd {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        config: &SgdConfig,
        seed: u64,
    ) -> Result<Self, PipelineError> {
        if config.alpha <= 0.0 || config.eta0 <= 0.0 {
            return Err(PipelineError::invalid_input(
                "sgd alpha and eta0 must be positive",
            ));
        }
        let mut weights = Vec::with_capacity(n_classes);
        let mut intercepts = Vec::with_capacity(n_classes);
        let mut epochs = Vec::with_capacity(n_classes);
        for class in 0..n_classes {
            let signs: Vec<f64> = y
                .iter()
                .map(|&c| if c == class { 1.0 } else { -1.0 })
                .collect();
            let (w, b, n) = fit_binary(x, &signs, config, seed.wrapping_add(class as u64));
            weights.push(w);
            intercepts.push(b);
            epochs.push(n);
        }
        Ok(Self {
            weights,
            intercepts,
            epochs,
        })
    }

    pub fn decision(&self, row: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| dot(w, row) + b)
            .collect()
    }

    /// Class with the largest decision value; ties go to the lower index.
    pub fn predict_row(&self, row: &[f64]) -> usize {
        let scores = self.decision(row);
        let mut best = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best] {
                best = i;
            }
        }
        best
    }
}

fn fit_binary(x: &[Vec<f64>], y: &[f64], config: &SgdConfig, seed: u64) -> (Vec<f64>, f64, usize) {
    let n_features = x.first().map_or(0, Vec::len);
    let mut w = vec![0.0; n_features];
    let mut b = 0.0;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..x.len()).collect();

    let t0 = 1.0 / (config.alpha * config.eta0);
    let mut t = 0.0;
    let mut best_loss = f64::INFINITY;
    let mut stale = 0;
    let mut epoch = 0;

    while epoch < config.max_iter {
        epoch += 1;
        order.shuffle(&mut rng);
        let mut loss = 0.0;
        for &i in &order {
            let eta = 1.0 / (config.alpha * (t0 + t));
            let margin = y[i] * (dot(&w, &x[i]) + b);
            let shrink = 1.0 - eta * config.alpha;
            for wj in w.iter_mut() {
                *wj *= shrink;
            }
            if margin < 1.0 {
                loss += 1.0 - margin;
                for (wj, xj) in w.iter_mut().zip(&x[i]) {
                    *wj += eta * y[i] * xj;
                }
                b += eta * y[i];
            }
            t += 1.0;
        }
        loss /= x.len().max(1) as f64;

        if loss > best_loss - config.tol {
            stale += 1;
        } else {
            stale = 0;
        }
        best_loss = best_loss.min(loss);
        if stale >= config.n_iter_no_change {
            break;
        }
    }
    (w, b, epoch)
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let d = i as f64 * 0.05;
            x.push(vec![0.0 + d, 0.0 + d]);
            y.push(0);
            x.push(vec![5.0 + d, 5.0 - d]);
            y.push(1);
            x.push(vec![0.0 + d, 10.0 - d]);
            y.push(2);
        }
        (x, y)
    }

    #[test]
    fn test_separates_blobs() {
        let (x, y) = blobs();
        let model = LinearSgd::fit(&x, &y, 3, &SgdConfig::default(), 42).unwrap();
        let correct = x
            .iter()
            .zip(&y)
            .filter(|(row, c)| model.predict_row(row) == **c)
            .count();
        assert!(correct as f64 / x.len() as f64 >= 0.8, "correct = {correct}");
        assert_eq!(model.weights.len(), 3);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let (x, y) = blobs();
        let a = LinearSgd::fit(&x, &y, 3, &SgdConfig::default(), 7).unwrap();
        let b = LinearSgd::fit(&x, &y, 3, &SgdConfig::default(), 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stops_early() {
        let (x, y) = blobs();
        let model = LinearSgd::fit(&x, &y, 3, &SgdConfig::default(), 1).unwrap();
        assert!(model.epochs.iter().all(|&e| e < 1000));
    }

    #[test]
    fn test_rejects_non_positive_rates() {
        let (x, y) = blobs();
        let config = SgdConfig {
            alpha: 0.0,
            ..SgdConfig::default()
        };
        assert!(LinearSgd::fit(&x, &y, 3, &config, 1).is_err());
    }
}
