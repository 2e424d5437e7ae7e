//! Random forest of CART trees: bootstrap rows, gini impurity, and
//! `floor(sqrt(n_features))` candidate features per split.

use crate::config::ForestConfig;
use crate::error::PipelineError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Leaf {
        class: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single classification tree stored as a flat node list; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn predict_row(&self, row: &[f64]) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { class } => return *class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

/// Fitted forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
    pub n_classes: usize,
}

impl RandomForest {
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        n_classes: usize,
        config: &ForestConfig,
        seed: u64,
    ) -> Result<Self, PipelineError> {
        if x.is_empty() {
            return Err(PipelineError::invalid_input("cannot fit a forest on empty data"));
        }
        if config.n_estimators == 0 {
            return Err(PipelineError::invalid_input("n_estimators must be >= 1"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let n = x.len();
        let trees = (0..config.n_estimators)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    config,
                    rng: &mut rng,
                    nodes: Vec::new(),
                };
                builder.build(sample, 0);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();
        Ok(Self { trees, n_classes })
    }

    /// Majority vote across trees; ties go to the lower class index.
    pub fn predict_row(&self, row: &[f64]) -> usize {
        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            votes[tree.predict_row(row)] += 1;
        }
        argmax(&votes)
    }
}

struct TreeBuilder<'a, R: Rng> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    n_classes: usize,
    config: &'a ForestConfig,
    rng: &'a mut R,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<R: Rng> TreeBuilder<'_, R> {
    fn build(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let counts = self.counts(&rows);
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            class: argmax(&counts),
        });

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let too_small = rows.len() < self.config.min_samples_split.max(2);
        let too_deep = self.config.max_depth.is_some_and(|d| depth >= d);
        if pure || too_small || too_deep {
            return idx;
        }

        let Some(split) = self.best_split(&rows) else {
            return idx;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.x[r][split.feature] <= split.threshold);

        let left = self.build(left_rows, depth + 1);
        let right = self.build(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn counts(&self, rows: &[usize]) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes];
        for &r in rows {
            counts[self.y[r]] += 1;
        }
        counts
    }

    fn best_split(&mut self, rows: &[usize]) -> Option<BestSplit> {
        let n_features = self.x[rows[0]].len();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let candidates = rand::seq::index::sample(&mut *self.rng, n_features, max_features).into_vec();

        // fall back to every feature when the sampled ones are all constant
        self.scan(rows, &candidates).or_else(|| {
            let all: Vec<usize> = (0..n_features).collect();
            self.scan(rows, &all)
        })
    }

    fn scan(&self, rows: &[usize], features: &[usize]) -> Option<BestSplit> {
        let n = rows.len() as f64;
        let total = self.counts(rows);
        let mut best: Option<BestSplit> = None;

        for &f in features {
            let mut sorted = rows.to_vec();
            sorted.sort_by(|&a, &b| self.x[a][f].total_cmp(&self.x[b][f]));

            let mut left = vec![0usize; self.n_classes];
            for i in 0..sorted.len() - 1 {
                left[self.y[sorted[i]]] += 1;
                let here = self.x[sorted[i]][f];
                let next = self.x[sorted[i + 1]][f];
                if here == next {
                    continue;
                }
                let n_left = (i + 1) as f64;
                let right: Vec<usize> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
                let impurity = (n_left * gini(&left) + (n - n_left) * gini(&right)) / n;
                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature: f,
                        threshold: (here + next) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

fn gini(counts: &[usize]) -> f64 {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

pub(crate) fn argmax(votes: &[usize]) -> usize {
    let mut best = 0;
    for (i, v) in votes.iter().enumerate() {
        if *v > votes[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xor_like() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            let d = i as f64 * 0.01;
            x.push(vec![0.0 + d, 0.0 + d]);
            y.push(0);
            x.push(vec![1.0 + d, 1.0 + d]);
            y.push(0);
            x.push(vec![0.0 + d, 1.0 + d]);
            y.push(1);
            x.push(vec![1.0 + d, 0.0 + d]);
            y.push(1);
        }
        (x, y)
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(&[5, 0]), 0.0);
        assert_eq!(gini(&[2, 2]), 0.5);
        assert_eq!(gini(&[]), 0.0);
    }

    #[test]
    fn test_argmax_prefers_lower_index_on_tie() {
        assert_eq!(argmax(&[2, 3, 3]), 1);
        assert_eq!(argmax(&[0, 0]), 0);
    }

    #[test]
    fn test_forest_learns_non_linear_boundary() {
        let (x, y) = xor_like();
        let config = ForestConfig {
            n_estimators: 25,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(&x, &y, 2, &config, 42).unwrap();
        assert_eq!(forest.trees.len(), 25);
        let correct = x
            .iter()
            .zip(&y)
            .filter(|(row, c)| forest.predict_row(row) == **c)
            .count();
        assert!(correct >= 36, "correct = {correct}");
    }

    #[test]
    fn test_max_depth_is_respected() {
        let (x, y) = xor_like();
        let config = ForestConfig {
            n_estimators: 5,
            max_depth: Some(1),
            min_samples_split: 2,
        };
        let forest = RandomForest::fit(&x, &y, 2, &config, 3).unwrap();
        assert!(forest.trees.iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn test_seeded_forest_is_reproducible() {
        let (x, y) = xor_like();
        let config = ForestConfig {
            n_estimators: 5,
            ..ForestConfig::default()
        };
        let a = RandomForest::fit(&x, &y, 2, &config, 9).unwrap();
        let b = RandomForest::fit(&x, &y, 2, &config, 9).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_tree_predicts_leaf() {
        let tree = DecisionTree {
            nodes: vec![
                Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                },
                Node::Leaf { class: 0 },
                Node::Leaf { class: 1 },
            ],
        };
        assert_eq!(tree.predict_row(&[0.2]), 0);
        assert_eq!(tree.predict_row(&[0.9]), 1);
        assert_eq!(tree.depth(), 1);
    }
}
