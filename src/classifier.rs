use std::sync::Arc;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque binary predictor over encoded parameter vectors. The engine never
/// inspects a classifier's internals, only its predictions, so alternative
/// models can be dropped in as long as they implement this contract and are
/// deterministic given a seed.
pub trait Classifier: Send + Sync + std::fmt::Debug {
    /// `true` = accept the encoded vector, `false` = reject.
    fn predict(&self, x: &[f64]) -> bool;

    fn predict_batch(&self, xs: &[Vec<f64>]) -> Vec<bool> {
        xs.iter().map(|x| self.predict(x)).collect()
    }

    fn to_bytes(&self) -> Result<Vec<u8>>;
}

/// One trained member of the cascade, plus the bookkeeping the engine keeps
/// about how it was produced.
#[derive(Clone)]
pub struct CascadeEntry {
    pub version: usize,
    pub training_size: usize,
    pub validation_score: Option<f64>,
    pub model: Arc<dyn Classifier>,
}

/// `true` only if every classifier in the cascade accepts `x`.
pub fn cascade_accepts(cascade: &[CascadeEntry], x: &[f64]) -> bool {
    cascade.iter().all(|entry| entry.model.predict(x))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
enum Node {
    Leaf {
        label: bool,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn predict(&self, x: &[f64]) -> bool {
        match self {
            Node::Leaf { label } => *label,
            Node::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x[*feature] <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }
}

const MAX_DEPTH: usize = 4;
const MIN_SAMPLES_SPLIT: usize = 4;

/// Reference classifier: a small ensemble of CART-style decision trees,
/// bootstrap-bagged and feature-subsampled, chosen for determinism given a
/// seed and cheap inference rather than for predictive power.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecisionTreeEnsemble {
    trees: Vec<Node>,
    num_features: usize,
}

impl DecisionTreeEnsemble {
    /// Trains `num_trees` trees on bootstrap resamples of `(rows, labels)`.
    /// Returns `None` unless both classes have at least 2 samples (the
    /// batch gives the classifier too little to discriminate otherwise).
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], seed: u64, num_trees: usize) -> Option<Self> {
        let accepted = labels.iter().filter(|&&l| l).count();
        let rejected = labels.iter().filter(|&&l| !l).count();
        if accepted < 2 || rejected < 2 {
            return None;
        }
        let num_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut rng = SmallRng::seed_from_u64(seed);

        let trees = (0..num_trees)
            .map(|_| {
                let tree_seed = rng.gen::<u64>();
                let mut tree_rng = SmallRng::seed_from_u64(tree_seed);
                let indices: Vec<usize> = (0..rows.len())
                    .map(|_| tree_rng.gen_range(0..rows.len()))
                    .collect();
                build_node(rows, labels, &indices, 0, &mut tree_rng)
            })
            .collect();

        Some(Self { trees, num_features })
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization {
            what: "classifier",
            path: Default::default(),
            source: e,
        })
    }
}

impl Classifier for DecisionTreeEnsemble {
    fn predict(&self, x: &[f64]) -> bool {
        if self.trees.is_empty() {
            return true;
        }
        let votes = self.trees.iter().filter(|t| t.predict(x)).count();
        votes * 2 >= self.trees.len()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization {
            what: "classifier",
            path: Default::default(),
            source: e,
        })
    }
}

fn majority_label(labels: &[bool], indices: &[usize]) -> bool {
    let trues = indices.iter().filter(|&&i| labels[i]).count();
    trues * 2 >= indices.len()
}

fn gini(labels: &[bool], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    let trues = indices.iter().filter(|&&i| labels[i]).count() as f64;
    let n = indices.len() as f64;
    let p = trues / n;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

fn build_node(
    rows: &[Vec<f64>],
    labels: &[bool],
    indices: &[usize],
    depth: usize,
    rng: &mut SmallRng,
) -> Node {
    let all_same = indices.iter().all(|&i| labels[i] == labels[indices[0]]);
    if all_same || depth >= MAX_DEPTH || indices.len() < MIN_SAMPLES_SPLIT {
        return Node::Leaf {
            label: majority_label(labels, indices),
        };
    }

    let num_features = rows[indices[0]].len();
    if num_features == 0 {
        return Node::Leaf {
            label: majority_label(labels, indices),
        };
    }
    let subsample_size = (num_features as f64).sqrt().ceil().max(1.0) as usize;
    let mut feature_pool: Vec<usize> = (0..num_features).collect();
    for i in (1..feature_pool.len()).rev() {
        let j = rng.gen_range(0..=i);
        feature_pool.swap(i, j);
    }
    feature_pool.truncate(subsample_size.min(feature_pool.len()));

    let parent_gini = gini(labels, indices);
    let mut best: Option<(usize, f64, f64, Vec<usize>, Vec<usize>)> = None;

    for &feature in &feature_pool {
        let mut values: Vec<f64> = indices.iter().map(|&i| rows[i][feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        for window in values.windows(2) {
            let threshold = (window[0] + window[1]) / 2.0;
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| rows[i][feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }
            let weighted = gini(labels, &left) * left.len() as f64 / indices.len() as f64
                + gini(labels, &right) * right.len() as f64 / indices.len() as f64;
            let gain = parent_gini - weighted;
            if best.as_ref().map(|b| gain > b.1).unwrap_or(gain > 1e-12) {
                best = Some((feature, gain, threshold, left, right));
            }
        }
    }

    match best {
        Some((feature, _, threshold, left, right)) => Node::Split {
            feature,
            threshold,
            left: Box::new(build_node(rows, labels, &left, depth + 1, rng)),
            right: Box::new(build_node(rows, labels, &right, depth + 1, rng)),
        },
        None => Node::Leaf {
            label: majority_label(labels, indices),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separable_data_trains_perfect_classifier() {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64])
            .collect();
        let labels: Vec<bool> = (0..40).map(|i| i >= 20).collect();
        let model = DecisionTreeEnsemble::fit(&rows, &labels, 0, 11).unwrap();
        for (row, &label) in rows.iter().zip(labels.iter()) {
            assert_eq!(model.predict(row), label);
        }
    }

    #[test]
    fn single_class_batch_fails_to_train() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let labels = vec![true; 10];
        assert!(DecisionTreeEnsemble::fit(&rows, &labels, 0, 5).is_none());
    }

    #[test]
    fn singleton_class_batch_fails_to_train() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let mut labels = vec![false; 10];
        labels[0] = true;
        assert!(DecisionTreeEnsemble::fit(&rows, &labels, 0, 5).is_none());
    }

    #[test]
    fn same_seed_is_deterministic() {
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i * 2) as f64]).collect();
        let labels: Vec<bool> = (0..30).map(|i| i % 3 == 0).collect();
        let a = DecisionTreeEnsemble::fit(&rows, &labels, 42, 7).unwrap();
        let b = DecisionTreeEnsemble::fit(&rows, &labels, 42, 7).unwrap();
        for row in &rows {
            assert_eq!(a.predict(row), b.predict(row));
        }
    }

    #[test]
    fn serialize_round_trip() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let labels: Vec<bool> = (0..20).map(|i| i >= 10).collect();
        let model = DecisionTreeEnsemble::fit(&rows, &labels, 1, 5).unwrap();
        let bytes = model.to_bytes().unwrap();
        let restored = DecisionTreeEnsemble::deserialize(&bytes).unwrap();
        for row in &rows {
            assert_eq!(model.predict(row), restored.predict(row));
        }
    }
}
