//! Isolation-forest outlier detector over a single numeric feature.
//!
//! Each tree isolates points with uniformly random splits; outliers sit on
//! short paths. Scores follow the usual convention: `score_samples` is the
//! negated anomaly score, `decision_function` shifts it so the configured
//! contamination fraction of training points falls below zero, and
//! `predict` returns `-1` for outliers and `1` for inliers.

use rand::{Rng, SeedableRng, rngs::StdRng, seq::index};
use serde::{Deserialize, Serialize};

use crate::models::ModelError;

/// Euler–Mascheroni constant, used in the harmonic-number approximation.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Label `predict` assigns to outliers.
pub const OUTLIER: i8 = -1;
/// Label `predict` assigns to inliers.
pub const INLIER: i8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    /// Number of isolation trees
    pub n_estimators: usize,
    /// Upper bound on the sub-sample each tree is grown from
    pub max_samples: usize,
    /// Expected share of outliers in the training data, in (0, 0.5]
    pub contamination: f64,
    /// Seed for sub-sampling and split selection
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FittedForest {
    trees: Vec<Node>,
    sample_size: usize,
    offset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    params: IsolationForestParams,
    fitted: Option<FittedForest>,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(IsolationForestParams::default())
    }
}

impl IsolationForest {
    pub fn new(params: IsolationForestParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Threshold subtracted from `score_samples` by `decision_function`.
    pub fn offset(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.offset)
    }

    /// Grows the forest on `values` and calibrates the outlier threshold.
    ///
    /// # Errors
    ///
    /// `ModelError::EmptyTrainingSet` for empty input and
    /// `ModelError::InvalidParameter` for a zero tree count or sample bound.
    pub fn fit(&mut self, values: &[f64]) -> Result<(), ModelError> {
        if values.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if self.params.n_estimators == 0 || self.params.max_samples == 0 {
            return Err(ModelError::InvalidParameter(
                "n_estimators and max_samples must be > 0".to_string(),
            ));
        }

        let sample_size = self.params.max_samples.min(values.len());
        let max_depth = (sample_size as f64).log2().ceil().max(0.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.params.seed);

        let trees = (0..self.params.n_estimators)
            .map(|_| {
                let sample: Vec<f64> = index::sample(&mut rng, values.len(), sample_size)
                    .into_iter()
                    .map(|i| values[i])
                    .collect();
                grow(&sample, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = FittedForest {
            trees,
            sample_size,
            offset: 0.0,
        };
        let mut train_scores: Vec<f64> = values.iter().map(|&v| forest.score(v)).collect();
        forest.offset = percentile(&mut train_scores, self.params.contamination * 100.0);

        self.fitted = Some(forest);
        Ok(())
    }

    /// Negated anomaly score per value; lower means more abnormal.
    pub fn score_samples(&self, values: &[f64]) -> Result<Vec<f64>, ModelError> {
        let forest = self.forest()?;
        Ok(values.iter().map(|&v| forest.score(v)).collect())
    }

    /// `score_samples - offset`; negative values are outliers.
    pub fn decision_function(&self, values: &[f64]) -> Result<Vec<f64>, ModelError> {
        let forest = self.forest()?;
        Ok(values.iter().map(|&v| forest.score(v) - forest.offset).collect())
    }

    /// [`OUTLIER`] or [`INLIER`] per value.
    pub fn predict(&self, values: &[f64]) -> Result<Vec<i8>, ModelError> {
        Ok(self
            .decision_function(values)?
            .into_iter()
            .map(|d| if d < 0.0 { OUTLIER } else { INLIER })
            .collect())
    }

    fn forest(&self) -> Result<&FittedForest, ModelError> {
        self.fitted
            .as_ref()
            .ok_or(ModelError::NotFitted("isolation forest"))
    }
}

impl FittedForest {
    fn score(&self, value: f64) -> f64 {
        let mean_depth = self
            .trees
            .iter()
            .map(|t| path_length(t, value, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        let norm = if norm > 0.0 { norm } else { 1.0 };
        -(2f64.powf(-mean_depth / norm))
    }
}

fn grow(sample: &[f64], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
    if depth >= max_depth || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }
    let (min, max) = sample
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min >= max {
        return Node::Leaf { size: sample.len() };
    }

    let threshold = rng.random_range(min..max);
    let (left, right): (Vec<f64>, Vec<f64>) = sample.iter().copied().partition(|&v| v <= threshold);
    Node::Split {
        threshold,
        left: Box::new(grow(&left, depth + 1, max_depth, rng)),
        right: Box::new(grow(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, value: f64, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            threshold,
            left,
            right,
        } => {
            if value <= *threshold {
                path_length(left, value, depth + 1)
            } else {
                path_length(right, value, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search among `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile `q` in [0, 100]; sorts `values` in place.
fn percentile(values: &mut [f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    values[lo] + (values[hi] - values[lo]) * (rank - lo as f64)
}
