//! Seeded isolation forest
//!
//! Points that random axis-aligned splits isolate in few steps are
//! outliers. The forest is fitted from scratch on every call and all
//! randomness comes from one `StdRng` seeded by the caller, so the same
//! matrix and seed always produce the same labels.

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Euler-Mascheroni constant, used by the average path length estimate
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Default subsample size per tree
pub const DEFAULT_MAX_SAMPLES: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_samples: usize,
    /// Expected share of outliers, in (0, 0.5]
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: DEFAULT_MAX_SAMPLES,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit on `rows`, which must all share the same width
    pub fn fit(rows: &[Vec<f64>], params: &ForestParams) -> Self {
        let mut rng = StdRng::seed_from_u64(params.seed);
        let subsample = params.max_samples.min(rows.len()).max(1);
        let height_limit = (subsample as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let picked = if subsample < rows.len() {
                    index::sample(&mut rng, rows.len(), subsample).into_vec()
                } else {
                    (0..rows.len()).collect()
                };
                build(rows, &picked, 0, height_limit, &mut rng)
            })
            .collect();

        Self { trees, subsample }
    }

    /// Anomaly score in (0, 1]; higher is more isolated
    pub fn score(&self, row: &[f64]) -> f64 {
        let norm = average_path_length(self.subsample);
        if norm <= 0.0 {
            return 0.5;
        }
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| path_length(tree, row, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_depth / norm)
    }

    pub fn score_all(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.score(r)).collect()
    }
}

fn build(
    rows: &[Vec<f64>],
    picked: &[usize],
    depth: usize,
    limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= limit || picked.len() <= 1 {
        return Node::Leaf { size: picked.len() };
    }

    let width = rows[picked[0]].len();
    let splittable: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|feature| {
            let (min, max) = picked.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = rows[i][feature];
                (lo.min(v), hi.max(v))
            });
            (max > min).then_some((feature, min, max))
        })
        .collect();

    if splittable.is_empty() {
        return Node::Leaf { size: picked.len() };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(min..max);
    let (left, right): (Vec<usize>, Vec<usize>) =
        picked.iter().copied().partition(|&i| rows[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(rows, &left, depth + 1, limit, rng)),
        right: Box::new(build(rows, &right, depth + 1, limit, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] <= *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful search in a binary search tree of `n` nodes
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

/// Linear-interpolated percentile, `p` in [0, 100]
fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Label each row as outlier (`true`) or inlier
///
/// A row is an outlier when its score is strictly above the
/// `1 - contamination` quantile of all scores in this fit.
pub fn label_outliers(rows: &[Vec<f64>], params: &ForestParams) -> Vec<bool> {
    if rows.is_empty() {
        return Vec::new();
    }
    let forest = IsolationForest::fit(rows, params);
    let scores = forest.score_all(rows);
    let cutoff = percentile(&scores, 100.0 * (1.0 - params.contamination));
    scores.into_iter().map(|s| s > cutoff).collect()
}
