// Random Forest
// Bootstrap-aggregated Gini decision trees over sparse TF-IDF rows

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use super::classifier::TrainingControl;
use super::error::DetectionError;
use super::vectorizer::SparseRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForestParams {
    pub tree_count: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TreeNode {
    Leaf {
        positive_fraction: f64,
        samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Value of `feature` in a sparse row (zero when absent).
fn feature_value(row: &SparseRow, feature: usize) -> f64 {
    match row.binary_search_by_key(&feature, |(idx, _)| *idx) {
        Ok(pos) => row[pos].1,
        Err(_) => 0.0,
    }
}

fn gini(positives: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let p = positives as f64 / total as f64;
    2.0 * p * (1.0 - p)
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    decrease: f64,
}

struct TreeBuilder<'a> {
    rows: &'a [SparseRow],
    labels: &'a [bool],
    params: &'a ForestParams,
    max_features: usize,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl<'a> TreeBuilder<'a> {
    fn leaf(&mut self, samples: &[usize]) -> usize {
        let positives = samples.iter().filter(|&&s| self.labels[s]).count();
        self.nodes.push(TreeNode::Leaf {
            positive_fraction: positives as f64 / samples.len().max(1) as f64,
            samples: samples.len(),
        });
        self.nodes.len() - 1
    }

    /// Best threshold for one feature, or None when the feature is constant
    /// in this node. The inner Option is None when no threshold satisfies the
    /// leaf-size constraint.
    fn best_threshold(&self, samples: &[usize], feature: usize) -> Option<Option<SplitCandidate>> {
        let mut values: Vec<(f64, bool)> = samples
            .iter()
            .map(|&s| (feature_value(&self.rows[s], feature), self.labels[s]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = values.len();
        if values[0].0 == values[n - 1].0 {
            return None;
        }

        let total_pos = values.iter().filter(|(_, y)| *y).count();
        let parent = gini(total_pos, n) * n as f64;
        let min_leaf = self.params.min_samples_leaf.max(1);

        let mut best: Option<SplitCandidate> = None;
        let mut left_pos = 0usize;
        for i in 0..n - 1 {
            if values[i].1 {
                left_pos += 1;
            }
            if values[i].0 == values[i + 1].0 {
                continue;
            }
            let left_n = i + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf {
                continue;
            }
            let child = gini(left_pos, left_n) * left_n as f64
                + gini(total_pos - left_pos, right_n) * right_n as f64;
            let decrease = parent - child;
            if best.map_or(true, |b| decrease > b.decrease) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: (values[i].0 + values[i + 1].0) / 2.0,
                    decrease,
                });
            }
        }
        Some(best)
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let n = samples.len();
        let positives = samples.iter().filter(|&&s| self.labels[s]).count();
        let pure = positives == 0 || positives == n;

        if pure || depth >= self.params.max_depth || n < self.params.min_samples_split.max(2) {
            return self.leaf(&samples);
        }

        // Features that are constant zero in this node can never split it.
        let mut candidates: Vec<usize> = samples
            .iter()
            .flat_map(|&s| self.rows[s].iter().map(|(idx, _)| *idx))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        candidates.sort_unstable();
        candidates.shuffle(rng);

        let mut examined = 0usize;
        let mut best: Option<SplitCandidate> = None;
        for feature in candidates {
            if examined >= self.max_features {
                break;
            }
            let Some(candidate) = self.best_threshold(&samples, feature) else {
                continue;
            };
            examined += 1;
            if let Some(c) = candidate {
                if best.map_or(true, |b| c.decrease > b.decrease) {
                    best = Some(c);
                }
            }
        }

        let Some(split) = best.filter(|s| s.decrease > 1e-12) else {
            return self.leaf(&samples);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| feature_value(&self.rows[s], split.feature) <= split.threshold);

        self.importances[split.feature] += split.decrease;

        let index = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            positive_fraction: 0.0,
            samples: n,
        });
        let left_idx = self.build(left, depth + 1, rng);
        let right_idx = self.build(right, depth + 1, rng);
        self.nodes[index] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_idx,
            right: right_idx,
        };
        index
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Positive-class fraction of the leaf this row falls into.
    pub fn leaf_fraction(&self, row: &SparseRow) -> f64 {
        let mut index = 0usize;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf {
                    positive_fraction, ..
                }) => return *positive_fraction,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    index = if feature_value(row, *feature) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => return 0.0,
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<(), DetectionError> {
        if self.nodes.is_empty() {
            return Err(DetectionError::ModelFormat("tree without nodes".to_string()));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split {
                feature,
                left,
                right,
                ..
            } = node
            {
                // Children are always pushed after their parent, so this also rules out cycles.
                if *feature >= n_features
                    || *left <= i
                    || *right <= i
                    || *left >= self.nodes.len()
                    || *right >= self.nodes.len()
                {
                    return Err(DetectionError::ModelFormat(format!(
                        "malformed split node {}",
                        i
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn fit(
        rows: &[SparseRow],
        labels: &[bool],
        n_features: usize,
        params: &ForestParams,
        control: &TrainingControl,
    ) -> Result<Self, DetectionError> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(DetectionError::InsufficientData(format!(
                "{} rows for {} labels",
                rows.len(),
                labels.len()
            )));
        }

        let max_features = ((n_features as f64).sqrt().ceil() as usize).max(1);
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.tree_count);
        let mut importance_sum = vec![0.0; n_features];
        let mut splitting_trees = 0usize;

        for t in 0..params.tree_count {
            control.check()?;

            let bootstrap: Vec<usize> = (0..rows.len()).map(|_| rng.gen_range(0..rows.len())).collect();
            let mut builder = TreeBuilder {
                rows,
                labels,
                params,
                max_features,
                nodes: Vec::new(),
                importances: vec![0.0; n_features],
            };
            builder.build(bootstrap, 0, &mut rng);

            let total: f64 = builder.importances.iter().sum();
            if total > 0.0 {
                splitting_trees += 1;
                for (acc, v) in importance_sum.iter_mut().zip(&builder.importances) {
                    *acc += v / total;
                }
            }
            debug!("[forest] Tree {} built with {} nodes", t, builder.nodes.len());
            trees.push(DecisionTree {
                nodes: builder.nodes,
            });
        }

        let mut feature_importances = importance_sum;
        if splitting_trees > 0 {
            let sum: f64 = feature_importances.iter().sum();
            if sum > 0.0 {
                for v in feature_importances.iter_mut() {
                    *v /= sum;
                }
            }
        }

        Ok(Self {
            trees,
            n_features,
            feature_importances,
        })
    }

    /// Mean of the trees' leaf positive fractions.
    pub fn predict_probability(&self, row: &SparseRow) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.trees.iter().map(|t| t.leaf_fraction(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn validate(&self, n_features: usize) -> Result<(), DetectionError> {
        if self.n_features != n_features || self.feature_importances.len() != n_features {
            return Err(DetectionError::ModelFormat(format!(
                "forest expects {} features, vectorizer has {}",
                self.n_features, n_features
            )));
        }
        if self.trees.is_empty() {
            return Err(DetectionError::ModelFormat("forest without trees".to_string()));
        }
        self.trees.iter().try_for_each(|t| t.validate(n_features))
    }
}
