//! Gradient-boosted regression trees on squared loss.
//!
//! Depth-limited CART-style trees fit to residuals with shrinkage, plus
//! optional early stopping against a held-out evaluation set. Sized for the
//! short monthly feature frames this crate produces.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GbtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Stop when the eval RMSE has not improved for this many rounds.
    pub early_stopping_rounds: Option<usize>,
}

impl Default for GbtParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 5,
            min_samples_leaf: 2,
            early_stopping_rounds: Some(50),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    fn fit(
        rows: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        max_depth: usize,
        min_samples_leaf: usize,
    ) -> Self {
        Self {
            root: build_node(rows, targets, indices, max_depth, min_samples_leaf),
        }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

fn mean_of(targets: &[f64], indices: &[usize]) -> f64 {
    if indices.is_empty() {
        return 0.0;
    }
    indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64
}

fn build_node(
    rows: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    depth: usize,
    min_samples_leaf: usize,
) -> Node {
    if depth == 0 || indices.len() < 2 * min_samples_leaf {
        return Node::Leaf(mean_of(targets, indices));
    }
    match best_split(rows, targets, indices, min_samples_leaf) {
        None => Node::Leaf(mean_of(targets, indices)),
        Some((feature, threshold)) => {
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| rows[i][feature] <= threshold);
            if left.is_empty() || right.is_empty() {
                return Node::Leaf(mean_of(targets, indices));
            }
            Node::Split {
                feature,
                threshold,
                left: Box::new(build_node(
                    rows,
                    targets,
                    &left,
                    depth - 1,
                    min_samples_leaf,
                )),
                right: Box::new(build_node(
                    rows,
                    targets,
                    &right,
                    depth - 1,
                    min_samples_leaf,
                )),
            }
        }
    }
}

/// Scans every feature for the split with the largest squared-error
/// reduction. Thresholds are midpoints between consecutive distinct values.
fn best_split(
    rows: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64)> {
    let n_features = rows.first()?.len();
    let total_sum: f64 = indices.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| targets[i] * targets[i]).sum();
    let n = indices.len() as f64;
    let base_sse = total_sq - total_sum * total_sum / n;

    let mut best: Option<(usize, f64, f64)> = None;
    for feature in 0..n_features {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| rows[a][feature].total_cmp(&rows[b][feature]));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for split_at in 1..sorted.len() {
            let prev = sorted[split_at - 1];
            left_sum += targets[prev];
            left_sq += targets[prev] * targets[prev];

            let prev_value = rows[prev][feature];
            let next_value = rows[sorted[split_at]][feature];
            if prev_value == next_value {
                continue;
            }
            if split_at < min_samples_leaf || sorted.len() - split_at < min_samples_leaf {
                continue;
            }

            let left_n = split_at as f64;
            let right_n = n - left_n;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);
            let gain = base_sse - sse;
            if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                best = Some((feature, (prev_value + next_value) / 2.0, gain));
            }
        }
    }
    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// A fitted boosted ensemble.
#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    params: GbtParams,
    base_prediction: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    /// Fits the ensemble to `rows`/`targets`. When an eval set is given, the
    /// ensemble is truncated to the round with the best eval RMSE once no
    /// improvement is seen for `early_stopping_rounds` rounds.
    pub fn fit(
        params: GbtParams,
        rows: &[Vec<f64>],
        targets: &[f64],
        eval: Option<(&[Vec<f64>], &[f64])>,
    ) -> Self {
        let base_prediction = if targets.is_empty() {
            0.0
        } else {
            targets.iter().sum::<f64>() / targets.len() as f64
        };
        let mut model = Self {
            params: params.clone(),
            base_prediction,
            trees: Vec::new(),
        };
        if rows.is_empty() {
            return model;
        }

        let indices: Vec<usize> = (0..rows.len()).collect();
        let mut train_pred = vec![base_prediction; rows.len()];
        let mut eval_pred: Option<Vec<f64>> =
            eval.map(|(eval_rows, _)| vec![base_prediction; eval_rows.len()]);
        let mut best_rmse = f64::INFINITY;
        let mut best_round = 0usize;
        let mut stale_rounds = 0usize;

        for round in 0..params.n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&train_pred)
                .map(|(t, p)| t - p)
                .collect();
            let tree = RegressionTree::fit(
                rows,
                &residuals,
                &indices,
                params.max_depth,
                params.min_samples_leaf,
            );
            for (i, row) in rows.iter().enumerate() {
                train_pred[i] += params.learning_rate * tree.predict(row);
            }
            if let (Some((eval_rows, eval_targets)), Some(pred)) = (eval, eval_pred.as_mut()) {
                for (i, row) in eval_rows.iter().enumerate() {
                    pred[i] += params.learning_rate * tree.predict(row);
                }
                let rmse = (eval_targets
                    .iter()
                    .zip(pred.iter())
                    .map(|(t, p)| (t - p).powi(2))
                    .sum::<f64>()
                    / eval_targets.len().max(1) as f64)
                    .sqrt();
                if rmse + 1e-12 < best_rmse {
                    best_rmse = rmse;
                    best_round = round + 1;
                    stale_rounds = 0;
                } else {
                    stale_rounds += 1;
                }
            }
            model.trees.push(tree);

            if let Some(patience) = params.early_stopping_rounds {
                if eval.is_some() && stale_rounds >= patience {
                    break;
                }
            }
        }

        if eval.is_some() && best_round > 0 {
            model.trees.truncate(best_round);
            debug!(
                rounds = model.trees.len(),
                eval_rmse = best_rmse,
                "boosting stopped at best eval round"
            );
        }
        model
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut prediction = self.base_prediction;
        for tree in &self.trees {
            prediction += self.params.learning_rate * tree.predict(row);
        }
        prediction
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        // y = 10 for x < 0.5, 20 otherwise; a single split captures it.
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 40.0]).collect();
        let targets: Vec<f64> = rows
            .iter()
            .map(|r| if r[0] < 0.5 { 10.0 } else { 20.0 })
            .collect();
        (rows, targets)
    }

    #[test]
    fn learns_a_step_function() {
        let (rows, targets) = step_data();
        let model = GradientBoostedTrees::fit(
            GbtParams {
                n_estimators: 100,
                learning_rate: 0.3,
                ..Default::default()
            },
            &rows,
            &targets,
            None,
        );
        assert!((model.predict(&[0.1]) - 10.0).abs() < 0.5);
        assert!((model.predict(&[0.9]) - 20.0).abs() < 0.5);
    }

    #[test]
    fn constant_targets_yield_the_mean_without_splits() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let targets = vec![7.0; 10];
        let model = GradientBoostedTrees::fit(GbtParams::default(), &rows, &targets, None);
        assert!((model.predict(&[3.0]) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn early_stopping_truncates_the_ensemble() {
        let (rows, targets) = step_data();
        let (eval_rows, eval_targets) = step_data();
        let model = GradientBoostedTrees::fit(
            GbtParams {
                n_estimators: 200,
                learning_rate: 0.3,
                early_stopping_rounds: Some(5),
                ..Default::default()
            },
            &rows,
            &targets,
            Some((&eval_rows, &eval_targets)),
        );
        assert!(model.n_trees() < 200);
        assert!((model.predict(&[0.9]) - 20.0).abs() < 0.5);
    }

    #[test]
    fn respects_min_samples_leaf() {
        let rows: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let targets = vec![1.0, 1.0, 1.0, 100.0];
        let model = GradientBoostedTrees::fit(
            GbtParams {
                n_estimators: 1,
                learning_rate: 1.0,
                max_depth: 1,
                min_samples_leaf: 2,
                early_stopping_rounds: None,
            },
            &rows,
            &targets,
            None,
        );
        // The lone outlier cannot sit in its own leaf; the split must keep
        // two samples per side.
        let high = model.predict(&[3.0]);
        assert!(high < 100.0);
    }

    #[test]
    fn empty_training_set_predicts_zero() {
        let model = GradientBoostedTrees::fit(GbtParams::default(), &[], &[], None);
        assert_eq!(model.predict(&[1.0, 2.0]), 0.0);
    }
}
