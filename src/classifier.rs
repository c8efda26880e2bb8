//! Multinomial logistic regression over sparse TF-IDF rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tfidf::SparseVector;

#[derive(Debug, Clone, Copy)]
pub struct TrainParams {
    pub learning_rate: f64,
    pub iterations: usize,
    pub l2: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            iterations: 500,
            l2: 1e-4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub fit_id: String,
    pub fitted_at: DateTime<Utc>,
    /// Index -> label name, as encoded at training time.
    pub classes: Vec<String>,
    pub n_features: usize,
    /// One weight row per class.
    pub weights: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl LogisticRegression {
    /// Full-batch gradient descent on the softmax cross-entropy loss.
    ///
    /// `targets[i]` indexes into `classes`.
    pub fn fit(
        rows: &[SparseVector],
        targets: &[usize],
        classes: Vec<String>,
        n_features: usize,
        params: TrainParams,
        fit_id: &str,
    ) -> Self {
        let n_classes = classes.len();
        let mut model = Self {
            fit_id: fit_id.to_string(),
            fitted_at: Utc::now(),
            classes,
            n_features,
            weights: vec![vec![0.0; n_features]; n_classes],
            intercepts: vec![0.0; n_classes],
        };
        if rows.is_empty() || n_classes == 0 {
            return model;
        }

        let n = rows.len() as f64;
        for _ in 0..params.iterations {
            let mut grad_w = vec![vec![0.0; n_features]; n_classes];
            let mut grad_b = vec![0.0; n_classes];

            for (row, &target) in rows.iter().zip(targets) {
                let probs = model.probabilities(row);
                for (class, p) in probs.iter().enumerate() {
                    let err = p - if class == target { 1.0 } else { 0.0 };
                    grad_b[class] += err;
                    for &(column, value) in row {
                        grad_w[class][column] += err * value;
                    }
                }
            }

            for class in 0..n_classes {
                model.intercepts[class] -= params.learning_rate * grad_b[class] / n;
                for column in 0..n_features {
                    let w = &mut model.weights[class][column];
                    *w -= params.learning_rate * (grad_w[class][column] / n + params.l2 * *w);
                }
            }
        }
        model
    }

    pub fn probabilities(&self, row: &SparseVector) -> Vec<f64> {
        let scores: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.intercepts)
            .map(|(w, b)| b + row.iter().map(|&(column, value)| w[column] * value).sum::<f64>())
            .collect();

        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }

    /// Index of the most probable class. Ties go to the lower index.
    pub fn predict(&self, row: &SparseVector) -> Option<usize> {
        if let Some(&(column, _)) = row.iter().find(|(column, _)| *column >= self.n_features) {
            tracing::warn!(column, n_features = self.n_features, "Feature column out of range");
            return None;
        }
        let probs = self.probabilities(row);
        let mut best: Option<(usize, f64)> = None;
        for (class, p) in probs.into_iter().enumerate() {
            if best.map_or(true, |(_, bp)| p > bp) {
                best = Some((class, p));
            }
        }
        best.map(|(class, _)| class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> (Vec<SparseVector>, Vec<usize>) {
        let rows = vec![
            vec![(0, 1.0)],
            vec![(0, 0.8), (2, 0.6)],
            vec![(1, 1.0)],
            vec![(1, 0.6), (2, 0.8)],
        ];
        (rows, vec![0, 0, 1, 1])
    }

    #[test]
    fn test_fit_separates_toy_classes() {
        let (rows, targets) = toy();
        let classes = vec!["Access".to_string(), "Hardware".to_string()];
        let model = LogisticRegression::fit(&rows, &targets, classes, 3, TrainParams::default(), "f");

        for (row, &target) in rows.iter().zip(&targets) {
            assert_eq!(model.predict(row), Some(target));
        }
        let probs = model.probabilities(&vec![(0, 1.0)]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_row_predicts_some_class() {
        let (rows, targets) = toy();
        let classes = vec!["Access".to_string(), "Hardware".to_string()];
        let model = LogisticRegression::fit(&rows, &targets, classes, 3, TrainParams::default(), "f");
        assert!(model.predict(&Vec::new()).is_some());
    }

    #[test]
    fn test_out_of_range_feature_is_rejected() {
        let model = LogisticRegression::fit(&[], &[], vec!["Access".to_string()], 2, TrainParams::default(), "f");
        assert_eq!(model.predict(&vec![(5, 1.0)]), None);
    }
}
