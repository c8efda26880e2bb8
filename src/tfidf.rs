//! TF-IDF text vectorizer.
//!
//! Vocabulary is capped at `max_features` terms ranked by corpus frequency.
//! IDF is smoothed (`ln((1 + n) / (1 + df)) + 1`) and rows are L2-normalised,
//! so every transformed document is a unit vector or all zeros.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::text::tokenize;

/// Sparse feature vector: sorted `(column, value)` pairs.
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    pub fit_id: String,
    pub fitted_at: DateTime<Utc>,
    pub vocabulary: BTreeMap<String, usize>,
    pub idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Fit on already-cleaned documents.
    pub fn fit(documents: &[String], max_features: usize, fit_id: &str) -> Self {
        let mut term_counts: HashMap<&str, usize> = HashMap::new();
        let mut doc_freq: HashMap<&str, usize> = HashMap::new();

        for doc in documents {
            let mut seen: Vec<&str> = Vec::new();
            for term in tokenize(doc) {
                *term_counts.entry(term).or_insert(0) += 1;
                if !seen.contains(&term) {
                    seen.push(term);
                }
            }
            for term in seen {
                *doc_freq.entry(term).or_insert(0) += 1;
            }
        }

        // Highest count first, ties broken alphabetically for determinism.
        let mut ranked: Vec<(&str, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(max_features);

        let mut kept: Vec<&str> = ranked.into_iter().map(|(term, _)| term).collect();
        kept.sort_unstable();

        let n_docs = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(kept.len());
        for (column, term) in kept.into_iter().enumerate() {
            let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term.to_string(), column);
        }

        Self {
            fit_id: fit_id.to_string(),
            fitted_at: Utc::now(),
            vocabulary,
            idf,
        }
    }

    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    /// First vocabulary entry whose column has no IDF weight.
    pub fn out_of_range_term(&self) -> Option<(&str, usize)> {
        self.vocabulary
            .iter()
            .find(|(_, &column)| column >= self.idf.len())
            .map(|(term, &column)| (term.as_str(), column))
    }

    /// Transform one already-cleaned document.
    pub fn transform(&self, document: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in tokenize(document) {
            if let Some(&column) = self.vocabulary.get(term) {
                *counts.entry(column).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .filter_map(|(column, tf)| self.idf.get(column).map(|idf| (column, tf * idf)))
            .collect();

        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in row.iter_mut() {
                *v /= norm;
            }
        }
        row
    }
}
