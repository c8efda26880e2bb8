//! Offline training procedure and the process boundary the retrain loop
//! uses to invoke it.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use uuid::Uuid;

use crate::artifacts::{ArtifactPair, ArtifactStore};
use crate::classifier::{LogisticRegression, TrainParams};
use crate::dataset::Dataset;
use crate::model::LabelSet;
use crate::text::clean_text;
use crate::tfidf::TfidfVectorizer;

/// Environment variable the child reads its dataset path from.
pub const DATASET_ENV: &str = "TICKET_DATASET";

/// Result of one isolated training run.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u128,
}

/// Capability to turn a dataset into a fresh artifact pair.
///
/// Implementations must not panic or abort the caller on training failure;
/// failures are reported through `TrainingRun::success` or `Err`.
pub trait Trainer {
    fn train(&self, dataset: &Path) -> impl Future<Output = Result<TrainingRun>> + Send;
}

/// Runs training as a child process and captures its output.
#[derive(Debug, Clone)]
pub struct SubprocessTrainer {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl SubprocessTrainer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            envs: Vec::new(),
        }
    }

    /// This executable's `train` subcommand.
    pub fn current_exe() -> Result<Self> {
        let exe = std::env::current_exe().context("Failed to locate current executable")?;
        Ok(Self::new(exe, vec!["train".to_string()]))
    }

    /// Parse a whitespace-separated command line such as `python model_script.py`.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            bail!("Training command is empty");
        };
        Ok(Self::new(program, parts.collect()))
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl Trainer for SubprocessTrainer {
    async fn train(&self, dataset: &Path) -> Result<TrainingRun> {
        let start = Instant::now();
        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env(DATASET_ENV, dataset)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.program.display()))?;

        Ok(TrainingRun {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: start.elapsed().as_millis(),
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub fit_id: String,
    pub rows_used: usize,
    pub rows_dropped_unknown_label: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub n_features: usize,
    pub accuracy: Option<f64>,
    pub classes: BTreeMap<String, ClassReport>,
}

#[derive(Debug, Clone)]
pub struct TrainingOptions {
    pub max_features: usize,
    pub params: TrainParams,
    pub test_fraction_every: usize,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            max_features: crate::defaults::DEFAULT_MAX_FEATURES,
            params: TrainParams::default(),
            test_fraction_every: 5,
        }
    }
}

/// Fit a vectorizer and classifier on the dataset and write them as a
/// matched pair.
pub fn train_artifacts(
    dataset_path: &Path,
    store: &ArtifactStore,
    labels: &LabelSet,
    options: &TrainingOptions,
) -> Result<TrainingReport> {
    let _measurement = crate::measure_operation!("trainer.train_artifacts");
    if !dataset_path.exists() {
        bail!("Dataset {} does not exist", dataset_path.display());
    }
    tracing::info!(path = %dataset_path.display(), "Loading dataset");
    let dataset = Dataset::read(dataset_path)?;

    let mut documents = Vec::new();
    let mut targets = Vec::new();
    let mut dropped = 0usize;
    for (doc, label) in dataset.examples() {
        match labels.index_of(label) {
            Some(_) => {
                documents.push(clean_text(doc));
                targets.push(label.to_string());
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        tracing::warn!(dropped, "Dropped rows with labels outside the label set");
    }
    if documents.is_empty() {
        bail!("Dataset has no usable rows");
    }

    // Sorted unique labels, so indices follow the label set ordering.
    let mut classes: Vec<String> = targets.clone();
    classes.sort();
    classes.dedup();
    let class_index: HashMap<&str, usize> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();
    let encoded = targets
        .iter()
        .map(|t| {
            class_index
                .get(t.as_str())
                .copied()
                .with_context(|| format!("Label {t:?} missing from class index"))
        })
        .collect::<Result<Vec<usize>>>()?;

    let (train_idx, test_idx) = split_indices(&encoded, classes.len(), options.test_fraction_every);
    if train_idx.is_empty() {
        bail!("Training split is empty");
    }
    tracing::info!(train = train_idx.len(), test = test_idx.len(), "Split dataset");

    let fit_id = Uuid::new_v4().to_string();
    let train_docs: Vec<String> = train_idx.iter().map(|&i| documents[i].clone()).collect();
    let vectorizer = TfidfVectorizer::fit(&train_docs, options.max_features, &fit_id);
    let train_rows: Vec<_> = train_docs.iter().map(|d| vectorizer.transform(d)).collect();
    let train_targets: Vec<usize> = train_idx.iter().map(|&i| encoded[i]).collect();

    tracing::info!(n_features = vectorizer.n_features(), classes = classes.len(), "Training classifier");
    let classifier = LogisticRegression::fit(
        &train_rows,
        &train_targets,
        classes.clone(),
        vectorizer.n_features(),
        options.params,
        &fit_id,
    );

    let predictions: Vec<(usize, usize)> = test_idx
        .iter()
        .filter_map(|&i| {
            let row = vectorizer.transform(&documents[i]);
            classifier.predict(&row).map(|p| (encoded[i], p))
        })
        .collect();
    let (accuracy, class_reports) = evaluate(&predictions, &classes);
    match accuracy {
        Some(acc) => tracing::info!(accuracy = acc, "Evaluated on held-out split"),
        None => tracing::warn!("Held-out split is empty, skipping evaluation"),
    }
    for (label, report) in &class_reports {
        tracing::info!(
            label = %label,
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1,
            support = report.support,
            "Class report"
        );
    }

    let report = TrainingReport {
        fit_id: fit_id.clone(),
        rows_used: documents.len(),
        rows_dropped_unknown_label: dropped,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        n_features: vectorizer.n_features(),
        accuracy,
        classes: class_reports,
    };

    let pair = ArtifactPair { classifier, vectorizer };
    pair.validate(labels)?;
    store.save_pair(&pair)?;
    Ok(report)
}

/// Every `every`-th row goes to the test split, counted per class when every
/// class has at least two rows, otherwise over the whole dataset.
fn split_indices(encoded: &[usize], n_classes: usize, every: usize) -> (Vec<usize>, Vec<usize>) {
    let every = every.max(2);
    let mut counts = vec![0usize; n_classes];
    for &c in encoded {
        counts[c] += 1;
    }
    let stratify = counts.iter().all(|&n| n >= 2);

    let mut seen = vec![0usize; n_classes];
    let mut global = 0usize;
    let (mut train, mut test) = (Vec::new(), Vec::new());
    for (i, &c) in encoded.iter().enumerate() {
        let position = if stratify { &mut seen[c] } else { &mut global };
        *position += 1;
        if *position % every == 0 {
            test.push(i);
        } else {
            train.push(i);
        }
    }
    (train, test)
}

/// `(truth, predicted)` pairs -> accuracy and per-class report.
fn evaluate(
    predictions: &[(usize, usize)],
    classes: &[String],
) -> (Option<f64>, BTreeMap<String, ClassReport>) {
    if predictions.is_empty() {
        return (None, BTreeMap::new());
    }
    let correct = predictions.iter().filter(|(t, p)| t == p).count();
    let accuracy = correct as f64 / predictions.len() as f64;

    let mut reports = BTreeMap::new();
    for (c, label) in classes.iter().enumerate() {
        let tp = predictions.iter().filter(|&&(t, p)| t == c && p == c).count() as f64;
        let predicted = predictions.iter().filter(|&&(_, p)| p == c).count() as f64;
        let support = predictions.iter().filter(|&&(t, _)| t == c).count();
        let precision = if predicted > 0.0 { tp / predicted } else { 0.0 };
        let recall = if support > 0 { tp / support as f64 } else { 0.0 };
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        reports.insert(
            label.clone(),
            ClassReport {
                precision,
                recall,
                f1,
                support,
            },
        );
    }
    (Some(accuracy), reports)
}
