//! Feedback accumulator and retrain trigger.
//!
//! One tick: read the feedback log; below the threshold stay `Waiting`;
//! otherwise merge into the dataset (`Merging`), clear the merged feedback,
//! and run the trainer (`Retraining`). Every path ends back in `Waiting`.
//! The dataset write always commits before the feedback log is cleared.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dataset::{Dataset, MergeStats};
use crate::feedback::FeedbackLog;
use crate::trainer::{Trainer, TrainingRun};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Waiting,
    Merging,
    Retraining,
}

impl TriggerState {
    fn as_str(self) -> &'static str {
        match self {
            TriggerState::Waiting => "waiting",
            TriggerState::Merging => "merging",
            TriggerState::Retraining => "retraining",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingOutcome {
    Succeeded { exit_code: Option<i32> },
    Failed { exit_code: Option<i32> },
    /// The trainer could not be started at all.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrainOutcome {
    Waiting { count: usize, threshold: usize },
    /// Merge failed; feedback stays in the log for the next tick.
    MergeFailed,
    Retrained { merge: MergeStats, training: TrainingOutcome },
}

pub struct RetrainTrigger<T> {
    feedback: FeedbackLog,
    dataset_path: PathBuf,
    threshold: usize,
    trainer: T,
    state: TriggerState,
}

impl<T: Trainer> RetrainTrigger<T> {
    pub fn new(feedback: FeedbackLog, dataset_path: impl Into<PathBuf>, threshold: usize, trainer: T) -> Self {
        Self {
            feedback,
            dataset_path: dataset_path.into(),
            threshold,
            trainer,
            state: TriggerState::Waiting,
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    fn transition(&mut self, next: TriggerState) {
        tracing::info!(
            event = "retrain_transition",
            from = self.state.as_str(),
            to = next.as_str(),
            "Retrain trigger transition"
        );
        self.state = next;
    }

    pub async fn tick(&mut self) -> RetrainOutcome {
        let batch = match self.feedback.read_batch() {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "Failed to read feedback log");
                return RetrainOutcome::Waiting { count: 0, threshold: self.threshold };
            }
        };

        let count = batch.len();
        if count < self.threshold {
            tracing::info!(count, threshold = self.threshold, "Waiting for feedback");
            return RetrainOutcome::Waiting { count, threshold: self.threshold };
        }
        tracing::info!(count, threshold = self.threshold, "Feedback threshold reached");

        self.transition(TriggerState::Merging);
        let merge = match self.merge(&batch) {
            Ok(stats) => stats,
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "Merge failed, feedback kept for next tick");
                self.transition(TriggerState::Waiting);
                return RetrainOutcome::MergeFailed;
            }
        };

        self.transition(TriggerState::Retraining);
        let training = self.retrain().await;
        self.transition(TriggerState::Waiting);
        RetrainOutcome::Retrained { merge, training }
    }

    fn merge(&self, batch: &crate::feedback::FeedbackBatch) -> Result<MergeStats> {
        let _measurement = crate::measure_operation!("retrain.merge");
        let mut dataset = Dataset::read(&self.dataset_path).context("Failed to load dataset")?;
        let stats = dataset.merge_feedback(&batch.records);
        dataset
            .write_atomic(&self.dataset_path)
            .context("Failed to persist merged dataset")?;

        // Only after the dataset is durable.
        self.feedback.clear_batch(batch).context("Failed to clear feedback log")?;

        tracing::info!(
            rows_before = stats.rows_before,
            feedback_rows = stats.feedback_rows,
            rows_after = stats.rows_after,
            duplicates_dropped = stats.duplicates_dropped(),
            "Feedback merged and dataset updated"
        );
        Ok(stats)
    }

    async fn retrain(&self) -> TrainingOutcome {
        let _measurement = crate::measure_operation!("retrain.training");
        tracing::info!(dataset = %self.dataset_path.display(), "Retraining started");
        match self.trainer.train(&self.dataset_path).await {
            Ok(run) => log_training_run(run),
            Err(e) => {
                tracing::error!(error = %format!("{e:#}"), "Retraining could not be started");
                TrainingOutcome::Unavailable
            }
        }
    }

    /// Tick forever on `interval`.
    pub async fn run(mut self, interval: Duration) {
        tracing::info!(
            interval_s = interval.as_secs(),
            threshold = self.threshold,
            feedback = %self.feedback.path().display(),
            "Retrainer started, watching for feedback"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}

fn log_training_run(run: TrainingRun) -> TrainingOutcome {
    if run.success {
        tracing::info!(
            exit_code = ?run.exit_code,
            duration_ms = run.duration_ms as u64,
            stdout = %run.stdout,
            stderr = %run.stderr,
            "Retraining complete"
        );
        TrainingOutcome::Succeeded { exit_code: run.exit_code }
    } else {
        tracing::error!(
            exit_code = ?run.exit_code,
            duration_ms = run.duration_ms as u64,
            stdout = %run.stdout,
            stderr = %run.stderr,
            "Retraining failed"
        );
        TrainingOutcome::Failed { exit_code: run.exit_code }
    }
}
