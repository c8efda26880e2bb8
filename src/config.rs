use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults::*;
use crate::model::LabelSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Log output format.
    #[arg(long, global = true, env = "TICKET_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Append logs to this file instead of stdout.
    #[arg(long, global = true, env = "TICKET_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Where the artifact pair lives and which labels it may name.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Directory holding classifier.json and vectorizer.json.
    #[arg(long, env = "TICKET_ARTIFACT_DIR", default_value = DEFAULT_ARTIFACT_DIR)]
    pub artifact_dir: PathBuf,

    /// Ordered, comma-separated label set.
    #[arg(long, env = "TICKET_LABELS", value_delimiter = ',')]
    pub labels: Option<Vec<String>>,
}

impl ModelArgs {
    pub fn label_set(&self) -> LabelSet {
        match &self.labels {
            Some(labels) if !labels.is_empty() => {
                LabelSet::new(labels.iter().map(|l| l.trim().to_string()).collect())
            }
            _ => LabelSet::default(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "TICKET_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Feedback log (JSON Lines).
    #[arg(long, env = "TICKET_FEEDBACK_LOG", default_value = DEFAULT_FEEDBACK_LOG)]
    pub feedback_log: PathBuf,

    /// Seconds between artifact modification checks.
    #[arg(long, env = "TICKET_WATCH_INTERVAL_SECS", default_value_t = DEFAULT_WATCH_INTERVAL_S)]
    pub watch_interval_secs: u64,
}

impl ServeArgs {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }
}

#[derive(Args, Debug, Clone)]
pub struct GatewayArgs {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "TICKET_BIND", default_value = DEFAULT_BIND)]
    pub bind: String,

    /// Base URL of the inference service.
    #[arg(long, env = "TICKET_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Seconds before an upstream prediction times out.
    #[arg(long, env = "TICKET_UPSTREAM_TIMEOUT_SECS", default_value_t = DEFAULT_UPSTREAM_TIMEOUT_S)]
    pub upstream_timeout_secs: u64,

    /// Feedback log (JSON Lines).
    #[arg(long, env = "TICKET_FEEDBACK_LOG", default_value = DEFAULT_FEEDBACK_LOG)]
    pub feedback_log: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RetrainArgs {
    /// Feedback log (JSON Lines).
    #[arg(long, env = "TICKET_FEEDBACK_LOG", default_value = DEFAULT_FEEDBACK_LOG)]
    pub feedback_log: PathBuf,

    /// Training dataset (CSV with Document and Topic_group columns).
    #[arg(long, env = "TICKET_DATASET", default_value = DEFAULT_DATASET)]
    pub dataset: PathBuf,

    /// Feedback records needed before a merge and retrain.
    #[arg(long, env = "TICKET_RETRAIN_THRESHOLD", default_value_t = DEFAULT_RETRAIN_THRESHOLD)]
    pub threshold: usize,

    /// Seconds between feedback checks.
    #[arg(long, env = "TICKET_RETRAIN_INTERVAL_SECS", default_value_t = DEFAULT_RETRAIN_INTERVAL_S)]
    pub interval_secs: u64,

    /// Training command to run instead of this executable's `train` subcommand.
    #[arg(long, env = "TICKET_TRAIN_COMMAND")]
    pub train_command: Option<String>,

    /// Artifact directory handed to the training process.
    #[arg(long, env = "TICKET_ARTIFACT_DIR", default_value = DEFAULT_ARTIFACT_DIR)]
    pub artifact_dir: PathBuf,

    /// Run a single tick and exit.
    #[arg(long)]
    pub once: bool,
}

impl RetrainArgs {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Training dataset (CSV with Document and Topic_group columns).
    #[arg(long, env = "TICKET_DATASET", default_value = DEFAULT_DATASET)]
    pub dataset: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Vocabulary size cap for the TF-IDF vectorizer.
    #[arg(long, env = "TICKET_MAX_FEATURES", default_value_t = DEFAULT_MAX_FEATURES)]
    pub max_features: usize,
}
