//! Ticket Classifier
//!
//! Classifies short support tickets into a fixed set of categories, collects
//! user corrections as feedback, and folds that feedback back into the model
//! through a retrain loop and an in-process hot-reload watcher.

pub mod api;
pub mod artifacts;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod feedback;
pub mod metrics;
pub mod model;
pub mod retrain;
pub mod serving;
pub mod text;
pub mod tfidf;
pub mod trainer;
pub mod upstream;
pub mod watcher;

pub use model::*;
pub use serving::{ModelHandle, ServingModel};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
    pub const DEFAULT_ARTIFACT_DIR: &str = "artifacts";
    pub const DEFAULT_FEEDBACK_LOG: &str = "logs/feedback.jsonl";
    pub const DEFAULT_DATASET: &str = "data/tickets.csv";
    pub const DEFAULT_WATCH_INTERVAL_S: u64 = 10;
    pub const DEFAULT_RETRAIN_INTERVAL_S: u64 = 30;
    pub const DEFAULT_RETRAIN_THRESHOLD: usize = 10;
    pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:6000";
    pub const DEFAULT_UPSTREAM_TIMEOUT_S: u64 = 10;
    pub const DEFAULT_MAX_FEATURES: usize = 500;

    /// Fixed, ordered ticket categories.
    pub const LABELS: [&str; 8] = [
        "Access",
        "Administrative rights",
        "HR Support",
        "Hardware",
        "Internal Project",
        "Miscellaneous",
        "Purchase",
        "Storage",
    ];
}

/// Error types for the classifier service
pub mod errors {
    use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
    use serde_json::json;

    pub type Result<T> = std::result::Result<T, anyhow::Error>;

    /// Request-facing failures. Each maps to one HTTP status and body.
    #[derive(Debug, thiserror::Error)]
    pub enum ClassifierError {
        #[error("No text provided")]
        InvalidInput,

        #[error("Missing required fields")]
        MissingFields,

        #[error("Model not loaded")]
        ModelUnavailable,

        #[error("Inference failed: {0}")]
        InferenceError(String),

        #[error("Storage error: {0}")]
        StorageError(String),

        #[error("Upstream unavailable: {0}")]
        UpstreamUnavailable(String),
    }

    impl ClassifierError {
        pub fn status_code(&self) -> StatusCode {
            match self {
                ClassifierError::InvalidInput | ClassifierError::MissingFields => {
                    StatusCode::BAD_REQUEST
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        /// Message returned to the client. Internal detail stays in the logs.
        pub fn client_message(&self) -> &'static str {
            match self {
                ClassifierError::InvalidInput => "No text provided",
                ClassifierError::MissingFields => "Missing required fields",
                ClassifierError::ModelUnavailable => "Model not loaded",
                ClassifierError::InferenceError(_) | ClassifierError::UpstreamUnavailable(_) => {
                    "Prediction failed"
                }
                ClassifierError::StorageError(_) => "Failed to save feedback",
            }
        }
    }

    impl IntoResponse for ClassifierError {
        fn into_response(self) -> Response {
            (self.status_code(), Json(json!({ "error": self.client_message() }))).into_response()
        }
    }

    /// Artifact load and validation failures.
    #[derive(Debug, thiserror::Error)]
    pub enum ArtifactError {
        #[error("Artifact not found: {0}")]
        NotFound(String),

        #[error("I/O error on {path}: {source}")]
        Io {
            path: String,
            #[source]
            source: std::io::Error,
        },

        #[error("Serialization error in {path}: {source}")]
        Serialization {
            path: String,
            #[source]
            source: serde_json::Error,
        },

        #[error("Mismatched artifact pair: vectorizer fit {vectorizer}, classifier fit {classifier}")]
        FitMismatch { vectorizer: String, classifier: String },

        #[error("Invalid dimension: expected {expected}, got {actual}")]
        InvalidDimension { expected: usize, actual: usize },

        #[error("Classifier label {0:?} is not in the configured label set")]
        UnknownLabel(String),
    }
}
