use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde_json::{json, Value};
use std::time::Instant;

use super::AppState;
use crate::errors::ClassifierError;
use crate::metrics::get_metrics_collector;
use crate::model::{FeedbackRecord, FeedbackRequest};

const ENDPOINT: &str = "/feedback";

fn non_blank(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

/// POST /feedback
pub async fn feedback(
    State(state): State<AppState>,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<Value>, ClassifierError> {
    let started = Instant::now();
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let text = non_blank(req.text);

    let result = match (text.clone(), non_blank(req.true_label)) {
        (Some(text), Some(true_label)) => {
            let record = FeedbackRecord::new(text, req.prediction.unwrap_or_default(), true_label);
            state
                .feedback
                .append(&record)
                .await
                .map_err(|e| ClassifierError::StorageError(format!("{e:#}")))
                .map(|()| record)
        }
        _ => Err(ClassifierError::MissingFields),
    };

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    let status_code = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    get_metrics_collector().record_request(ENDPOINT, status_code, latency_ms);

    match result {
        Ok(record) => {
            tracing::info!(
                event = "feedback",
                endpoint = ENDPOINT,
                method = "POST",
                input = %record.text,
                true_label = %record.true_label,
                prediction = %record.prediction,
                latency_ms,
                status_code,
            );
            Ok(Json(json!({ "message": "Feedback saved!" })))
        }
        Err(e) => {
            if let ClassifierError::StorageError(detail) = &e {
                tracing::error!(path = %state.feedback.path().display(), error = %detail, "Failed to save feedback");
            }
            tracing::info!(
                event = "feedback",
                endpoint = ENDPOINT,
                method = "POST",
                input = text.as_deref(),
                error = e.client_message(),
                latency_ms,
                status_code,
            );
            Err(e)
        }
    }
}
