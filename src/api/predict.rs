use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::time::Instant;

use super::AppState;
use crate::errors::ClassifierError;
use crate::metrics::get_metrics_collector;
use crate::model::{PredictRequest, PredictResponse};

const ENDPOINT: &str = "/predict";

/// POST /predict
pub async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ClassifierError> {
    let started = Instant::now();

    // Malformed or non-JSON bodies are treated the same as a missing field.
    let text = body
        .ok()
        .and_then(|Json(req)| req.text)
        .filter(|text| !text.trim().is_empty());

    let result = match text.as_deref() {
        Some(text) => state.backend.predict(text).await,
        None => Err(ClassifierError::InvalidInput),
    };

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    let status_code = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    let prediction = result.as_ref().ok().map(String::as_str);
    let error = result.as_ref().err().map(ClassifierError::client_message);

    match &result {
        Err(e @ (ClassifierError::InferenceError(_) | ClassifierError::UpstreamUnavailable(_))) => {
            tracing::error!(error = %e, "Prediction failed");
        }
        Err(ClassifierError::ModelUnavailable) => {
            tracing::warn!("Prediction requested with no model loaded");
        }
        _ => {}
    }

    tracing::info!(
        event = "prediction",
        endpoint = ENDPOINT,
        method = "POST",
        input = text.as_deref(),
        prediction,
        error,
        latency_ms,
        status_code,
    );
    get_metrics_collector().record_request(ENDPOINT, status_code, latency_ms);

    result.map(|prediction| Json(PredictResponse { prediction }))
}
