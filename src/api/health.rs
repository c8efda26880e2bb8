use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::{AppState, PredictBackend};
use crate::metrics::get_metrics_collector;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    match &state.backend {
        PredictBackend::Local(handle) => match handle.current() {
            Some(model) => Json(json!({
                "status": "healthy",
                "version": crate::VERSION,
                "model_loaded": true,
                "fit_id": model.fit_id(),
                "classes": model.classes(),
                "loaded_at": model.loaded_at,
            })),
            None => Json(json!({
                "status": "degraded",
                "version": crate::VERSION,
                "model_loaded": false,
            })),
        },
        PredictBackend::Remote(upstream) => Json(json!({
            "status": "healthy",
            "version": crate::VERSION,
            "upstream": upstream.predict_url(),
        })),
    }
}

/// GET /metrics
pub async fn metrics() -> Json<Value> {
    Json(json!({ "endpoints": get_metrics_collector().summaries() }))
}
