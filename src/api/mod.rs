use axum::{
    http::{header, Method},
    routing::{get, post},
    serve, Router,
};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::errors::ClassifierError;
use crate::feedback::FeedbackLog;
use crate::serving::ModelHandle;
use crate::upstream::UpstreamClient;

mod feedback;
mod health;
mod predict;

/// Where `/predict` gets its answer from.
#[derive(Clone)]
pub enum PredictBackend {
    /// In-process model, hot-swapped by the watcher.
    Local(ModelHandle),
    /// Remote inference service behind a gateway.
    Remote(UpstreamClient),
}

impl PredictBackend {
    pub async fn predict(&self, text: &str) -> Result<String, ClassifierError> {
        match self {
            PredictBackend::Local(handle) => handle.predict(text),
            PredictBackend::Remote(upstream) => upstream.predict(text).await,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub backend: PredictBackend,
    pub feedback: FeedbackLog,
}

pub fn router(state: AppState) -> Router {
    // Pre-flight OPTIONS requests are answered here, before routing, so they
    // succeed whatever the model state.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE])
        .allow_methods([Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/predict", post(predict::predict))
        .route("/feedback", post(feedback::feedback))
        .layer(cors)
        .with_state(state)
}

pub async fn run<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    tracing::info!("API listening on {}", listener.local_addr()?);
    serve(listener, app).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
