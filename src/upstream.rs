use std::time::Duration;

use crate::errors::ClassifierError;
use crate::model::{PredictRequest, PredictResponse};

/// HTTP client for a remote inference service exposing `POST /predict`.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    predict_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            predict_url: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Forward one prediction. Transport failures map to
    /// `UpstreamUnavailable`, any non-success or malformed reply to
    /// `InferenceError`; both surface to clients as the same generic 500.
    pub async fn predict(&self, text: &str) -> Result<String, ClassifierError> {
        let body = PredictRequest {
            text: Some(text.to_string()),
        };
        let response = self
            .client
            .post(&self.predict_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClassifierError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ClassifierError::InferenceError(format!(
                "upstream returned {status}: {detail}"
            )));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::InferenceError(format!("invalid upstream response: {e}")))?;
        Ok(parsed.prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_url_joins_cleanly() {
        let client = UpstreamClient::new("http://ml:6000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.predict_url(), "http://ml:6000/predict");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UpstreamClient::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.predict("vpn").await.unwrap_err();
        assert!(matches!(err, ClassifierError::UpstreamUnavailable(_)));
        assert_eq!(err.client_message(), "Prediction failed");
    }
}
