use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;

use crate::models::detection::Detection;

/// The external detection model, seen by the core as an opaque async
/// function from image bytes to a detection list.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image_bytes: &[u8]) -> Result<Vec<Detection>, DetectorError>;
}

/// Client for an HTTP inference endpoint serving the warehouse model.
pub struct HttpDetector {
    http: Client,
    endpoint: String,
    api_token: Option<String>,
}

#[derive(Deserialize)]
struct DetectResponse {
    detections: Vec<Detection>,
}

impl HttpDetector {
    pub fn new(endpoint: String, api_token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            api_token,
        }
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image_bytes: &[u8]) -> Result<Vec<Detection>, DetectorError> {
        let request_body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(image_bytes),
        });

        let mut request = self.http.post(&self.endpoint).json(&request_body);
        if let Some(ref token) = self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(DetectorError::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(DetectorError::Api { status, message });
        }

        let parsed: DetectResponse = response.json().await.map_err(DetectorError::Http)?;
        Ok(parsed.detections)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("detection request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("detection endpoint returned {status}: {message}")]
    Api { status: u16, message: String },
}
