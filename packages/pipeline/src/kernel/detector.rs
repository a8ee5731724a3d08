//! HTTP client for the AI-detection scoring endpoint.
//!
//! Single POST endpoint taking the full document text. Non-2xx responses
//! and transport failures both surface as `AiService` errors, which the
//! worker treats as transient.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::traits::{BaseDetector, DetectionResponse};
use crate::error::PipelineError;

pub struct DetectorClient {
    client: Client,
    endpoint: String,
}

#[derive(Serialize)]
struct DetectionRequest<'a> {
    text: &'a str,
}

impl DetectorClient {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::AiService(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl BaseDetector for DetectorClient {
    async fn detect(&self, text: &str) -> Result<DetectionResponse, PipelineError> {
        debug!(chars = text.chars().count(), "calling detection endpoint");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&DetectionRequest { text })
            .send()
            .await
            .map_err(|e| PipelineError::AiService(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(PipelineError::AiService(format!(
                "HTTP {}: {}",
                status.as_u16(),
                snippet
            )));
        }

        response
            .json::<DetectionResponse>()
            .await
            .map_err(|e| PipelineError::AiService(format!("malformed response: {}", e)))
    }
}
