//! Plate recognition engine adapter
//!
//! The engine is an external HTTP service: the frame is posted as base64 JSON
//! together with the recognition language, and the engine answers with the
//! text it read and its confidence (0..=100).
//!
//! No retry and no timeout are applied here; a hung engine keeps the scan in
//! flight until it answers.

use crate::domain::types::{CapturedImage, Recognition};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("captured frame is empty")]
    EmptyImage,
    #[error("recognition engine unreachable: {0}")]
    Transport(String),
    #[error("recognition engine returned status {0}")]
    EngineStatus(u16),
    #[error("unusable recognition output: {0}")]
    Malformed(String),
}

/// Something that turns a frame into text plus a confidence score
#[async_trait]
pub trait PlateRecognizer: Send + Sync {
    async fn recognize(
        &self,
        image: &CapturedImage,
        language: &str,
    ) -> Result<Recognition, RecognitionError>;
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image: String,
    language: &'a str,
}

/// Check engine output and clamp the confidence into 0..=100
pub fn sanitize(recognition: Recognition) -> Result<Recognition, RecognitionError> {
    if !recognition.confidence.is_finite() {
        return Err(RecognitionError::Malformed(format!(
            "confidence {}",
            recognition.confidence
        )));
    }
    Ok(Recognition { confidence: recognition.confidence.clamp(0.0, 100.0), ..recognition })
}

/// Recognition engine reached over HTTP
pub struct HttpOcrEngine {
    url: String,
    client: reqwest::Client,
}

impl HttpOcrEngine {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        // Client is built once and reused (connection pooling)
        let client = reqwest::Client::builder().http1_only().build()?;
        Ok(Self { url: url.to_string(), client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PlateRecognizer for HttpOcrEngine {
    async fn recognize(
        &self,
        image: &CapturedImage,
        language: &str,
    ) -> Result<Recognition, RecognitionError> {
        if image.is_empty() {
            return Err(RecognitionError::EmptyImage);
        }

        let start = Instant::now();
        let body = RecognizeRequest { image: STANDARD.encode(&image.data), language };

        let response = self.client.post(&self.url).json(&body).send().await.map_err(|e| {
            error!(url = %self.url, error = %e, "ocr_request_failed");
            RecognitionError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RecognitionError::EngineStatus(status.as_u16()));
        }

        let recognition: Recognition = response
            .json()
            .await
            .map_err(|e| RecognitionError::Malformed(e.to_string()))?;

        debug!(
            bytes = %image.data.len(),
            latency_ms = %start.elapsed().as_millis(),
            confidence = %recognition.confidence,
            "ocr_response"
        );

        sanitize(recognition)
    }
}
