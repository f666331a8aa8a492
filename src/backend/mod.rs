// src/backend/mod.rs
//! The `PredictionBackend` capability: everything the workflow needs from
//! its external collaborators, behind one trait so the live HTTP wiring and
//! the demo simulation are interchangeable.

pub mod http;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::classify::RawPrediction;
use crate::config::{BackendMode, FesatConfig};
use crate::error::FesatError;

pub use http::HttpBackend;
pub use mock::MockBackend;

/// Wire up the backend implementation selected by configuration.
pub fn select_backend(config: &FesatConfig) -> Arc<dyn PredictionBackend> {
    match config.backend_mode {
        BackendMode::Live => Arc::new(HttpBackend::from_config(config)),
        BackendMode::Mock => Arc::new(MockBackend::new(Duration::from_millis(
            config.mock_latency_ms,
        ))),
    }
}

/// Image bytes as picked by the user. Owned by the workflow only until the
/// upload completes; the [`UploadReceipt`] supersedes it.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Self {
        let mime = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .to_string();
        Self {
            file_name: file_name.to_string(),
            mime,
            bytes,
        }
    }
}

/// Structured upload acknowledgment: the stored file's id and its
/// server-side path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub stored_id: String,
    pub path: String,
}

impl UploadReceipt {
    /// Parse the legacy reply shape: a bare path containing an `/uploads/`
    /// segment. Fails typed when the shape does not match instead of
    /// mis-splitting.
    pub fn from_path(path: &str) -> Result<Self, FesatError> {
        let trimmed = path.trim();
        let stored_id = trimmed
            .split_once("/uploads/")
            .map(|(_, rest)| rest)
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .ok_or_else(|| {
                FesatError::UnexpectedResponse(format!(
                    "upload reply is not an /uploads/ path: {trimmed:?}"
                ))
            })?;

        Ok(Self {
            stored_id: stored_id.to_string(),
            path: trimmed.to_string(),
        })
    }
}

/// A question about the current prediction, forwarded to the explanation
/// endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    pub prediction: String,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Record sent to the comment endpoint when a user overrides a label.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionLog {
    pub comment: String,
    pub image_path: String,
    pub classification: String,
    pub changed_classification: String,
}

#[async_trait]
pub trait PredictionBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Store the image, returning its server-side reference.
    async fn upload(&self, image: &ImagePayload) -> Result<UploadReceipt, FesatError>;

    /// Classify a stored image. `image` is passed along for deployments
    /// whose predict endpoint takes the raw bytes instead of a reference.
    async fn predict(
        &self,
        receipt: &UploadReceipt,
        image: &ImagePayload,
    ) -> Result<RawPrediction, FesatError>;

    /// Answer a free-text question about a prediction.
    async fn explain(&self, request: &ExplainRequest) -> Result<String, FesatError>;

    /// Move the stored image into the folder named after a corrected label.
    async fn relocate_reference(
        &self,
        receipt: &UploadReceipt,
        folder_name: &str,
    ) -> Result<(), FesatError>;

    /// Log a correction comment for later model improvement.
    async fn log_comment(&self, entry: &CorrectionLog) -> Result<(), FesatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_from_uploads_path() {
        let receipt = UploadReceipt::from_path("/uploads/bite_123.jpg").unwrap();
        assert_eq!(receipt.stored_id, "bite_123.jpg");
        assert_eq!(receipt.path, "/uploads/bite_123.jpg");

        let receipt = UploadReceipt::from_path("https://host.example/uploads/x.png\n").unwrap();
        assert_eq!(receipt.stored_id, "x.png");
    }

    #[test]
    fn receipt_rejects_unexpected_shapes() {
        assert!(UploadReceipt::from_path("/files/bite.jpg").is_err());
        assert!(UploadReceipt::from_path("/uploads/").is_err());
        assert!(UploadReceipt::from_path("/uploads/nested/bite.jpg").is_err());
    }

    #[test]
    fn receipt_json_round_trip() {
        let json = r#"{"storedId":"a.jpg","path":"/uploads/a.jpg"}"#;
        let receipt: UploadReceipt = serde_json::from_str(json).unwrap();
        assert_eq!(receipt.stored_id, "a.jpg");
    }

    #[test]
    fn backend_follows_configured_mode() {
        let mut config = FesatConfig::from_env();
        config.backend_mode = BackendMode::Mock;
        assert_eq!(select_backend(&config).name(), "mock");

        config.backend_mode = BackendMode::Live;
        assert_eq!(select_backend(&config).name(), "http");
    }

    #[test]
    fn image_payload_guesses_mime() {
        let payload = ImagePayload::new("bite.jpg", vec![1, 2, 3]);
        assert_eq!(payload.mime, "image/jpeg");

        let payload = ImagePayload::new("mystery", vec![]);
        assert_eq!(payload.mime, "application/octet-stream");
    }
}
