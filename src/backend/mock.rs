// src/backend/mock.rs

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use super::{CorrectionLog, ExplainRequest, ImagePayload, PredictionBackend, UploadReceipt};
use crate::classify::{CONFIDENCE_FLOOR, RawPrediction, VECTOR_CATALOG};
use crate::error::FesatError;

/// Simulated collaborator set for demo deployments (`backend_mode = mock`).
/// Predictions are drawn from the vector catalog; nothing leaves the
/// process.
pub struct MockBackend {
    rng: Mutex<StdRng>,
    latency: Duration,
}

impl MockBackend {
    pub fn new(latency: Duration) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
            latency,
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(seed: u64, latency: Duration) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            latency,
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl PredictionBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn upload(&self, image: &ImagePayload) -> Result<UploadReceipt, FesatError> {
        self.simulate_latency().await;
        let stored_id = format!("{}_{}", Uuid::new_v4().simple(), image.file_name);
        Ok(UploadReceipt {
            path: format!("/uploads/{stored_id}"),
            stored_id,
        })
    }

    async fn predict(
        &self,
        _receipt: &UploadReceipt,
        _image: &ImagePayload,
    ) -> Result<RawPrediction, FesatError> {
        self.simulate_latency().await;

        let (winner, confidence) = {
            let mut rng = self.rng.lock().expect("mock rng poisoned");
            let winner = rng.random_range(0..VECTOR_CATALOG.len());
            // One in five runs lands under the floor so demos exercise the
            // not-identified path.
            let confidence = if rng.random_bool(0.2) {
                rng.random_range(0.30..CONFIDENCE_FLOOR)
            } else {
                rng.random_range(CONFIDENCE_FLOOR..0.99)
            };
            (winner, confidence)
        };

        let spread = (1.0 - confidence) / (VECTOR_CATALOG.len() - 1) as f32;
        let mut probabilities = serde_json::Map::new();
        for (index, profile) in VECTOR_CATALOG.iter().enumerate() {
            let probability = if index == winner { confidence } else { spread };
            probabilities.insert(
                profile.raw_label.to_string(),
                json!({
                    "probability": probability,
                    "description": profile.description,
                }),
            );
        }

        let profile = &VECTOR_CATALOG[winner];
        Ok(RawPrediction {
            success: true,
            error: None,
            predicted_class: Some(profile.raw_label.to_string()),
            confidence: Some(confidence),
            all_probabilities: Some(probabilities),
            warning: (confidence < CONFIDENCE_FLOOR)
                .then(|| "classifier certainty is below the identification threshold".to_string()),
            predicted_stage: None,
        })
    }

    async fn explain(&self, request: &ExplainRequest) -> Result<String, FesatError> {
        self.simulate_latency().await;

        let profile = VECTOR_CATALOG
            .iter()
            .find(|p| request.prediction.contains(p.common_name) || request.prediction.contains(p.raw_label));
        Ok(match profile {
            Some(profile) => format!(
                "{}: {} (Demo answer to: {})",
                profile.common_name, profile.description, request.question
            ),
            None => format!(
                "No catalog entry for {:?}. (Demo answer to: {})",
                request.prediction, request.question
            ),
        })
    }

    async fn relocate_reference(
        &self,
        receipt: &UploadReceipt,
        folder_name: &str,
    ) -> Result<(), FesatError> {
        self.simulate_latency().await;
        debug!("mock relocate: {} -> {}", receipt.stored_id, folder_name);
        Ok(())
    }

    async fn log_comment(&self, entry: &CorrectionLog) -> Result<(), FesatError> {
        self.simulate_latency().await;
        debug!(
            "mock comment: {} -> {}: {}",
            entry.classification, entry.changed_classification, entry.comment
        );
        Ok(())
    }
}
