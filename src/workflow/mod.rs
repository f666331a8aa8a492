// src/workflow/mod.rs
//! The classification workflow: one upload → predict → review → correct
//! cycle per interaction, over an injected [`PredictionBackend`].

mod preview;

pub use preview::{PreviewHandle, PreviewRegistry};

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::{CorrectionLog, ExplainRequest, ImagePayload, PredictionBackend, UploadReceipt};
use crate::classify::{self, Prediction, SyncState};
use crate::error::FesatError;

/// Shown whenever an explanation request fails; the workflow never
/// propagates explanation failures.
pub const EXPLAIN_FALLBACK: &str = "Sorry, I could not process your question at this time.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Idle,
    Uploading,
    Predicting,
    Reviewing,
    Correcting,
}

/// A question issued against the current prediction. The outcome is fed
/// back through [`Workflow::apply_explanation`] under the sequence guard,
/// so a slow early answer can never overwrite a later one.
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub seq: u64,
    pub request: ExplainRequest,
}

pub struct Workflow {
    backend: Arc<dyn PredictionBackend>,
    previews: PreviewRegistry,
    public_base: Option<Url>,

    stage: WorkflowStage,
    selected: Option<ImagePayload>,
    preview: Option<PreviewHandle>,
    receipt: Option<UploadReceipt>,
    prediction: Option<Prediction>,
    notice: Option<String>,
    explanation: Option<String>,
    explain_issued: u64,
    explain_applied: u64,
}

impl Workflow {
    pub fn new(
        backend: Arc<dyn PredictionBackend>,
        previews: PreviewRegistry,
        public_base: Option<Url>,
    ) -> Self {
        Self {
            backend,
            previews,
            public_base,
            stage: WorkflowStage::Idle,
            selected: None,
            preview: None,
            receipt: None,
            prediction: None,
            notice: None,
            explanation: None,
            explain_issued: 0,
            explain_applied: 0,
        }
    }

    // ── Read accessors ──

    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.as_deref()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(|p| p.url())
    }

    pub fn receipt(&self) -> Option<&UploadReceipt> {
        self.receipt.as_ref()
    }

    pub fn has_selection(&self) -> bool {
        self.selected.is_some()
    }

    // ── Operations ──

    /// Replace the selection. Releases the previous preview, clears any
    /// prior result and error state, and returns the workflow to `Idle`.
    /// No network call.
    pub fn select_image(&mut self, file_name: &str, bytes: Vec<u8>) {
        if let Some(mut old) = self.preview.take() {
            old.revoke();
        }
        self.preview = Some(self.previews.create(file_name));
        self.selected = Some(ImagePayload::new(file_name, bytes));
        self.receipt = None;
        self.prediction = None;
        self.explanation = None;
        self.notice = None;
        self.stage = WorkflowStage::Idle;
    }

    /// Run one upload-then-predict cycle. Upload strictly precedes predict,
    /// so predict never runs against an unset file reference. Any failure
    /// surfaces a message and returns the stage to `Idle`; retrying is a
    /// manual user action.
    pub async fn start_classification(&mut self) -> Result<(), FesatError> {
        if self.stage != WorkflowStage::Idle {
            return Err(FesatError::Validation(
                "a classification cycle is already in progress".to_string(),
            ));
        }
        let Some(image) = self.selected.take() else {
            return Err(FesatError::Validation(
                "select an image first".to_string(),
            ));
        };

        self.notice = None;
        self.stage = WorkflowStage::Uploading;
        let backend = Arc::clone(&self.backend);

        // Leaving `Uploading` always drops the raw selection; on success
        // the stored reference supersedes it.
        let receipt = match backend.upload(&image).await {
            Ok(receipt) => receipt,
            Err(err) => {
                self.fail_cycle(&err);
                return Err(err);
            }
        };

        self.stage = WorkflowStage::Predicting;
        let raw = match backend.predict(&receipt, &image).await {
            Ok(raw) => raw,
            Err(err) => {
                self.fail_cycle(&err);
                return Err(err);
            }
        };

        let prediction = match classify::normalize(raw, Utc::now()) {
            Ok(prediction) => prediction,
            Err(err) => {
                self.fail_cycle(&err);
                return Err(err);
            }
        };

        info!(
            "classification complete: {} ({})",
            prediction.display_label,
            prediction.confidence_display()
        );
        self.receipt = Some(receipt);
        self.prediction = Some(prediction);
        self.stage = WorkflowStage::Reviewing;
        Ok(())
    }

    fn fail_cycle(&mut self, err: &FesatError) {
        warn!("classification cycle failed: {err}");
        self.notice = Some(err.to_string());
        self.receipt = None;
        self.prediction = None;
        self.stage = WorkflowStage::Idle;
    }

    /// Validate and register a question against the current prediction.
    /// Does not change the stage and issues no network call itself; feed
    /// the backend's answer to [`Workflow::apply_explanation`].
    pub fn prepare_question(&mut self, question: &str) -> Result<PendingQuestion, FesatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(FesatError::Validation(
                "question must not be empty".to_string(),
            ));
        }
        let Some(prediction) = self.prediction.as_ref() else {
            return Err(FesatError::Validation(
                "no prediction to ask about".to_string(),
            ));
        };

        let image_url = match (&self.public_base, &self.receipt) {
            (Some(base), Some(receipt)) => base
                .join(receipt.path.trim_start_matches('/'))
                .ok()
                .map(|url| url.to_string()),
            _ => None,
        };

        self.explain_issued += 1;
        Ok(PendingQuestion {
            seq: self.explain_issued,
            request: ExplainRequest {
                prediction: prediction.display_label.clone(),
                question: question.to_string(),
                image_url,
            },
        })
    }

    /// Apply an explanation outcome. Outcomes older than the last applied
    /// one are discarded; failures become the visible fallback text.
    pub fn apply_explanation(&mut self, seq: u64, outcome: Result<String, FesatError>) {
        if seq <= self.explain_applied {
            debug!(
                "discarding stale explanation (seq {seq}, applied {})",
                self.explain_applied
            );
            return;
        }
        self.explain_applied = seq;
        self.explanation = Some(match outcome {
            Ok(answer) => answer,
            Err(err) => {
                warn!("explanation request failed: {err}");
                EXPLAIN_FALLBACK.to_string()
            }
        });
    }

    /// Convenience wrapper: prepare, call the backend, apply. Only
    /// validation failures are returned; network failures surface through
    /// the fallback explanation text.
    pub async fn ask_question(&mut self, question: &str) -> Result<(), FesatError> {
        let pending = self.prepare_question(question)?;
        let backend = Arc::clone(&self.backend);
        let outcome = backend.explain(&pending.request).await;
        self.apply_explanation(pending.seq, outcome);
        Ok(())
    }

    /// Enter correction mode for the prediction under review.
    pub fn begin_correction(&mut self) -> Result<(), FesatError> {
        if self.stage != WorkflowStage::Reviewing {
            return Err(FesatError::Validation(
                "no prediction under review".to_string(),
            ));
        }
        self.stage = WorkflowStage::Correcting;
        Ok(())
    }

    /// Leave correction mode without changing anything.
    pub fn cancel_correction(&mut self) {
        if self.stage == WorkflowStage::Correcting {
            self.stage = WorkflowStage::Reviewing;
        }
    }

    /// Commit a corrected label. The label change is optimistic: the two
    /// side-calls (reference relocation, comment logging) run concurrently,
    /// and their failure is recorded as sync status, never rolled back.
    pub async fn propose_correction(
        &mut self,
        choice: &str,
        comment: &str,
    ) -> Result<(), FesatError> {
        if self.stage != WorkflowStage::Correcting {
            return Err(FesatError::Validation(
                "not in correction mode".to_string(),
            ));
        }
        let (original_label, receipt) = match (self.prediction.as_mut(), self.receipt.as_ref()) {
            (Some(prediction), Some(receipt)) => {
                if choice == prediction.label || choice == prediction.raw_label {
                    return Err(FesatError::Validation(
                        "choose a label different from the current prediction".to_string(),
                    ));
                }
                let original = prediction.raw_label.clone();
                prediction.raw_label = choice.to_string();
                prediction.label = choice.to_string();
                prediction.display_label = classify::display_label(choice);
                (original, receipt.clone())
            }
            _ => {
                return Err(FesatError::Validation(
                    "no prediction to correct".to_string(),
                ));
            }
        };

        let entry = CorrectionLog {
            comment: comment.to_string(),
            image_path: receipt.path.clone(),
            classification: original_label,
            changed_classification: choice.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        let (relocated, logged) = tokio::join!(
            backend.relocate_reference(&receipt, choice),
            backend.log_comment(&entry),
        );

        let sync = match (&relocated, &logged) {
            (Ok(()), Ok(())) => SyncState::Synced,
            _ => SyncState::SyncFailed,
        };
        if let Err(err) = relocated {
            warn!("reference relocation failed: {err}");
        }
        if let Err(err) = logged {
            warn!("comment logging failed: {err}");
        }
        if let Some(prediction) = self.prediction.as_mut() {
            prediction.correction_sync = Some(sync);
        }
        self.stage = WorkflowStage::Reviewing;
        Ok(())
    }

    /// Return to `Idle`, releasing the preview and discarding all cycle
    /// state. Callable from any stage, idempotent, and it invalidates
    /// in-flight explanation requests so a late answer cannot resurrect
    /// discarded state.
    pub fn reset(&mut self) {
        if let Some(mut preview) = self.preview.take() {
            preview.revoke();
        }
        self.selected = None;
        self.receipt = None;
        self.prediction = None;
        self.explanation = None;
        self.notice = None;
        self.explain_applied = self.explain_issued;
        self.stage = WorkflowStage::Idle;
    }
}
