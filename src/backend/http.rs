// src/backend/http.rs

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::{CorrectionLog, ExplainRequest, ImagePayload, PredictionBackend, UploadReceipt};
use crate::classify::{PredictEnvelope, RawPrediction};
use crate::config::{FesatConfig, PredictShape};
use crate::error::FesatError;

/// Live implementation of [`PredictionBackend`] over HTTP collaborators.
///
/// No request timeouts and no retries here: a hung collaborator stalls its
/// branch of the workflow, and retrying is a manual user action.
pub struct HttpBackend {
    client: Client,
    upload_url: String,
    predict_url: String,
    predict_shape: PredictShape,
    explain_url: String,
    relocate_url: String,
    comment_url: String,
}

impl HttpBackend {
    pub fn from_config(config: &FesatConfig) -> Self {
        Self {
            client: Client::new(),
            upload_url: config.upload_url.clone(),
            predict_url: config.predict_url.clone(),
            predict_shape: config.predict_shape,
            explain_url: config.explain_url.clone(),
            relocate_url: config.relocate_url.clone(),
            comment_url: config.comment_url.clone(),
        }
    }

    fn image_part(image: &ImagePayload) -> Result<reqwest::multipart::Part, FesatError> {
        reqwest::multipart::Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime)
            .map_err(|err| FesatError::Validation(format!("invalid content type: {err}")))
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> FesatError {
    let body = response.text().await.unwrap_or_default();
    FesatError::Transport(format!("{status}: {}", body.trim()))
}

#[async_trait]
impl PredictionBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn upload(&self, image: &ImagePayload) -> Result<UploadReceipt, FesatError> {
        let form = reqwest::multipart::Form::new().part("file", Self::image_part(image)?);
        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        // Structured replies carry {storedId, path}; older storage
        // deployments answer with the bare path.
        let body = response.text().await?;
        if let Ok(receipt) = serde_json::from_str::<UploadReceipt>(&body) {
            return Ok(receipt);
        }
        UploadReceipt::from_path(&body)
    }

    async fn predict(
        &self,
        receipt: &UploadReceipt,
        image: &ImagePayload,
    ) -> Result<RawPrediction, FesatError> {
        let request = match self.predict_shape {
            PredictShape::StoredReference => self
                .client
                .post(&self.predict_url)
                .json(&json!({ "fileName": receipt.stored_id })),
            PredictShape::Multipart => {
                let form = reqwest::multipart::Form::new().part("file", Self::image_part(image)?);
                self.client.post(&self.predict_url).multipart(form)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }

        let envelope: PredictEnvelope = response
            .json()
            .await
            .map_err(|err| FesatError::UnexpectedResponse(err.to_string()))?;
        Ok(envelope.into_inner())
    }

    async fn explain(&self, request: &ExplainRequest) -> Result<String, FesatError> {
        #[derive(Deserialize)]
        struct AnswerBody {
            answer: String,
        }

        let response = self
            .client
            .post(&self.explain_url)
            .json(request)
            .send()
            .await?;

        // The proxy answers {answer} even on failure statuses, and one
        // deployment variant answers with a raw text body.
        let status = response.status();
        let body = response.text().await?;
        if let Ok(parsed) = serde_json::from_str::<AnswerBody>(&body) {
            return Ok(parsed.answer);
        }
        if !status.is_success() {
            return Err(FesatError::Transport(format!("{status}: {}", body.trim())));
        }
        Ok(body)
    }

    async fn relocate_reference(
        &self,
        receipt: &UploadReceipt,
        folder_name: &str,
    ) -> Result<(), FesatError> {
        let response = self
            .client
            .post(&self.relocate_url)
            .json(&json!({
                "fileName": receipt.stored_id,
                "folderName": folder_name,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        Ok(())
    }

    async fn log_comment(&self, entry: &CorrectionLog) -> Result<(), FesatError> {
        let response = self
            .client
            .post(&self.comment_url)
            .json(entry)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response).await);
        }
        // The acknowledgment body carries nothing the workflow consumes.
        Ok(())
    }
}
