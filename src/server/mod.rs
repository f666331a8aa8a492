// src/server/mod.rs

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::FesatConfig;
use crate::error::FesatError;
use crate::explain::ExplainClient;
use crate::workflow::EXPLAIN_FALLBACK;

pub struct AppState {
    pub config: Arc<FesatConfig>,
    pub explain: ExplainClient,
}

pub fn create_explain_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/api/explain", post(explain))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainBody {
    #[serde(default)]
    prediction: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnswerBody {
    answer: String,
}

async fn explain(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExplainBody>,
) -> Result<Json<AnswerBody>, ExplainFailure> {
    let prediction = body.prediction.trim();
    let question = body.question.trim();
    if prediction.is_empty() || question.is_empty() {
        return Err(ExplainFailure::MissingFields);
    }

    let answer = state
        .explain
        .answer(prediction, question, body.image_url.as_deref())
        .await
        .map_err(ExplainFailure::Upstream)?;

    Ok(Json(AnswerBody { answer }))
}

#[derive(Debug)]
enum ExplainFailure {
    MissingFields,
    Upstream(FesatError),
}

// Failure bodies keep the {answer} shape so clients render them verbatim.
impl IntoResponse for ExplainFailure {
    fn into_response(self) -> Response {
        let (status, answer) = match self {
            ExplainFailure::MissingFields => (
                StatusCode::BAD_REQUEST,
                "prediction and question are required".to_string(),
            ),
            ExplainFailure::Upstream(FesatError::Upstream(message)) => {
                error!("explanation upstream error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("AI service error: {message}"),
                )
            }
            ExplainFailure::Upstream(err) => {
                error!("explanation proxy error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, EXPLAIN_FALLBACK.to_string())
            }
        };

        (status, Json(AnswerBody { answer })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        // The key is never used: requests below fail validation before any
        // upstream call is made.
        unsafe { std::env::set_var("OPENAI_API_KEY", "test-key") };
        let config = Arc::new(FesatConfig::from_env());
        let explain = ExplainClient::from_config(&config).unwrap();
        Arc::new(AppState { config, explain })
    }

    #[tokio::test]
    async fn health_endpoint_is_up() {
        let app = create_explain_router().with_state(test_state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_fields_return_answer_shaped_400() {
        let app = create_explain_router().with_state(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/explain")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"prediction":"","question":"   "}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["answer"].is_string());
    }
}
