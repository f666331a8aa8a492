// src/explain/mod.rs
//! Chat-completion client behind the explanation proxy.

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::FesatConfig;
use crate::error::FesatError;

const SYSTEM_PROMPT: &str = "You are a helpful assistant specializing in disease vector identification and public health. Provide accurate, concise information about vectors like mosquitoes, ticks, fleas, and bed bugs.";

pub struct ExplainClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
    error: Option<ChatError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatError {
    message: String,
}

impl ExplainClient {
    pub fn from_config(config: &FesatConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            model: config.explain_model.clone(),
            temperature: config.explain_temperature,
            max_tokens: config.explain_max_tokens,
            timeout: config.explain_request_timeout(),
        })
    }

    /// Ask the model about a classification result. Returns the answer text
    /// or a typed error whose message is safe to show the user.
    pub async fn answer(
        &self,
        prediction: &str,
        question: &str,
        image_url: Option<&str>,
    ) -> Result<String, FesatError> {
        let mut content =
            format!("The classification result is: {prediction}. User question: {question}");
        if let Some(url) = image_url {
            content.push_str(&format!("\nImage: {url}"));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Failure statuses usually still carry a structured error message.
        let parsed: Result<ChatResponse, _> = serde_json::from_str(&body);
        if let Ok(ChatResponse {
            error: Some(error), ..
        }) = &parsed
        {
            return Err(FesatError::Upstream(error.message.clone()));
        }
        if !status.is_success() {
            return Err(FesatError::Transport(format!("{status}: {}", body.trim())));
        }

        let answer = parsed
            .map_err(|err| FesatError::UnexpectedResponse(err.to_string()))?
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message.content);

        match answer {
            Some(answer) if !answer.is_empty() => Ok(answer),
            _ => Err(FesatError::Upstream(
                "no response received from the language model".to_string(),
            )),
        }
    }
}
