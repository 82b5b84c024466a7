//! OpenAI-compatible chat-completions provider.
//!
//! Covers OpenAI itself plus the many services exposing the same wire shape
//! (Groq, Mistral, OpenRouter, local gateways) via `base_url`.

use super::{
    parse_track_list, render_user_prompt, ProviderError, TrackListProvider, SYSTEM_PROMPT,
};
use crate::generation::{GenerationRequest, TrackSkeleton};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct OpenAiCompatProvider {
    id: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiCompatProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TrackListProvider for OpenAiCompatProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<TrackSkeleton>, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: render_user_prompt(request),
                },
            ],
            temperature: 0.8,
        };

        debug!(provider = %self.id, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let reply = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in reply".to_string()))?;

        parse_track_list(&reply)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}
