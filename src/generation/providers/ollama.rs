//! Ollama chat provider, for racing a local model against the hosted ones.

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
pub struct OllamaProvider {
    id: String,
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TrackListProvider for OllamaProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<TrackSkeleton>, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                OllamaMessage {
                    role: "user".to_string(),
                    content: render_user_prompt(request),
                },
            ],
            stream: false,
            options: OllamaOptions { temperature: 0.8 },
        };

        debug!(provider = %self.id, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
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

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parse_track_list(&parsed.message.content)
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_response_shape() {
        let raw = r#"{
            "model": "llama3.1:8b",
            "message": {"role": "assistant", "content": "[{\"title\":\"T\",\"artist\":\"A\"}]"},
            "done": true
        }"#;
        let parsed: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        let tracks = parse_track_list(&parsed.message.content).unwrap();
        assert_eq!(tracks.len(), 1);
    }
}
