//! Anthropic messages-API provider.

use super::{
    parse_track_list, render_user_prompt, ProviderError, TrackListProvider, SYSTEM_PROMPT,
};
use crate::generation::{GenerationRequest, TrackSkeleton};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug)]
pub struct AnthropicProvider {
    id: String,
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl AnthropicProvider {
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
impl TrackListProvider for AnthropicProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<TrackSkeleton>, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: 4096,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![MessageParam {
                role: "user".to_string(),
                content: render_user_prompt(request),
            }],
        };

        debug!(provider = %self.id, model = %self.model, "Sending generation request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
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

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let reply: String = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect();
        if reply.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No text content in reply".to_string(),
            ));
        }

        parse_track_list(&reply)
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<MessageParam>,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_response_joins_text_blocks() {
        let raw = r#"{
            "content": [
                {"type": "text", "text": "[{\"title\":\"T\","},
                {"type": "text", "text": "\"artist\":\"A\"}]"}
            ]
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let reply: String = parsed.content.into_iter().map(|b| b.text).collect();
        let tracks = parse_track_list(&reply).unwrap();
        assert_eq!(tracks[0].artist, "A");
    }
}
