//! Track-list providers: one implementation per AI backend, all answering
//! the same request behind a single trait.

mod anthropic;
mod ollama;
mod openai;

pub use anthropic::AnthropicProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatProvider;

use super::{GenerationRequest, TrackSkeleton};
use crate::config::ProviderSettings;
use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur when calling a provider backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

impl ProviderError {
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Connection(e.to_string())
        }
    }
}

/// An AI backend that turns a generation request into an ordered track list.
#[async_trait]
pub trait TrackListProvider: Send + Sync + std::fmt::Debug {
    /// Stable identifier used in stream events and the roster.
    fn id(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<TrackSkeleton>, ProviderError>;
}

/// Build a provider from its configuration entry.
pub fn from_settings(settings: &ProviderSettings) -> Result<Arc<dyn TrackListProvider>> {
    let provider: Arc<dyn TrackListProvider> = match settings.kind.as_str() {
        "openai" => Arc::new(OpenAiCompatProvider::new(
            settings.id.clone(),
            settings.base_url.clone(),
            settings.model.clone(),
            settings.api_key.clone().unwrap_or_default(),
            settings.timeout(),
        )),
        "anthropic" => Arc::new(AnthropicProvider::new(
            settings.id.clone(),
            settings.base_url.clone(),
            settings.model.clone(),
            settings.api_key.clone().unwrap_or_default(),
            settings.timeout(),
        )),
        "ollama" => Arc::new(OllamaProvider::new(
            settings.id.clone(),
            settings.base_url.clone(),
            settings.model.clone(),
            settings.timeout(),
        )),
        other => bail!("Unknown provider kind: {}", other),
    };
    Ok(provider)
}

/// The system prompt shared by every provider.
pub(crate) const SYSTEM_PROMPT: &str = "You are a DJ and music curator. \
Respond with a JSON array only, no prose: \
[{\"title\": \"...\", \"artist\": \"...\"}, ...]. \
Order tracks as they should be played.";

/// Render the user prompt for a request, folding in its constraints.
pub(crate) fn render_user_prompt(request: &GenerationRequest) -> String {
    let mut prompt = format!(
        "Build a set of exactly {} tracks for: {}",
        request.track_count, request.prompt
    );
    let c = &request.constraints;
    if let (Some(lo), Some(hi)) = (c.energy_min, c.energy_max) {
        prompt.push_str(&format!("\nEnergy between {} and {} on a 0-10 scale.", lo, hi));
    }
    if let Some(diversity) = c.diversity {
        prompt.push_str(&format!(
            "\nArtist diversity: {:.1} (0 = repeats fine, 1 = all distinct artists).",
            diversity
        ));
    }
    if let (Some(start), Some(end)) = (c.era_start, c.era_end) {
        prompt.push_str(&format!("\nOnly tracks released between {} and {}.", start, end));
    }
    if !c.denylist.is_empty() {
        prompt.push_str(&format!("\nNever include: {}.", c.denylist.join(", ")));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    title: String,
    artist: String,
}

/// Extract the track list from a model reply.
///
/// Models wrap the JSON in code fences or prose often enough that we locate
/// the outermost array instead of parsing the reply wholesale.
pub(crate) fn parse_track_list(reply: &str) -> Result<Vec<TrackSkeleton>, ProviderError> {
    let start = reply.find('[').ok_or_else(|| {
        ProviderError::InvalidResponse("No JSON array in provider reply".to_string())
    })?;
    let end = reply.rfind(']').ok_or_else(|| {
        ProviderError::InvalidResponse("Unterminated JSON array in provider reply".to_string())
    })?;
    if end < start {
        return Err(ProviderError::InvalidResponse(
            "Malformed JSON array in provider reply".to_string(),
        ));
    }
    let raw: Vec<RawTrack> = serde_json::from_str(&reply[start..=end])
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
    if raw.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "Provider returned an empty track list".to_string(),
        ));
    }
    Ok(raw
        .into_iter()
        .enumerate()
        .map(|(index, t)| TrackSkeleton {
            index,
            title: t.title,
            artist: t.artist,
        })
        .collect())
}
