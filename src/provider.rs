//! Narrow interfaces to the generation provider and typed decoding of its
//! structured results.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};

use crate::{
    config::GenerationSettings,
    error::{FetchError, ProviderError},
    models::{Outline, Scene},
};

pub const MIN_SCENES: usize = 5;
pub const MAX_SCENES: usize = 7;

/// JSON schema the text provider must follow for a structured request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: Value,
}

impl ResponseSchema {
    pub fn outline() -> Self {
        Self {
            name: "title_and_summary",
            schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "A creative, catchy title for the story."},
                    "summary": {"type": "string", "description": "A concise, one-paragraph plot outline."}
                },
                "required": ["title", "summary"],
                "additionalProperties": false
            }),
        }
    }

    pub fn scenes() -> Self {
        Self {
            name: "story_scenes",
            schema: json!({
                "type": "object",
                "properties": {
                    "scenes": {
                        "type": "array",
                        "description": "5 to 7 key scenes that form a coherent story.",
                        "items": {
                            "type": "object",
                            "properties": {
                                "title": {"type": "string"},
                                "description": {"type": "string", "description": "What happens, who takes part and where it takes place."}
                            },
                            "required": ["title", "description"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["scenes"],
                "additionalProperties": false
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// `None` requests free text.
    pub schema: Option<ResponseSchema>,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw message content (JSON text when a schema was given).
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns a reference (URL or data URL) to the generated image.
    async fn generate(&self, request: ImageRequest) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str, model_id: &str) -> Result<Bytes, ProviderError>;
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &str, timeout: Duration) -> Result<Bytes, FetchError>;
}

/// Everything the controller and the exporters need from the outside.
#[derive(Clone)]
pub struct Services {
    pub text: Arc<dyn TextGenerator>,
    pub image: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub fetcher: Arc<dyn ImageFetcher>,
    pub settings: GenerationSettings,
}

impl Services {
    /// Wires one client that implements every interface.
    pub fn from_client<C>(client: Arc<C>, settings: GenerationSettings) -> Self
    where
        C: TextGenerator + ImageGenerator + SpeechSynthesizer + ImageFetcher + 'static,
    {
        Self { text: client.clone(), image: client.clone(), speech: client.clone(), fetcher: client, settings }
    }
}

#[derive(Debug, Deserialize)]
struct ScenesEnvelope {
    scenes: Vec<Scene>,
}

/// Deserialises a structured reply, tolerating a surrounding markdown fence.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, ProviderError> {
    let body = strip_code_fence(raw);
    serde_json::from_str(body).map_err(|e| ProviderError::Malformed(format!("{}: {}", e, truncate(raw, 200))))
}

pub fn decode_outline(raw: &str) -> Result<Outline, ProviderError> {
    let outline: Outline = decode(raw)?;
    let outline = Outline { title: outline.title.trim().to_string(), summary: outline.summary.trim().to_string() };
    if outline.title.is_empty() || outline.summary.is_empty() {
        return Err(ProviderError::Malformed("outline title and summary must not be empty".into()));
    }
    Ok(outline)
}

pub fn decode_scenes(raw: &str) -> Result<Vec<Scene>, ProviderError> {
    let envelope: ScenesEnvelope = decode(raw)?;
    let scenes: Vec<Scene> = envelope
        .scenes
        .into_iter()
        .map(|s| Scene { title: s.title.trim().to_string(), description: s.description.trim().to_string() })
        .collect();
    if !(MIN_SCENES..=MAX_SCENES).contains(&scenes.len()) {
        return Err(ProviderError::Malformed(format!(
            "expected {MIN_SCENES}-{MAX_SCENES} scenes, got {}",
            scenes.len()
        )));
    }
    if let Some(i) = scenes.iter().position(|s| s.title.is_empty() || s.description.is_empty()) {
        return Err(ProviderError::Malformed(format!("scene {} has an empty title or description", i + 1)));
    }
    Ok(scenes)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…[{} chars]", &s[..end], s.len())
}
