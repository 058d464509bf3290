use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    error::{FetchError, ProviderError},
    provider::{truncate, ImageFetcher, ImageGenerator, ImageRequest, SpeechSynthesizer, TextGenerator, TextRequest},
};

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: &str) -> Self {
        Self { client: Client::new(), api_key, base_url: base_url.trim_end_matches('/').to_string() }
    }

    async fn post_json(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        info!("🔗 Making request to: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API error response: {}", truncate(&error_body, 500));
            return Err(ProviderError::Api { status: status.as_u16(), body: error_body });
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user}
            ]
        });
        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {"name": schema.name, "strict": true, "schema": schema.schema}
            });
        }

        info!("📤 Text request ({}): {}", request.model, truncate(&request.user, 120));
        let response = self.post_json("/chat/completions", &body).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("parse error: {}", e)))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ProviderError::Malformed("no choices in response".into()))?;
        if let Some(refusal) = message.refusal {
            return Err(ProviderError::Malformed(format!("model refused: {}", refusal)));
        }
        let content = message.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::Malformed("empty message content".into()));
        }
        info!("✅ Text generated ({} chars)", content.len());
        Ok(content)
    }
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate(&self, request: ImageRequest) -> Result<String, ProviderError> {
        let body = json!({
            "model": request.model,
            "prompt": request.prompt,
            "n": 1,
            "size": request.size,
            "quality": request.quality
        });

        info!("🎨 Image request ({}): {}", request.model, truncate(&request.prompt, 100));
        let response = self.post_json("/images/generations", &body).await?;
        let parsed: ImagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("parse error: {}", e)))?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("no image data in response".into()))?;
        match (first.url, first.b64_json) {
            (Some(url), _) => {
                info!("🖼️ Image generated: {}", truncate(&url, 80));
                Ok(url)
            }
            (None, Some(data)) => {
                info!("🖼️ Inline image generated [{} chars]", data.len());
                Ok(format!("data:image/png;base64,{}", data))
            }
            (None, None) => Err(ProviderError::Malformed("image entry has neither url nor b64_json".into())),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(&self, text: &str, voice_id: &str, model_id: &str) -> Result<Bytes, ProviderError> {
        let body = json!({ "model": model_id, "voice": voice_id, "input": text });

        info!("🔊 Speech request ({}, voice={}) for {} chars", model_id, voice_id, text.len());
        let mut response = self.post_json("/audio/speech", &body).await?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| ProviderError::Http(e.to_string()))? {
            buf.extend_from_slice(&chunk);
        }
        if buf.is_empty() {
            return Err(ProviderError::Malformed("empty audio stream".into()));
        }
        info!("✅ Speech synthesized ({} bytes)", buf.len());
        Ok(buf.freeze())
    }
}

#[async_trait]
impl ImageFetcher for OpenAiClient {
    async fn fetch(&self, reference: &str, timeout: Duration) -> Result<Bytes, FetchError> {
        let bytes = match decode_data_url(reference) {
            Some(inline) => inline?,
            None => {
                let response = self.client.get(reference).timeout(timeout).send().await.map_err(|e| {
                    if e.is_timeout() { FetchError::Timeout(timeout.as_secs()) } else { FetchError::Http(e.to_string()) }
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                response.bytes().await.map_err(|e| {
                    if e.is_timeout() { FetchError::Timeout(timeout.as_secs()) } else { FetchError::Http(e.to_string()) }
                })?
            }
        };
        let format = sniff_format(&bytes)?;
        info!("📦 Fetched {:?} image ({} bytes)", format, bytes.len());
        Ok(bytes)
    }
}

/// `Some` when `reference` is a `data:` URL, carrying its decoded payload.
pub fn decode_data_url(reference: &str) -> Option<Result<Bytes, FetchError>> {
    let rest = reference.strip_prefix("data:")?;
    let decoded = match rest.split_once(";base64,") {
        Some((_mime, payload)) => base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map(Bytes::from)
            .map_err(|e| FetchError::InlineData(e.to_string())),
        None => Err(FetchError::InlineData("only base64 data URLs are supported".into())),
    };
    Some(decoded)
}

/// Rejects anything that is not a raster format the PDF can embed.
pub fn sniff_format(bytes: &[u8]) -> Result<image::ImageFormat, FetchError> {
    let format = image::guess_format(bytes).map_err(|e| FetchError::Format(e.to_string()))?;
    match format {
        image::ImageFormat::Png | image::ImageFormat::Jpeg | image::ImageFormat::Gif | image::ImageFormat::WebP => Ok(format),
        other => Err(FetchError::Format(format!("{:?}", other))),
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}
