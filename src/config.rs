use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Model names and request parameters used for every provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub text_model: String,
    pub prose_model: String,
    pub image_model: String,
    pub image_size: String,
    pub image_quality: String,
    pub speech_model: String,
    pub fetch_timeout: Duration,
    pub pdf_font: Option<PathBuf>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            text_model: "gpt-4o-mini".into(),
            prose_model: "gpt-4o".into(),
            image_model: "dall-e-3".into(),
            image_size: "1024x1024".into(),
            image_quality: "standard".into(),
            speech_model: "tts-1".into(),
            fetch_timeout: Duration::from_secs(20),
            pdf_font: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_base: String,
    pub port: u16,
    pub settings: GenerationSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("OPENAI_API_KEY is not set (add it to the environment or a .env file)")?;
        let defaults = GenerationSettings::default();
        let fetch_timeout = match lookup("STORY_FETCH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.parse().with_context(|| format!("invalid STORY_FETCH_TIMEOUT_SECS: {raw}"))?),
            None => defaults.fetch_timeout,
        };
        let port = match lookup("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid PORT: {raw}"))?,
            None => 8080,
        };

        Ok(Self {
            api_key,
            api_base: lookup("OPENAI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            port,
            settings: GenerationSettings {
                text_model: lookup("STORY_TEXT_MODEL").unwrap_or(defaults.text_model),
                prose_model: lookup("STORY_PROSE_MODEL").unwrap_or(defaults.prose_model),
                image_model: lookup("STORY_IMAGE_MODEL").unwrap_or(defaults.image_model),
                image_size: lookup("STORY_IMAGE_SIZE").unwrap_or(defaults.image_size),
                image_quality: lookup("STORY_IMAGE_QUALITY").unwrap_or(defaults.image_quality),
                speech_model: lookup("STORY_SPEECH_MODEL").unwrap_or(defaults.speech_model),
                fetch_timeout,
                pdf_font: lookup("STORY_PDF_FONT").map(PathBuf::from),
            },
        })
    }
}
