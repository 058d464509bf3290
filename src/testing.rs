//! Mock providers for controller, export and route tests.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use crate::{
    config::GenerationSettings,
    error::{FetchError, ProviderError},
    models::Scene,
    provider::{ImageFetcher, ImageGenerator, ImageRequest, Services, SpeechSynthesizer, TextGenerator, TextRequest},
};

/// Text provider replaying a queue of canned replies.
#[derive(Clone, Default)]
pub struct MockText {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    requests: Arc<Mutex<Vec<TextRequest>>>,
}

impl MockText {
    pub fn new(replies: Vec<Result<String, &str>>) -> Self {
        let replies = replies.into_iter().map(|r| r.map_err(str::to_string)).collect();
        Self { replies: Arc::new(Mutex::new(replies)), requests: Arc::default() }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<TextRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for MockText {
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError> {
        self.requests.lock().push(request);
        match self.replies.lock().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ProviderError::Http(message)),
            None => Err(ProviderError::Http("mock text queue exhausted".into())),
        }
    }
}

/// Text provider that holds every call until `release` is called.
#[derive(Clone, Default)]
pub struct GatedText {
    inner: MockText,
    entered: Arc<Notify>,
    gate: Arc<Notify>,
}

impl GatedText {
    pub fn new(inner: MockText) -> Self {
        Self { inner, ..Self::default() }
    }

    /// Resolves once a call is waiting on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl TextGenerator for GatedText {
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.inner.generate(request).await
    }
}

/// Image provider answering `https://images.test/<call>.png`, failing on chosen calls.
#[derive(Clone, Default)]
pub struct MockImages {
    fail_at: Arc<Vec<usize>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockImages {
    pub fn always_ok() -> Self {
        Self::default()
    }

    pub fn failing_at(calls: &[usize]) -> Self {
        Self { fail_at: Arc::new(calls.to_vec()), prompts: Arc::default() }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl ImageGenerator for MockImages {
    async fn generate(&self, request: ImageRequest) -> Result<String, ProviderError> {
        let call = {
            let mut prompts = self.prompts.lock();
            prompts.push(request.prompt);
            prompts.len() - 1
        };
        if self.fail_at.contains(&call) {
            return Err(ProviderError::Api { status: 400, body: "content policy".into() });
        }
        Ok(format!("https://images.test/{call}.png"))
    }
}

#[derive(Clone)]
pub struct MockSpeech {
    reply: Result<Bytes, String>,
    voices: Arc<Mutex<Vec<String>>>,
}

impl MockSpeech {
    pub fn ok(audio: &'static [u8]) -> Self {
        Self { reply: Ok(Bytes::from_static(audio)), voices: Arc::default() }
    }

    pub fn failing(message: &str) -> Self {
        Self { reply: Err(message.to_string()), voices: Arc::default() }
    }

    pub fn voices(&self) -> Vec<String> {
        self.voices.lock().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(&self, _text: &str, voice_id: &str, _model_id: &str) -> Result<Bytes, ProviderError> {
        self.voices.lock().push(voice_id.to_string());
        self.reply.clone().map_err(ProviderError::Http)
    }
}

/// Fetcher that always fails; keeps PDF tests off the network.
#[derive(Clone, Default)]
pub struct MockFetcher {
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl ImageFetcher for MockFetcher {
    async fn fetch(&self, reference: &str, timeout: Duration) -> Result<Bytes, FetchError> {
        self.fetched.lock().push(reference.to_string());
        Err(FetchError::Timeout(timeout.as_secs()))
    }
}

pub fn services(text: MockText, images: MockImages) -> Services {
    services_with(text, images, MockSpeech::ok(b"ID3mock"), MockFetcher::default())
}

pub fn services_with(text: MockText, images: MockImages, speech: MockSpeech, fetcher: MockFetcher) -> Services {
    Services {
        text: Arc::new(text),
        image: Arc::new(images),
        speech: Arc::new(speech),
        fetcher: Arc::new(fetcher),
        settings: GenerationSettings::default(),
    }
}

pub fn outline_json() -> String {
    json!({"title": "Last Light", "summary": "On his final night the keeper tends the lamp."}).to_string()
}

pub fn scenes(n: usize) -> Vec<Scene> {
    (1..=n)
        .map(|i| Scene { title: format!("Scene {i}"), description: format!("What happens in scene {i}.") })
        .collect()
}

pub fn scenes_json(n: usize) -> String {
    json!({ "scenes": scenes(n) }).to_string()
}
