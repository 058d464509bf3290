use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    error::WorkflowError,
    models::{AudioClip, Session, Stage, Voice},
    provider::Services,
};

/// Narrates the story with `voice` (the session's configured voice when
/// `None`) and keeps the clip on the session for replay.
///
/// On failure nothing on the session changes.
pub async fn export_audio(session: &mut Session, voice: Option<Voice>, services: &Services) -> Result<Bytes, WorkflowError> {
    let story = session
        .story_text
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or(WorkflowError::MissingPrerequisite { stage: Stage::StoryReady, missing: "story_text" })?;
    let voice = voice.unwrap_or(session.config.voice);

    info!("🔊 Narrating {} chars with voice {}", story.len(), voice.id());
    let bytes = services
        .speech
        .synthesize(story, voice.id(), &services.settings.speech_model)
        .await
        .map_err(|e| {
            error!("❌ Narration failed: {}", e);
            WorkflowError::from(e)
        })?;

    session.config.voice = voice;
    session.audio = Some(AudioClip { voice, bytes: bytes.clone(), created_at: Utc::now() });
    Ok(bytes)
}

pub fn audio_file_name(at: DateTime<Utc>) -> String {
    format!("story_tts_{}.mp3", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockFetcher, MockImages, MockSpeech, MockText};
    use chrono::TimeZone;

    fn session_with_story() -> Session {
        Session { stage: Stage::Complete, story_text: Some("The lamp went dark at dawn.".into()), ..Session::default() }
    }

    #[tokio::test]
    async fn narration_is_stored_and_returned() {
        let speech = MockSpeech::ok(b"ID3audio");
        let services = testing::services_with(MockText::default(), MockImages::always_ok(), speech.clone(), MockFetcher::default());
        let mut session = session_with_story();

        let bytes = export_audio(&mut session, Some(Voice::Nova), &services).await.unwrap();

        assert_eq!(&bytes[..], b"ID3audio");
        assert_eq!(speech.voices(), vec!["nova"]);
        let clip = session.audio.unwrap();
        assert_eq!(clip.voice, Voice::Nova);
        assert_eq!(session.config.voice, Voice::Nova);
    }

    #[tokio::test]
    async fn configured_voice_is_the_default() {
        let speech = MockSpeech::ok(b"ID3");
        let services = testing::services_with(MockText::default(), MockImages::always_ok(), speech.clone(), MockFetcher::default());
        let mut session = session_with_story();
        session.config.voice = Voice::Coral;

        export_audio(&mut session, None, &services).await.unwrap();
        assert_eq!(speech.voices(), vec!["coral"]);
    }

    #[tokio::test]
    async fn failure_leaves_session_untouched() {
        let services = testing::services_with(MockText::default(), MockImages::always_ok(), MockSpeech::failing("quota"), MockFetcher::default());
        let mut session = session_with_story();
        let before = session.clone();

        let err = export_audio(&mut session, Some(Voice::Echo), &services).await.unwrap_err();

        assert!(matches!(err, WorkflowError::Provider(_)));
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn missing_story_is_rejected() {
        let services = testing::services(MockText::default(), MockImages::always_ok());
        let mut session = Session::default();
        assert!(matches!(
            export_audio(&mut session, None, &services).await,
            Err(WorkflowError::MissingPrerequisite { missing: "story_text", .. })
        ));
    }

    #[test]
    fn file_name_carries_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 3).unwrap();
        assert_eq!(audio_file_name(at), "story_tts_20261019_080503.mp3");
    }
}
