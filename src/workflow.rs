//! Workflow stage controller.
//!
//! Every operation takes the session explicitly and leaves it in a state the
//! user can continue from: a failed step regresses the stage by one and keeps
//! every upstream field intact.

use tracing::{error, info, warn};

use crate::{
    error::{ProviderError, WorkflowError},
    models::{IllustrationProgress, ImageRef, Scene, Session, Stage},
    prompts,
    provider::{self, ImageRequest, ResponseSchema, Services, TextRequest},
};

/// What entering a generation step should do with the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDecision {
    Run,
    Skip,
    Blocked(&'static str),
}

/// Decides whether the step entered at `step` (a generating marker) runs.
///
/// It runs when its output is absent or when the session was explicitly
/// parked on that marker; it is blocked while an upstream input is missing.
pub fn decide(session: &Session, step: Stage) -> StepDecision {
    if let Some(missing) = missing_input(session, step) {
        return StepDecision::Blocked(missing);
    }
    if session.stage == step || !has_output(session, step) {
        StepDecision::Run
    } else {
        StepDecision::Skip
    }
}

fn has_output(session: &Session, step: Stage) -> bool {
    match step {
        Stage::OutlineGenerating => session.outline.is_some(),
        Stage::ScenesGenerating => session.scenes.is_some(),
        Stage::StoryGenerating => session.story_text.is_some(),
        Stage::IllustrationsGenerating => session.illustrations.as_ref().is_some_and(|i| !i.is_empty()),
        _ => false,
    }
}

fn missing_input(session: &Session, step: Stage) -> Option<&'static str> {
    match step {
        Stage::ScenesGenerating if session.outline.is_none() => Some("outline"),
        Stage::StoryGenerating if session.outline.is_none() => Some("outline"),
        Stage::StoryGenerating | Stage::IllustrationsGenerating if session.scenes.is_none() => Some("scenes"),
        _ => None,
    }
}

/// Moves the session one step forward, running the step's generation call.
///
/// From `Config` this starts a fresh run: every derived field is dropped
/// before the outline is requested.
pub async fn advance(session: &mut Session, services: &Services) -> Result<Stage, WorkflowError> {
    advance_with_progress(session, services, |_| {}).await
}

pub async fn advance_with_progress(
    session: &mut Session,
    services: &Services,
    on_progress: impl FnMut(&IllustrationProgress),
) -> Result<Stage, WorkflowError> {
    let step = if session.stage.is_generating() {
        session.stage
    } else if let Some(next) = session.stage.next_generating() {
        next
    } else {
        info!("Session already complete; nothing to advance");
        return Ok(session.stage);
    };

    if session.stage == Stage::Config {
        session.clear_from(Stage::OutlineGenerating);
    }

    match decide(session, step) {
        StepDecision::Blocked(missing) => {
            session.stage = step.regressed();
            warn!("⛔ {} blocked: missing {}", step, missing);
            return Err(WorkflowError::MissingPrerequisite { stage: step, missing });
        }
        StepDecision::Skip => {
            session.stage = step.completed();
            info!("⏭️ {} skipped, output already present; now at {}", step, session.stage);
            return Ok(session.stage);
        }
        StepDecision::Run => {}
    }

    session.stage = step;
    info!("🎯 Entering {}", step);
    let result = run_step(session, services, step, on_progress).await;
    match result {
        Ok(()) => {
            session.stage = step.completed();
            info!("✅ {} finished; now at {}", step, session.stage);
            Ok(session.stage)
        }
        Err(e) => {
            session.stage = step.regressed();
            error!("❌ {} failed: {}; back at {}", step, e, session.stage);
            Err(e)
        }
    }
}

async fn run_step(
    session: &mut Session,
    services: &Services,
    step: Stage,
    on_progress: impl FnMut(&IllustrationProgress),
) -> Result<(), WorkflowError> {
    let settings = &services.settings;
    let config = &session.config;
    match step {
        Stage::OutlineGenerating => {
            let raw = services
                .text
                .generate(TextRequest {
                    model: settings.text_model.clone(),
                    system: prompts::persona_prompt(config.writer_persona, &config.style),
                    user: prompts::outline_prompt(&config.topic),
                    schema: Some(ResponseSchema::outline()),
                })
                .await?;
            session.outline = Some(provider::decode_outline(&raw)?);
        }
        Stage::ScenesGenerating => {
            let outline = session.outline.as_ref().ok_or(WorkflowError::MissingPrerequisite { stage: step, missing: "outline" })?;
            let raw = services
                .text
                .generate(TextRequest {
                    model: settings.text_model.clone(),
                    system: prompts::scenes_system_prompt(&config.style),
                    user: prompts::scenes_prompt(&outline.title, &outline.summary),
                    schema: Some(ResponseSchema::scenes()),
                })
                .await?;
            session.scenes = Some(provider::decode_scenes(&raw)?);
        }
        Stage::StoryGenerating => {
            let (Some(outline), Some(scenes)) = (&session.outline, &session.scenes) else {
                return Err(WorkflowError::MissingPrerequisite { stage: step, missing: "scenes" });
            };
            let raw = services
                .text
                .generate(TextRequest {
                    model: settings.prose_model.clone(),
                    system: prompts::persona_prompt(config.writer_persona, &config.style),
                    user: prompts::story_prompt(&outline.title, scenes),
                    schema: None,
                })
                .await?;
            let story = prompts::strip_scene_markup(&raw);
            if story.is_empty() {
                return Err(ProviderError::Malformed("story text is empty".into()).into());
            }
            session.story_text = Some(story);
        }
        Stage::IllustrationsGenerating => {
            let scenes = session.scenes.clone().unwrap_or_default();
            if scenes.is_empty() {
                return Err(WorkflowError::MissingPrerequisite { stage: step, missing: "scenes" });
            }
            let slots = generate_illustrations(session, &scenes, services, on_progress).await;
            session.illustrations = Some(slots);
        }
        other => return Err(WorkflowError::InvalidTransition { from: session.stage, to: other }),
    }
    Ok(())
}

/// Requests one image per scene, in scene order, one at a time.
///
/// A failed request fills its own slot with `Failed`; the batch always
/// returns exactly `scenes.len()` slots.
pub async fn generate_illustrations(
    session: &Session,
    scenes: &[Scene],
    services: &Services,
    mut on_progress: impl FnMut(&IllustrationProgress),
) -> Vec<ImageRef> {
    let total = scenes.len();
    let mut slots = vec![ImageRef::Unset; total];
    let mut failed = 0;

    for (i, scene) in scenes.iter().enumerate() {
        info!("🎨 Generating illustration {}/{}: {}", i + 1, total, scene.title);
        let request = ImageRequest {
            model: services.settings.image_model.clone(),
            prompt: prompts::illustration_prompt(&session.config, scene),
            size: services.settings.image_size.clone(),
            quality: services.settings.image_quality.clone(),
        };
        slots[i] = match services.image.generate(request).await {
            Ok(reference) => ImageRef::Resolved(reference),
            Err(e) => {
                failed += 1;
                warn!("⚠️ Illustration {} ('{}') failed: {}", i + 1, scene.title, e);
                ImageRef::Failed
            }
        };
        on_progress(&IllustrationProgress { completed: i + 1, total, scene_title: scene.title.clone(), failed });
    }

    info!("✅ Illustrations done: {} ok, {} failed", total - failed, failed);
    slots
}

/// A user edit to one session field. Edits never cascade downstream.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldEdit {
    Topic { value: String },
    Style { value: String },
    WriterPersona { value: crate::models::WriterPersona },
    IllustrationStyle { value: String },
    IllustrationMood { value: String },
    Voice { value: crate::models::Voice },
    Title { value: String },
    Summary { value: String },
    SceneTitle { index: usize, value: String },
    SceneDescription { index: usize, value: String },
    StoryText { value: String },
}

pub fn edit_field(session: &mut Session, edit: FieldEdit) -> Result<(), WorkflowError> {
    match edit {
        FieldEdit::Topic { value } => session.config.topic = value,
        FieldEdit::Style { value } => session.config.style = value,
        FieldEdit::WriterPersona { value } => session.config.writer_persona = value,
        FieldEdit::IllustrationStyle { value } => session.config.illustration_style = value,
        FieldEdit::IllustrationMood { value } => session.config.illustration_mood = value,
        FieldEdit::Voice { value } => session.config.voice = value,
        FieldEdit::Title { value } => outline_mut(session)?.title = value,
        FieldEdit::Summary { value } => outline_mut(session)?.summary = value,
        FieldEdit::SceneTitle { index, value } => scene_mut(session, index)?.title = value,
        FieldEdit::SceneDescription { index, value } => scene_mut(session, index)?.description = value,
        FieldEdit::StoryText { value } => {
            let story = session.story_text.as_mut().ok_or_else(|| WorkflowError::FieldUnavailable("story_text".into()))?;
            *story = value;
        }
    }
    Ok(())
}

fn outline_mut(session: &mut Session) -> Result<&mut crate::models::Outline, WorkflowError> {
    session.outline.as_mut().ok_or_else(|| WorkflowError::FieldUnavailable("outline".into()))
}

fn scene_mut(session: &mut Session, index: usize) -> Result<&mut Scene, WorkflowError> {
    let scenes = session.scenes.as_mut().ok_or_else(|| WorkflowError::FieldUnavailable("scenes".into()))?;
    let len = scenes.len();
    scenes
        .get_mut(index)
        .ok_or_else(|| WorkflowError::FieldUnavailable(format!("scene {} (session has {})", index, len)))
}

/// Parks the session on `stage` (a generating marker at or before the
/// current position) and clears that step's output and everything after it.
pub fn regenerate_from(session: &mut Session, stage: Stage) -> Result<(), WorkflowError> {
    let reachable = session.stage.is_generating() && stage <= session.stage
        || session.stage.next_generating().is_some_and(|next| stage <= next)
        || session.stage == Stage::Complete;
    if !stage.is_generating() || !reachable {
        return Err(WorkflowError::InvalidTransition { from: session.stage, to: stage });
    }
    if let Some(missing) = missing_input(session, stage) {
        return Err(WorkflowError::MissingPrerequisite { stage, missing });
    }
    session.clear_from(stage);
    info!("🔄 Regenerating from {} (was {})", stage, session.stage);
    session.stage = stage;
    Ok(())
}

/// Drops the whole session, configuration included.
pub fn reset(session: &mut Session) {
    info!("🧹 Resetting session from {}", session.stage);
    *session = Session::default();
}
