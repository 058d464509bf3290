use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;

use crate::{
    audio::{audio_file_name, export_audio},
    error::WorkflowError,
    models::{
        AudioRequest, CreateSessionRequest, IllustrationProgress, OptionsResponse, PersonaOption, RegenerateRequest, Session,
        SessionRecord, Voice, WriterPersona, ILLUSTRATION_MOODS, ILLUSTRATION_STYLES, NARRATIVE_STYLES,
    },
    pdf::{export_pdf as render_session_pdf, pdf_file_name},
    provider::Services,
    workflow::{self, FieldEdit},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HashMap<Uuid, SessionRecord>>>,
    pub progress: Arc<RwLock<HashMap<Uuid, IllustrationProgress>>>,
    /// Sessions with a provider call running; only one per session at a time.
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    pub services: Services,
}

/// Holds a session's in-flight slot until dropped.
struct Claim {
    id: Uuid,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.id);
    }
}

impl AppState {
    pub fn new(services: Services) -> Self {
        Self { store: Arc::default(), progress: Arc::default(), in_flight: Arc::default(), services }
    }

    fn session(&self, id: Uuid) -> Result<Session, ApiError> {
        self.store.read().get(&id).map(|r| r.session.clone()).ok_or_else(|| ApiError::not_found(id))
    }

    /// Reserves the session for a provider-backed operation and returns the
    /// copy to work on. Writes from other handlers are refused until the
    /// claim is dropped.
    fn claim(&self, id: Uuid) -> Result<(Claim, Session), ApiError> {
        let store = self.store.read();
        let record = store.get(&id).ok_or_else(|| ApiError::not_found(id))?;
        if !self.in_flight.lock().insert(id) {
            return Err(ApiError::busy(id));
        }
        Ok((Claim { id, in_flight: self.in_flight.clone() }, record.session.clone()))
    }

    /// Applies a synchronous change under the store lock.
    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Session) -> Result<(), WorkflowError>) -> Result<SessionRecord, ApiError> {
        let mut store = self.store.write();
        let record = store.get_mut(&id).ok_or_else(|| ApiError::not_found(id))?;
        if self.in_flight.lock().contains(&id) {
            return Err(ApiError::busy(id));
        }
        let mut session = record.session.clone();
        apply(&mut session)?;
        record.store(session);
        Ok(record.clone())
    }

    fn save(&self, id: Uuid, session: Session) -> Result<SessionRecord, ApiError> {
        let mut guard = self.store.write();
        let record = guard.get_mut(&id).ok_or_else(|| ApiError::not_found(id))?;
        record.store(session);
        Ok(record.clone())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/options", get(get_options))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/advance", post(advance_session))
        .route("/api/sessions/:id/edit", post(edit_session))
        .route("/api/sessions/:id/regenerate", post(regenerate_session))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/progress", get(get_progress))
        .route("/api/sessions/:id/pdf", get(export_pdf))
        .route("/api/sessions/:id/audio", post(create_audio).get(get_audio))
        .with_state(state)
}

pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    session: Option<SessionRecord>,
}

impl ApiError {
    fn not_found(id: Uuid) -> Self {
        Self { status: StatusCode::NOT_FOUND, kind: "not_found", message: format!("session {} not found", id), session: None }
    }

    fn busy(id: Uuid) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            kind: "session_busy",
            message: format!("session {} has a generation in progress", id),
            session: None,
        }
    }

    fn with_session(mut self, record: SessionRecord) -> Self {
        self.session = Some(record);
        self
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        let status = match &e {
            WorkflowError::Provider(_) | WorkflowError::Fetch(_) => StatusCode::BAD_GATEWAY,
            WorkflowError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WorkflowError::MissingPrerequisite { .. } | WorkflowError::InvalidTransition { .. } => StatusCode::CONFLICT,
            WorkflowError::FieldUnavailable(_) => StatusCode::BAD_REQUEST,
        };
        Self { status, kind: e.kind(), message: e.to_string(), session: None }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.kind, "message": self.message, "session": self.session });
        (self.status, Json(body)).into_response()
    }
}

pub async fn get_options() -> Json<OptionsResponse> {
    Json(OptionsResponse {
        narrative_styles: NARRATIVE_STYLES.to_vec(),
        writer_personas: WriterPersona::ALL.iter().map(|p| PersonaOption { id: *p, label: p.label() }).collect(),
        illustration_styles: ILLUSTRATION_STYLES.to_vec(),
        illustration_moods: ILLUSTRATION_MOODS.to_vec(),
        voices: Voice::ALL.to_vec(),
    })
}

pub async fn create_session(State(state): State<AppState>, body: Option<Json<CreateSessionRequest>>) -> Json<SessionRecord> {
    let config = body.and_then(|Json(b)| b.config).unwrap_or_default();
    tracing::info!("🚀 Creating session for topic: {}", config.topic);
    let record = SessionRecord::new(Session::new(config));
    state.store.write().insert(record.id, record.clone());
    Json(record)
}

pub async fn get_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionRecord>, ApiError> {
    state.store.read().get(&id).cloned().map(Json).ok_or_else(|| ApiError::not_found(id))
}

pub async fn advance_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionRecord>, ApiError> {
    let (_claim, mut session) = state.claim(id)?;
    let progress = state.progress.clone();

    // Generation runs outside the store lock under the claim; the result is written back either way.
    let result = workflow::advance_with_progress(&mut session, &state.services, |p| {
        tracing::info!("🖌️ Illustration progress {}/{} ({})", p.completed, p.total, p.scene_title);
        progress.write().insert(id, p.clone());
    })
    .await;

    let record = state.save(id, session)?;
    match result {
        Ok(stage) => {
            tracing::info!("✅ Session {} now at {}", id, stage);
            Ok(Json(record))
        }
        Err(e) => Err(ApiError::from(e).with_session(record)),
    }
}

pub async fn edit_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(edit): Json<FieldEdit>,
) -> Result<Json<SessionRecord>, ApiError> {
    Ok(Json(state.update(id, |session| workflow::edit_field(session, edit))?))
}

pub async fn regenerate_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(body): Json<RegenerateRequest>,
) -> Result<Json<SessionRecord>, ApiError> {
    let record = state.update(id, |session| workflow::regenerate_from(session, body.stage))?;
    state.progress.write().remove(&id);
    Ok(Json(record))
}

pub async fn reset_session(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<SessionRecord>, ApiError> {
    let record = state.update(id, |session| {
        workflow::reset(session);
        Ok(())
    })?;
    state.progress.write().remove(&id);
    Ok(Json(record))
}

pub async fn get_progress(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<IllustrationProgress>, ApiError> {
    let session = state.session(id)?;
    let progress = state.progress.read().get(&id).cloned().unwrap_or_else(|| IllustrationProgress {
        completed: 0,
        total: session.scenes.as_ref().map_or(0, Vec::len),
        scene_title: String::new(),
        failed: 0,
    });
    Ok(Json(progress))
}

pub async fn export_pdf(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = state.session(id)?;
    let title = session.outline.as_ref().map(|o| o.title.clone()).unwrap_or_default();
    let pdf_bytes = render_session_pdf(&session, &state.services).await?;
    Ok(attachment("application/pdf", &pdf_file_name(&title), pdf_bytes))
}

pub async fn create_audio(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    body: Option<Json<AudioRequest>>,
) -> Result<Response, ApiError> {
    let voice = body.and_then(|Json(b)| b.voice);
    let (_claim, mut session) = state.claim(id)?;
    let audio = export_audio(&mut session, voice, &state.services).await?;
    state.save(id, session)?;
    Ok(attachment("audio/mpeg", &audio_file_name(Utc::now()), audio))
}

pub async fn get_audio(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Response, ApiError> {
    let session = state.session(id)?;
    let clip = session.audio.ok_or_else(|| {
        ApiError::from(WorkflowError::FieldUnavailable("audio has not been generated".into()))
    })?;
    Ok(attachment("audio/mpeg", &audio_file_name(clip.created_at), clip.bytes))
}

fn attachment(content_type: &'static str, file_name: &str, body: impl Into<axum::body::Body>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (StatusCode::OK, headers, body.into()).into_response()
}
