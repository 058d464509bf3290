use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TOPIC: &str = "A lost artifact in a magical forest, guarded by ancient creatures.";

pub const NARRATIVE_STYLES: &[&str] = &["Shakespeare", "Fantasy", "Science fiction", "Norwid", "Zbigniew Herbert"];

pub const ILLUSTRATION_STYLES: &[&str] = &[
    "fantasy", "science fiction", "steampunk", "cyberpunk", "photorealism", "watercolor",
    "comic", "manga", "anime", "Van Gogh", "Salvador Dalí",
];

pub const ILLUSTRATION_MOODS: &[&str] = &["dark", "joyful", "mysterious", "epic", "calm", "dynamic", "dramatic", "nostalgic"];

/// Position of a session in the pipeline.
///
/// Generating markers are entry points: a session sitting on one of them
/// runs that step on the next `advance`. Ready markers wait for the user.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Config,
    OutlineGenerating,
    OutlineReady,
    ScenesGenerating,
    ScenesReady,
    StoryGenerating,
    StoryReady,
    IllustrationsGenerating,
    Complete,
}

impl Stage {
    pub fn marker(self) -> u8 {
        self as u8
    }

    pub fn is_generating(self) -> bool {
        matches!(
            self,
            Stage::OutlineGenerating | Stage::ScenesGenerating | Stage::StoryGenerating | Stage::IllustrationsGenerating
        )
    }

    /// The generating marker a ready (or initial) stage hands over to.
    pub fn next_generating(self) -> Option<Stage> {
        match self {
            Stage::Config => Some(Stage::OutlineGenerating),
            Stage::OutlineReady => Some(Stage::ScenesGenerating),
            Stage::ScenesReady => Some(Stage::StoryGenerating),
            Stage::StoryReady => Some(Stage::IllustrationsGenerating),
            _ => None,
        }
    }

    /// Where a generating stage lands after success.
    pub fn completed(self) -> Stage {
        match self {
            Stage::OutlineGenerating => Stage::OutlineReady,
            Stage::ScenesGenerating => Stage::ScenesReady,
            Stage::StoryGenerating => Stage::StoryReady,
            Stage::IllustrationsGenerating => Stage::Complete,
            other => other,
        }
    }

    /// Where a generating stage falls back to after a failed attempt.
    pub fn regressed(self) -> Stage {
        match self {
            Stage::OutlineGenerating => Stage::Config,
            Stage::ScenesGenerating => Stage::OutlineReady,
            Stage::StoryGenerating => Stage::ScenesReady,
            Stage::IllustrationsGenerating => Stage::StoryReady,
            other => other,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Config => "config",
            Stage::OutlineGenerating => "outline_generating",
            Stage::OutlineReady => "outline_ready",
            Stage::ScenesGenerating => "scenes_generating",
            Stage::ScenesReady => "scenes_ready",
            Stage::StoryGenerating => "story_generating",
            Stage::StoryReady => "story_ready",
            Stage::IllustrationsGenerating => "illustrations_generating",
            Stage::Complete => "complete",
        };
        write!(f, "{}({})", name, self.marker())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriterPersona {
    #[default]
    InnovationAndVersatility,
    DepthAndUniqueness,
    VisionAndDynamism,
    Universality,
}

impl WriterPersona {
    pub const ALL: [WriterPersona; 4] = [
        WriterPersona::InnovationAndVersatility,
        WriterPersona::DepthAndUniqueness,
        WriterPersona::VisionAndDynamism,
        WriterPersona::Universality,
    ];

    pub fn label(self) -> &'static str {
        match self {
            WriterPersona::InnovationAndVersatility => "Innovation and versatility",
            WriterPersona::DepthAndUniqueness => "Depth and uniqueness",
            WriterPersona::VisionAndDynamism => "Vision and dynamism",
            WriterPersona::Universality => "Universality",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
    Coral,
}

impl Voice {
    pub const ALL: [Voice; 7] = [Voice::Alloy, Voice::Echo, Voice::Fable, Voice::Onyx, Voice::Nova, Voice::Shimmer, Voice::Coral];

    pub fn id(self) -> &'static str {
        match self {
            Voice::Alloy => "alloy",
            Voice::Echo => "echo",
            Voice::Fable => "fable",
            Voice::Onyx => "onyx",
            Voice::Nova => "nova",
            Voice::Shimmer => "shimmer",
            Voice::Coral => "coral",
        }
    }
}

/// User selections gathered before the first generation step.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoryConfig {
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub writer_persona: WriterPersona,
    #[serde(default = "default_illustration_style")]
    pub illustration_style: String,
    #[serde(default = "default_mood")]
    pub illustration_mood: String,
    #[serde(default)]
    pub voice: Voice,
}

fn default_topic() -> String { DEFAULT_TOPIC.to_string() }
fn default_style() -> String { NARRATIVE_STYLES[0].to_string() }
fn default_illustration_style() -> String { ILLUSTRATION_STYLES[0].to_string() }
fn default_mood() -> String { ILLUSTRATION_MOODS[0].to_string() }

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            style: default_style(),
            writer_persona: WriterPersona::default(),
            illustration_style: default_illustration_style(),
            illustration_mood: default_mood(),
            voice: Voice::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Outline {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Scene {
    pub title: String,
    pub description: String,
}

/// One illustration slot; slot `i` always belongs to `scenes[i]`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "status", content = "url", rename_all = "snake_case")]
pub enum ImageRef {
    Resolved(String),
    Failed,
    #[default]
    Unset,
}

/// Narration produced by the audio export, kept so it can be replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub voice: Voice,
    pub bytes: Bytes,
    pub created_at: DateTime<Utc>,
}

/// The single mutable unit of work threaded through every controller call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Session {
    pub config: StoryConfig,
    pub stage: Stage,
    pub outline: Option<Outline>,
    pub scenes: Option<Vec<Scene>>,
    pub story_text: Option<String>,
    pub illustrations: Option<Vec<ImageRef>>,
    #[serde(skip)]
    pub audio: Option<AudioClip>,
}

impl Session {
    pub fn new(config: StoryConfig) -> Self {
        Self { config, ..Self::default() }
    }

    /// Clears every field produced at or after `stage`'s step.
    pub fn clear_from(&mut self, stage: Stage) {
        if stage <= Stage::OutlineGenerating {
            self.outline = None;
        }
        if stage <= Stage::ScenesGenerating {
            self.scenes = None;
        }
        if stage <= Stage::StoryGenerating {
            self.story_text = None;
            self.audio = None;
        }
        if stage <= Stage::IllustrationsGenerating {
            self.illustrations = None;
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub session: Session,
    pub has_audio: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session: Session) -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(), has_audio: false, session, created_at: now, updated_at: now }
    }

    pub fn store(&mut self, session: Session) {
        self.has_audio = session.audio.is_some();
        self.session = session;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct IllustrationProgress {
    pub completed: usize,
    pub total: usize,
    pub scene_title: String,
    pub failed: usize,
}

// --- API payloads ---

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub config: Option<StoryConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegenerateRequest {
    pub stage: Stage,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AudioRequest {
    #[serde(default)]
    pub voice: Option<Voice>,
}

#[derive(Debug, Serialize)]
pub struct OptionsResponse {
    pub narrative_styles: Vec<&'static str>,
    pub writer_personas: Vec<PersonaOption>,
    pub illustration_styles: Vec<&'static str>,
    pub illustration_moods: Vec<&'static str>,
    pub voices: Vec<Voice>,
}

#[derive(Debug, Serialize)]
pub struct PersonaOption {
    pub id: WriterPersona,
    pub label: &'static str,
}
