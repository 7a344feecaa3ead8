use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capture::types::ScreenCapture;
use crate::errors::{PilotError, PilotResult};

/// Operating mode of a submission: selects the prompt template and the
/// response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Analyze,
    Plan,
    Execute,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Analyze, Mode::Plan, Mode::Execute];

    /// Name used in the `action` field of a gateway request.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Analyze => "analyze",
            Mode::Plan => "plan",
            Mode::Execute => "execute",
        }
    }

    /// `type` discriminator of the response this mode produces.
    pub fn response_type(&self) -> &'static str {
        match self {
            Mode::Analyze => "analysis",
            Mode::Plan => "plan",
            Mode::Execute => "execution",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = PilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "analyze" => Ok(Mode::Analyze),
            "plan" => Ok(Mode::Plan),
            "execute" => Ok(Mode::Execute),
            other => Err(PilotError::UnknownMode(other.to_string())),
        }
    }
}

/// One user-triggered request. Only constructable with a non-blank
/// instruction and a non-empty image.
#[derive(Debug, Clone)]
pub struct Submission {
    mode: Mode,
    instruction: String,
    image: Arc<ScreenCapture>,
}

pub const MISSING_INPUT_MESSAGE: &str = "Please capture a screenshot and enter a prompt first.";

impl Submission {
    pub fn new(
        mode: Mode,
        instruction: &str,
        image: Option<Arc<ScreenCapture>>,
    ) -> PilotResult<Self> {
        let instruction = instruction.trim();
        let image = image.filter(|img| !img.is_empty());
        match image {
            Some(image) if !instruction.is_empty() => Ok(Self {
                mode,
                instruction: instruction.to_string(),
                image,
            }),
            _ => Err(PilotError::Validation(MISSING_INPUT_MESSAGE.into())),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn image(&self) -> &ScreenCapture {
        &self.image
    }
}

/// Kind of an action step. Names the model invents are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    Click,
    Type,
    Scroll,
    Wait,
    /// Only produced by the plan parser fallback.
    Analysis,
    Other(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
            ActionKind::Analysis => "analysis",
            ActionKind::Other(name) => name,
        }
    }
}

impl From<String> for ActionKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "click" => ActionKind::Click,
            "type" => ActionKind::Type,
            "scroll" => ActionKind::Scroll,
            "wait" => ActionKind::Wait,
            "analysis" => ActionKind::Analysis,
            _ => ActionKind::Other(value),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// One atomic instruction derived from plan-mode output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Point>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_to_type: Option<String>,
    #[serde(default = "default_step_confidence")]
    pub confidence: f64,
}

fn default_step_confidence() -> f64 {
    crate::config::ConfidenceTable::default().plan_step_default
}

impl ActionStep {
    /// Timeline text for the step at `index` (zero based).
    pub fn timeline_line(&self, index: usize) -> String {
        format!("Step {}: {} - {}", index + 1, self.kind, self.description)
    }
}

/// Mode-shaped reply of the inference gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InferenceResponse {
    #[serde(rename = "analysis")]
    Analysis {
        content: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "plan")]
    Plan {
        actions: Vec<ActionStep>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "execution")]
    Execution {
        instructions: String,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },
}

impl InferenceResponse {
    pub fn mode(&self) -> Mode {
        match self {
            InferenceResponse::Analysis { .. } => Mode::Analyze,
            InferenceResponse::Plan { .. } => Mode::Plan,
            InferenceResponse::Execution { .. } => Mode::Execute,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            InferenceResponse::Analysis { confidence, .. }
            | InferenceResponse::Plan { confidence, .. }
            | InferenceResponse::Execution { confidence, .. } => *confidence,
        }
    }

    /// Text of the top-level success entry: the content, the instructions,
    /// or the pretty-printed action list.
    pub fn summary_text(&self) -> String {
        match self {
            InferenceResponse::Analysis { content, .. } => content.clone(),
            InferenceResponse::Execution { instructions, .. } => instructions.clone(),
            InferenceResponse::Plan { actions, .. } => {
                serde_json::to_string_pretty(actions).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }
}
