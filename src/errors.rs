use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Screen capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("No active display to capture")]
    NoActiveDisplay,

    #[error("A screen capture is already in progress")]
    CaptureBusy,

    #[error("A submission is already in flight")]
    Busy,

    #[error("Network error: {0}")]
    Network(String),

    /// The remote inference service rejected or failed the request.
    /// The message is passed through verbatim.
    #[error("{0}")]
    Upstream(String),

    /// The gateway answered with a non-success status.
    #[error("{message}")]
    Service { status: u16, message: String },

    #[error("Unknown mode: {0}")]
    UnknownMode(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl PilotError {
    /// Text recorded in the result timeline when this error ends a submission.
    pub fn user_message(&self) -> String {
        match self {
            PilotError::PermissionDenied(_) | PilotError::NoActiveDisplay => {
                "Screenshot failed. Please grant screen capture permissions.".to_string()
            }
            PilotError::Http(e) => format!("Network error: {e}"),
            other => other.to_string(),
        }
    }
}

impl serde::Serialize for PilotError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
