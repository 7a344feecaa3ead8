use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    /// Single user turn carrying a prompt and one inline image.
    pub fn user_with_image(prompt: &str, image_data_url: &str) -> Self {
        Self {
            role: "user".into(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_url.to_string(),
                    },
                },
            ]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// An image split out of a `data:<mime>;base64,<data>` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Accepts a data URL or bare base64 (assumed PNG).
    pub fn from_data_url(url: &str) -> Self {
        match url.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
            Some((header, data)) => {
                let mime_type = header
                    .split(';')
                    .next()
                    .filter(|m| !m.is_empty())
                    .unwrap_or("image/png");
                Self {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                }
            }
            None => Self {
                mime_type: "image/png".into(),
                data: url.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub kind: StreamChunkKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamChunkKind {
    Reasoning,
    Content,
    Done,
    Error,
}

/// Per-call settings resolved by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct CallConfig {
    pub model: String,
    pub stream: bool,
    pub temperature: f64,
}

#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub reasoning: String,
}
