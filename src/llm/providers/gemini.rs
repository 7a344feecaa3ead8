use async_trait::async_trait;

use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::upstream_message;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart, InlineImage, LlmResponse, MessageContent};

/// Google `generateContent` adapter. Images travel as `inline_data` parts with
/// the data-URL prefix removed.
pub struct GeminiProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model
        )
    }
}

/// Converts chat turns into Gemini `contents`.
fn to_contents(messages: &[ChatMessage]) -> serde_json::Value {
    let contents: Vec<serde_json::Value> = messages
        .iter()
        .map(|msg| {
            let parts: Vec<serde_json::Value> = match &msg.content {
                MessageContent::Text(text) => vec![serde_json::json!({ "text": text })],
                MessageContent::Parts(parts) => parts
                    .iter()
                    .map(|part| match part {
                        ContentPart::Text { text } => serde_json::json!({ "text": text }),
                        ContentPart::ImageUrl { image_url } => {
                            let img = InlineImage::from_data_url(&image_url.url);
                            serde_json::json!({
                                "inline_data": { "mime_type": img.mime_type, "data": img.data }
                            })
                        }
                    })
                    .collect(),
            };
            let role = if msg.role == "assistant" { "model" } else { "user" };
            serde_json::json!({ "role": role, "parts": parts })
        })
        .collect();
    serde_json::Value::Array(contents)
}

/// Concatenates the text parts of the first candidate.
fn extract_text(json: &serde_json::Value) -> PilotResult<String> {
    if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
        return Err(PilotError::Upstream(format!("prompt blocked: {reason}")));
    }
    let parts = json["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| PilotError::Upstream("response contained no candidates".into()))?;
    Ok(parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join(""))
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PilotResult<LlmResponse> {
        let body = serde_json::json!({
            "contents": to_contents(&messages),
            "generationConfig": { "temperature": cfg.temperature },
        });

        tracing::debug!(provider = %self.id, model = %cfg.model, "sending Gemini request");

        let response = self
            .client
            .post(self.endpoint(&cfg.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::Upstream(upstream_message(status, &err_body)));
        }

        let json: serde_json::Value = response.json().await?;
        let content = extract_text(&json)?;
        tracing::info!(provider = %self.id, content_len = content.len(), "Gemini response received");
        Ok(LlmResponse {
            content,
            reasoning: String::new(),
        })
    }
}
