use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String) -> Self {
        Self {
            id,
            api_base,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> PilotResult<LlmResponse> {
        let body = serde_json::json!({
            "model": cfg.model,
            "messages": &messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::trace!(
            body = %sanitized_for_log(&body),
            "request body (sanitized, base64 omitted)"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(PilotError::Upstream(upstream_message(status, &err_body)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Folds an SSE body into one reply. Lines are split on raw bytes so a
    /// multi-byte character cut across chunks survives.
    async fn handle_stream(&self, response: reqwest::Response) -> PilotResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut resp = LlmResponse::default();

        'stream: while let Some(result) = byte_stream.next().await {
            pending.extend_from_slice(&result?);

            while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&raw);
                if fold_line(line.trim(), &mut resp)? {
                    break 'stream;
                }
            }
        }
        let tail = String::from_utf8_lossy(&pending);
        if !tail.trim().is_empty() {
            fold_line(tail.trim(), &mut resp)?;
        }

        tracing::info!(
            provider = %self.id,
            content_len = resp.content.len(),
            reasoning_len = resp.reasoning.len(),
            "vision stream finished"
        );
        Ok(resp)
    }

    /// Plain `choices[0].message` reply.
    async fn handle_json(&self, response: reqwest::Response) -> PilotResult<LlmResponse> {
        let json: serde_json::Value = response.json().await?;

        let message = &json["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        tracing::info!(
            provider = %self.id,
            content_len = content.len(),
            "vision reply received"
        );
        Ok(LlmResponse { content, reasoning })
    }
}

/// Returns true once the stream signals completion.
fn fold_line(line: &str, resp: &mut LlmResponse) -> PilotResult<bool> {
    if line.is_empty() {
        return Ok(false);
    }
    match sse_parser::parse_sse_line(line) {
        Ok(Some(chunk)) => match chunk.kind {
            StreamChunkKind::Reasoning => resp.reasoning.push_str(&chunk.content),
            StreamChunkKind::Content => resp.content.push_str(&chunk.content),
            StreamChunkKind::Error => return Err(PilotError::Upstream(chunk.content)),
            StreamChunkKind::Done => return Ok(true),
        },
        Ok(None) => {}
        Err(e) => tracing::debug!(error = %e, "unparseable SSE line skipped"),
    }
    Ok(false)
}

/// Prefer the service's own `error.message`; otherwise status plus raw body.
pub(crate) fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{status}: {body}"))
}

/// Serialized copy of `body` with every inline image swapped for a marker.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    fn scrub(value: &mut serde_json::Value) {
        match value {
            serde_json::Value::String(s) if s.starts_with("data:image/") => {
                *s = "<omitted_base64_image>".to_string();
            }
            serde_json::Value::Array(items) => items.iter_mut().for_each(scrub),
            serde_json::Value::Object(map) => map.values_mut().for_each(scrub),
            _ => {}
        }
    }
    let mut copy = body.clone();
    scrub(&mut copy);
    copy.to_string()
}
