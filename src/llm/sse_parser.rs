use crate::errors::{PilotError, PilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> PilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let data = if let Some(d) = line.strip_prefix("data:") {
        d.trim()
    } else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| PilotError::SseParsing(e.to_string()))?;

    if let Some(message) = json["error"]["message"].as_str() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Error,
            content: message.to_string(),
        }));
    }

    if let Some(first) = json["choices"].as_array().and_then(|c| c.first()) {
        let delta = &first["delta"];

        // Reasoning content (some models expose this)
        if let Some(reasoning) = delta["reasoning_content"].as_str() {
            if !reasoning.is_empty() {
                return Ok(Some(StreamChunk {
                    kind: StreamChunkKind::Reasoning,
                    content: reasoning.to_string(),
                }));
            }
        }

        if let Some(content) = delta["content"].as_str() {
            if !content.is_empty() {
                return Ok(Some(StreamChunk {
                    kind: StreamChunkKind::Content,
                    content: content.to_string(),
                }));
            }
        }

        if first["finish_reason"].as_str().is_some() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Done,
                content: String::new(),
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alive_and_comments_are_skipped() {
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line(": ping").unwrap().is_none());
        assert!(parse_sse_line("event: message").unwrap().is_none());
    }

    #[test]
    fn content_delta_is_extracted() {
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"[{"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "[{");
    }

    #[test]
    fn done_marker_and_finish_reason_end_stream() {
        assert_eq!(
            parse_sse_line("data: [DONE]").unwrap().unwrap().kind,
            StreamChunkKind::Done
        );
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Done);
    }

    #[test]
    fn upstream_error_event_is_surfaced() {
        let chunk = parse_sse_line(r#"data: {"error":{"message":"quota exceeded"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Error);
        assert_eq!(chunk.content, "quota exceeded");
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            parse_sse_line("data: {not json"),
            Err(PilotError::SseParsing(_))
        ));
    }
}
