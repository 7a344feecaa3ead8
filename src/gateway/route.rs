//! HTTP-shaped entry points of the gateway.
//!
//! These functions take a raw request body and return a status plus JSON
//! body, so any HTTP server (or the in-process transport) can mount them.
use serde::{Deserialize, Serialize};

use crate::gateway::InferenceGateway;
use crate::errors::PilotError;

/// Body of a computer-use request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub prompt: String,
    /// Data-URL encoded raster image.
    pub screenshot: String,
    /// `analyze`, `plan` or `execute`.
    pub action: String,
}

/// Body of every non-200 reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl GatewayReply {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn error(status: u16, error: impl Into<String>, details: Option<String>) -> Self {
        let body = GatewayErrorBody {
            error: error.into(),
            details,
        };
        Self {
            status,
            body: serde_json::to_value(body).unwrap_or_default(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl InferenceGateway {
    /// POST handler for a computer-use request body.
    pub async fn handle(&self, body: &[u8]) -> GatewayReply {
        match serde_json::from_slice::<GatewayRequest>(body) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "malformed computer-use request");
                GatewayReply::error(400, "Invalid request body", Some(e.to_string()))
            }
        }
    }

    pub async fn handle_request(&self, request: GatewayRequest) -> GatewayReply {
        let prompt = request.prompt.trim();
        if prompt.is_empty() || request.screenshot.is_empty() {
            return GatewayReply::error(400, "prompt and screenshot are required", None);
        }

        let mode = match self.resolve_mode(&request.action) {
            Ok(mode) => mode,
            Err(e) => return GatewayReply::error(400, e.to_string(), None),
        };

        match self.infer(mode, prompt, &request.screenshot).await {
            Ok(response) => match serde_json::to_value(&response) {
                Ok(body) => GatewayReply::ok(body),
                Err(e) => GatewayReply::error(500, e.to_string(), None),
            },
            Err(e) => {
                tracing::error!(mode = %mode, error = %e, "computer use failed");
                let message = match e {
                    PilotError::Upstream(msg) => msg,
                    other => other.to_string(),
                };
                GatewayReply::error(500, message, Some(format!("{mode} request failed")))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScreenshotUpload {
    screenshot: String,
}

/// GET handler of the screenshot intake route.
pub fn screenshot_status() -> GatewayReply {
    GatewayReply::ok(serde_json::json!({
        "message": "Screenshot endpoint ready",
        "instructions": "Capture on the client and POST {\"screenshot\": <data URL>}",
    }))
}

/// POST handler of the screenshot intake route. The image is measured and
/// dropped; nothing is stored.
pub fn accept_screenshot(body: &[u8]) -> GatewayReply {
    match serde_json::from_slice::<ScreenshotUpload>(body) {
        Ok(upload) => {
            tracing::debug!(size = upload.screenshot.len(), "screenshot received");
            GatewayReply::ok(serde_json::json!({
                "success": true,
                "message": "Screenshot received",
                "size": upload.screenshot.len(),
            }))
        }
        Err(e) => {
            tracing::warn!(error = %e, "screenshot processing failed");
            GatewayReply::error(500, "Screenshot processing failed", None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnknownModePolicy;
    use crate::gateway::tests::{gateway, ScriptedProvider};

    fn body(action: &str) -> Vec<u8> {
        serde_json::to_vec(&GatewayRequest {
            prompt: "find search".into(),
            screenshot: "data:image/png;base64,iVBORw0KGgo=".into(),
            action: action.into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn plan_reply_carries_type_and_timestamp() {
        let gw = gateway(ScriptedProvider::ok(r#"[{"type":"click","description":"Go"}]"#));
        let reply = gw.handle(&body("plan")).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["type"], "plan");
        assert_eq!(reply.body["actions"][0]["type"], "click");
        assert!(reply.body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn analyze_and_execute_use_wire_type_names() {
        let gw = gateway(ScriptedProvider::ok("text"));
        assert_eq!(gw.handle(&body("analyze")).await.body["type"], "analysis");
        assert_eq!(gw.handle(&body("execute")).await.body["type"], "execution");
    }

    #[tokio::test]
    async fn unknown_action_defaults_to_analysis() {
        let gw = gateway(ScriptedProvider::ok("text"));
        let reply = gw.handle(&body("teleport")).await;
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["type"], "analysis");
    }

    #[tokio::test]
    async fn unknown_action_rejected_in_strict_mode() {
        let gw = gateway(ScriptedProvider::ok("text")).with_unknown_mode(UnknownModePolicy::Reject);
        let reply = gw.handle(&body("teleport")).await;
        assert_eq!(reply.status, 400);
        assert!(reply.body["error"].as_str().unwrap().contains("teleport"));
    }

    #[tokio::test]
    async fn upstream_error_becomes_500_with_message() {
        let gw = gateway(ScriptedProvider::failing("Analysis failed"));
        let reply = gw.handle(&body("analyze")).await;
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body["error"], "Analysis failed");
        assert_eq!(reply.body["details"], "analyze request failed");
    }

    #[tokio::test]
    async fn malformed_and_empty_requests_are_400() {
        let gw = gateway(ScriptedProvider::ok("text"));
        assert_eq!(gw.handle(b"{not json").await.status, 400);

        let empty = serde_json::to_vec(&GatewayRequest {
            prompt: "   ".into(),
            screenshot: "data:image/png;base64,AA".into(),
            action: "analyze".into(),
        })
        .unwrap();
        assert_eq!(gw.handle(&empty).await.status, 400);
    }

    #[test]
    fn screenshot_intake_reports_size() {
        let reply = accept_screenshot(br#"{"screenshot":"data:image/png;base64,AAAA"}"#);
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body["success"], true);
        assert_eq!(reply.body["size"], 26);

        let bad = accept_screenshot(b"[]");
        assert_eq!(bad.status, 500);
        assert_eq!(bad.body["error"], "Screenshot processing failed");
        assert!(bad.body.get("details").is_none());
        assert_eq!(screenshot_status().body["message"], "Screenshot endpoint ready");
    }
}
