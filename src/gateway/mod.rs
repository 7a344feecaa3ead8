pub mod prompts;
pub mod route;

use std::sync::Arc;

use chrono::Utc;

use crate::config::{AppConfig, ConfidenceTable, Outcome, UnknownModePolicy};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::registry::ProviderRegistry;
use crate::llm::types::{CallConfig, ChatMessage};
use crate::plan_parser::PlanParser;
use crate::types::{InferenceResponse, Mode};

/// Server side of a submission: builds the mode prompt, calls the upstream
/// vision model once, and shapes the reply. Holds no per-request state.
pub struct InferenceGateway {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    confidence: ConfidenceTable,
    parser: PlanParser,
    unknown_mode: UnknownModePolicy,
}

impl InferenceGateway {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig, confidence: ConfidenceTable) -> Self {
        let parser = PlanParser::from_table(&confidence);
        Self {
            provider,
            call,
            confidence,
            parser,
            unknown_mode: UnknownModePolicy::default(),
        }
    }

    pub fn with_unknown_mode(mut self, policy: UnknownModePolicy) -> Self {
        self.unknown_mode = policy;
        self
    }

    pub fn from_config(registry: &ProviderRegistry, config: &AppConfig) -> PilotResult<Self> {
        let (provider, call) = registry.vision_call_config()?;
        Ok(Self::new(provider, call, config.confidence.clone())
            .with_unknown_mode(config.gateway.unknown_mode))
    }

    /// Maps a wire `action` onto a mode, applying the unknown-mode policy.
    pub fn resolve_mode(&self, action: &str) -> PilotResult<Mode> {
        match action.parse::<Mode>() {
            Ok(mode) => Ok(mode),
            Err(err) => match self.unknown_mode {
                UnknownModePolicy::Analyze => {
                    tracing::warn!(action, "unknown action, serving as analyze");
                    Ok(Mode::Analyze)
                }
                UnknownModePolicy::Reject => Err(err),
            },
        }
    }

    /// One upstream call, no retries. Any upstream failure comes back as
    /// `PilotError::Upstream` carrying the service's message.
    pub async fn infer(
        &self,
        mode: Mode,
        instruction: &str,
        image_data_url: &str,
    ) -> PilotResult<InferenceResponse> {
        let prompt = prompts::build_prompt(mode, instruction);
        let messages = vec![ChatMessage::user_with_image(&prompt, image_data_url)];

        tracing::info!(
            mode = %mode,
            provider = %self.provider.name(),
            model = %self.call.model,
            "invoking vision model"
        );
        let text = self
            .provider
            .chat(messages, &self.call)
            .await
            .map_err(|e| match e {
                PilotError::Upstream(msg) => PilotError::Upstream(msg),
                other => PilotError::Upstream(other.to_string()),
            })?
            .content;

        let timestamp = Utc::now();
        let response = match mode {
            Mode::Analyze => InferenceResponse::Analysis {
                content: text,
                confidence: self.confidence.get(mode, Outcome::Success),
                timestamp,
            },
            Mode::Plan => {
                let plan = self.parser.parse(&text);
                let outcome = if plan.degraded {
                    Outcome::Fallback
                } else {
                    Outcome::Success
                };
                InferenceResponse::Plan {
                    actions: plan.steps,
                    confidence: self.confidence.get(mode, outcome),
                    timestamp,
                }
            }
            Mode::Execute => InferenceResponse::Execution {
                instructions: text,
                confidence: self.confidence.get(mode, Outcome::Success),
                timestamp,
            },
        };
        tracing::debug!(mode = %mode, confidence = response.confidence(), "inference complete");
        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::llm::types::{ContentPart, LlmResponse, MessageContent};
    use crate::types::ActionKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed reply and records the prompts it was given.
    pub(crate) struct ScriptedProvider {
        reply: Result<String, String>,
        pub(crate) seen: Mutex<Vec<ChatMessage>>,
    }

    impl ScriptedProvider {
        pub(crate) fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> PilotResult<LlmResponse> {
            self.seen.lock().unwrap().extend(messages);
            match &self.reply {
                Ok(text) => Ok(LlmResponse {
                    content: text.clone(),
                    reasoning: String::new(),
                }),
                Err(msg) => Err(PilotError::Upstream(msg.clone())),
            }
        }
    }

    pub(crate) fn gateway(provider: Arc<ScriptedProvider>) -> InferenceGateway {
        let call = CallConfig {
            model: "test-vlm".into(),
            stream: false,
            temperature: 0.1,
        };
        InferenceGateway::new(provider, call, ConfidenceTable::default())
    }

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    #[tokio::test]
    async fn analyze_uses_fixed_confidence() {
        let provider = ScriptedProvider::ok("A browser with a search bar.");
        let resp = gateway(provider.clone())
            .infer(Mode::Analyze, "what is this", IMAGE)
            .await
            .unwrap();
        match resp {
            InferenceResponse::Analysis { content, confidence, .. } => {
                assert_eq!(content, "A browser with a search bar.");
                assert_eq!(confidence, 0.9);
            }
            other => panic!("unexpected {other:?}"),
        }

        let seen = provider.seen.lock().unwrap();
        let MessageContent::Parts(parts) = &seen[0].content else {
            panic!("expected multimodal parts");
        };
        assert!(matches!(&parts[0], ContentPart::Text { text } if text.contains("what is this")));
        assert!(matches!(&parts[1], ContentPart::ImageUrl { image_url } if image_url.url == IMAGE));
    }

    #[tokio::test]
    async fn plan_parses_steps() {
        let provider =
            ScriptedProvider::ok(r#"[{"type":"click","description":"Search button","confidence":0.95}]"#);
        let resp = gateway(provider).infer(Mode::Plan, "search", IMAGE).await.unwrap();
        let InferenceResponse::Plan { actions, confidence, .. } = resp else {
            panic!("expected plan");
        };
        assert_eq!(confidence, 0.85);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Click);
    }

    #[tokio::test]
    async fn plan_degradation_lowers_top_level_confidence() {
        let provider = ScriptedProvider::ok("I clicked the button");
        let resp = gateway(provider).infer(Mode::Plan, "search", IMAGE).await.unwrap();
        let InferenceResponse::Plan { actions, confidence, .. } = resp else {
            panic!("expected plan");
        };
        assert_eq!(confidence, 0.7);
        assert_eq!(actions[0].kind, ActionKind::Analysis);
        assert_eq!(actions[0].confidence, 0.7);
    }

    #[tokio::test]
    async fn execute_returns_instructions() {
        let provider = ScriptedProvider::ok("Press Ctrl+L, type the URL, press Enter.");
        let resp = gateway(provider).infer(Mode::Execute, "open url", IMAGE).await.unwrap();
        assert_eq!(resp.confidence(), 0.8);
        assert_eq!(resp.summary_text(), "Press Ctrl+L, type the URL, press Enter.");
    }

    #[tokio::test]
    async fn upstream_failure_keeps_service_message() {
        let provider = ScriptedProvider::failing("API key not valid");
        let err = gateway(provider)
            .infer(Mode::Analyze, "x", IMAGE)
            .await
            .unwrap_err();
        assert!(matches!(err, PilotError::Upstream(m) if m == "API key not valid"));
    }

    #[test]
    fn unknown_mode_policy() {
        let lenient = gateway(ScriptedProvider::ok(""));
        assert_eq!(lenient.resolve_mode("summarize").unwrap(), Mode::Analyze);
        let strict = gateway(ScriptedProvider::ok("")).with_unknown_mode(UnknownModePolicy::Reject);
        assert!(matches!(strict.resolve_mode("summarize"), Err(PilotError::UnknownMode(_))));
        assert_eq!(strict.resolve_mode("plan").unwrap(), Mode::Plan);
    }
}
