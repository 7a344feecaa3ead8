use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{AppConfig, LlmConfig};
use crate::errors::{PilotError, PilotResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::gemini::GeminiProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Vision-capable providers by their `[llm.providers.<id>]` key.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get_active(&self) -> PilotResult<Arc<dyn LlmProvider>> {
        self.providers
            .get(&self.active)
            .cloned()
            .ok_or_else(|| PilotError::Config(format!("Active provider '{}' not found in registry", self.active)))
    }

    /// Return the provider and call configuration used for vision calls.
    ///
    /// Resolution order:
    /// 1. `[llm.vision]` in config.toml
    /// 2. Fallback: active provider with its default model / temperature, no streaming
    pub fn vision_call_config(&self) -> PilotResult<(Arc<dyn LlmProvider>, CallConfig)> {
        if let Some(entry) = self.llm_config.vision.as_ref() {
            let provider = self.providers.get(&entry.provider).cloned().ok_or_else(|| {
                PilotError::Config(format!(
                    "Vision role references unknown provider '{}'",
                    entry.provider
                ))
            })?;
            let temperature = entry.temperature.unwrap_or_else(|| {
                self.llm_config
                    .providers
                    .get(&entry.provider)
                    .map(|p| p.temperature)
                    .unwrap_or(0.1)
            });
            tracing::debug!(
                provider = %entry.provider,
                model = %entry.model,
                stream = entry.stream,
                temperature = temperature,
                "resolved vision role config"
            );
            return Ok((provider, CallConfig {
                model: entry.model.clone(),
                stream: entry.stream,
                temperature,
            }));
        }

        let provider = self.get_active()?;
        let entry = self.llm_config.providers.get(&self.active);
        let (model, temperature) = entry
            .map(|p| (p.model.clone(), p.temperature))
            .unwrap_or_else(|| (String::new(), 0.1));
        tracing::debug!(
            provider = %self.active,
            model = %model,
            "vision role not configured, using active provider fallback"
        );
        Ok((provider, CallConfig { model, stream: false, temperature }))
    }

    /// Registers one provider per configured entry with a usable adapter.
    /// API keys come from `SCREENPILOT_<ID>_API_KEY`, then config.toml, then
    /// `GOOGLE_GENERATIVE_AI_API_KEY` for the gemini adapter.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self {
            providers: HashMap::new(),
            active: config.llm.active_provider.clone(),
            llm_config: config.llm.clone(),
        };
        for (id, entry) in &config.llm.providers {
            let is_gemini = entry.adapter.as_deref() == Some("gemini");
            let api_key = std::env::var(format!("SCREENPILOT_{}_API_KEY", id.to_uppercase()))
                .ok()
                .or_else(|| entry.api_key.clone())
                .or_else(|| {
                    is_gemini
                        .then(|| std::env::var("GOOGLE_GENERATIVE_AI_API_KEY").ok())
                        .flatten()
                })
                .unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured");
            }

            let provider: Arc<dyn LlmProvider> = match entry.adapter.as_deref() {
                Some("gemini") => Arc::new(GeminiProvider::new(
                    id.clone(),
                    entry.api_base.clone(),
                    api_key,
                )),
                None | Some("openai") => Arc::new(OpenAiCompatibleProvider::new(
                    id.clone(),
                    entry.api_base.clone(),
                    api_key,
                )),
                Some(other) => {
                    tracing::warn!(provider = %id, adapter = other, "unknown adapter, skipping provider");
                    continue;
                }
            };
            registry.register(provider);
        }
        registry
    }
}
