use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{PilotError, PilotResult};
use crate::types::Mode;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub confidence: ConfidenceTable,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Overrides provider/model for the vision calls. Falls back to
    /// `active_provider` defaults when absent.
    #[serde(default)]
    pub vision: Option<RoleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    /// Default model for this provider.
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// "gemini" for Google's generateContent API, None for OpenAI-compatible
    pub adapter: Option<String>,
    /// Optional API key stored in config.toml (falls back to env var SCREENPILOT_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleEntry {
    /// Must match a key under [llm.providers.*].
    pub provider: String,
    /// Model name sent to the API.
    pub model: String,
    /// Use SSE streaming (OpenAI-compatible adapter only).
    #[serde(default)]
    pub stream: bool,
    /// Overrides the provider-level temperature.
    pub temperature: Option<f64>,
}

fn default_temperature() -> f64 {
    0.1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// URL of a remote gateway. When unset, submissions are served in-process.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_step_stagger_ms")]
    pub step_stagger_ms: u64,
    #[serde(default)]
    pub unknown_mode: UnknownModePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: default_request_timeout_secs(),
            step_stagger_ms: default_step_stagger_ms(),
            unknown_mode: UnknownModePolicy::default(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Capped at [`MAX_STEP_STAGGER`].
    pub fn step_stagger(&self) -> Duration {
        Duration::from_millis(self.step_stagger_ms).min(MAX_STEP_STAGGER)
    }
}

/// Longest accepted delay between two revealed plan steps.
pub const MAX_STEP_STAGGER: Duration = Duration::from_secs(60);

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_step_stagger_ms() -> u64 {
    500
}

/// What the gateway does with an `action` it does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnknownModePolicy {
    /// Serve it as `analyze`.
    #[default]
    Analyze,
    /// Answer 400.
    Reject,
}

/// Whether a response came from structured output or from the
/// degraded free-text path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Fallback,
}

/// Confidence values attached to responses. The upstream service reports
/// none, so every number shown to the user comes from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceTable {
    pub analyze: f64,
    pub plan: f64,
    pub plan_fallback: f64,
    pub execute: f64,
    /// Used for plan steps that carry no confidence of their own.
    pub plan_step_default: f64,
}

impl Default for ConfidenceTable {
    fn default() -> Self {
        Self {
            analyze: 0.9,
            plan: 0.85,
            plan_fallback: 0.7,
            execute: 0.8,
            plan_step_default: 0.85,
        }
    }
}

impl ConfidenceTable {
    /// Only plan mode has a fallback path; other modes ignore `outcome`.
    pub fn get(&self, mode: Mode, outcome: Outcome) -> f64 {
        match (mode, outcome) {
            (Mode::Analyze, _) => self.analyze,
            (Mode::Plan, Outcome::Success) => self.plan,
            (Mode::Plan, Outcome::Fallback) => self.plan_fallback,
            (Mode::Execute, _) => self.execute,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureConfig {
    #[serde(default)]
    pub monitor_index: usize,
}

const CONFIG_ENV: &str = "SCREENPILOT_CONFIG";
const CONFIG_FILE: &str = "config.toml";

fn resolve_config_path() -> PilotResult<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        let candidate = PathBuf::from(explicit);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config taken from {CONFIG_ENV}");
            return Ok(candidate);
        }
        return Err(PilotError::Config(format!(
            "{CONFIG_ENV} points at missing file {}",
            candidate.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join(CONFIG_FILE);
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join(CONFIG_FILE);
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    if let Some(dir) = dirs::config_dir() {
        let candidate = dir.join("screenpilot").join(CONFIG_FILE);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found in user config dir");
            return Ok(candidate);
        }
    }

    Err(PilotError::Config(
        "config.toml not found next to executable, in working directory, or in user config dir"
            .into(),
    ))
}

pub fn load_config() -> PilotResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> PilotResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

pub fn save_config(config: &AppConfig, path: &Path) -> PilotResult<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

impl AppConfig {
    fn validate(&self) -> PilotResult<()> {
        let c = &self.confidence;
        for (name, value) in [
            ("analyze", c.analyze),
            ("plan", c.plan),
            ("plan_fallback", c.plan_fallback),
            ("execute", c.execute),
            ("plan_step_default", c.plan_step_default),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PilotError::Config(format!(
                    "confidence.{name} = {value} is outside [0, 1]"
                )));
            }
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(PilotError::Config(
                "gateway.request_timeout_secs must be positive".into(),
            ));
        }
        if Duration::from_millis(self.gateway.step_stagger_ms) > MAX_STEP_STAGGER {
            return Err(PilotError::Config(format!(
                "gateway.step_stagger_ms = {} exceeds {} ms",
                self.gateway.step_stagger_ms,
                MAX_STEP_STAGGER.as_millis()
            )));
        }
        Ok(())
    }
}
