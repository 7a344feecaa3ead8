pub mod capture;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod llm;
pub mod orchestrator;
pub mod plan_parser;
pub mod render;
pub mod timeline;
pub mod types;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::PilotResult;
use crate::gateway::InferenceGateway;
use crate::llm::registry::ProviderRegistry;
use crate::orchestrator::transport::{GatewayTransport, HttpTransport, LocalTransport};
use crate::orchestrator::Orchestrator;
use crate::timeline::Timeline;

/// Installs the tracing subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Picks the transport named by `[gateway].endpoint`: HTTP when set, an
/// in-process gateway over the active provider otherwise.
pub fn build_transport(config: &AppConfig) -> PilotResult<Arc<dyn GatewayTransport>> {
    match &config.gateway.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint = %endpoint, "using remote gateway");
            Ok(Arc::new(HttpTransport::new(
                endpoint.clone(),
                config.gateway.request_timeout(),
            )?))
        }
        None => {
            let registry = ProviderRegistry::from_config(config);
            let gateway = InferenceGateway::from_config(&registry, config)?;
            tracing::info!("using in-process gateway");
            Ok(Arc::new(LocalTransport::new(Arc::new(gateway))))
        }
    }
}

/// Orchestrator wired from configuration, with a fresh timeline.
pub fn build_orchestrator(config: &AppConfig) -> PilotResult<Orchestrator> {
    let transport = build_transport(config)?;
    Ok(Orchestrator::new(transport, Timeline::new(), &config.gateway)
        .with_confidence(config.confidence.clone()))
}
