use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{PilotError, PilotResult};
use crate::gateway::route::{GatewayReply, GatewayRequest};
use crate::gateway::InferenceGateway;

/// Carries one request from the orchestrator to a gateway.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    /// Transport failures are `PilotError::Network`. A reply with a
    /// non-success status is still `Ok`.
    async fn send(&self, request: &GatewayRequest) -> PilotResult<GatewayReply>;
}

/// Talks to a remote gateway over HTTP.
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Loopback endpoints bypass any configured HTTP proxy.
    pub fn new(endpoint: String, timeout: Duration) -> PilotResult<Self> {
        let url = reqwest::Url::parse(&endpoint)
            .map_err(|e| PilotError::Config(format!("gateway.endpoint {endpoint:?}: {e}")))?;
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if is_loopback(&url) {
            builder = builder.no_proxy();
        }
        Ok(Self {
            endpoint,
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl GatewayTransport for HttpTransport {
    async fn send(&self, request: &GatewayRequest) -> PilotResult<GatewayReply> {
        tracing::debug!(endpoint = %self.endpoint, action = %request.action, "posting submission");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| PilotError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| PilotError::Network(e.to_string()))?;

        reply_from_http(status, &text)
    }
}

fn is_loopback(url: &reqwest::Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    host.eq_ignore_ascii_case("localhost")
        || host
            .trim_matches(['[', ']'])
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

/// Status and raw body of an HTTP answer as a [`GatewayReply`]. A non-JSON
/// error body becomes `Null`; a non-JSON success body is a network failure.
fn reply_from_http(status: u16, text: &str) -> PilotResult<GatewayReply> {
    let body = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(body) => body,
        Err(_) if !(200..300).contains(&status) => serde_json::Value::Null,
        Err(e) => {
            return Err(PilotError::Network(format!("unreadable gateway reply: {e}")));
        }
    };
    Ok(GatewayReply { status, body })
}

/// Serves submissions with an in-process gateway.
pub struct LocalTransport {
    gateway: Arc<InferenceGateway>,
}

impl LocalTransport {
    pub fn new(gateway: Arc<InferenceGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl GatewayTransport for LocalTransport {
    async fn send(&self, request: &GatewayRequest) -> PilotResult<GatewayReply> {
        Ok(self.gateway.handle_request(request.clone()).await)
    }
}
