//! the call out to the chat-completion provider.

use async_trait::async_trait;
use bevy::log::debug;

use crate::error::ProxyError;
use crate::wire::UpstreamRequest;

/// everything needed for one upstream request.
#[derive(Clone, Debug, PartialEq)]
pub struct UpstreamCall {
    pub api_key: String,
    pub referer: String,
    pub title: String,
    pub request: UpstreamRequest,
}

/// raw provider answer; status interpretation is left to the handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

impl UpstreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// `Err` only for transport-level failures; any http status is `Ok`.
    async fn complete(&self, call: UpstreamCall) -> Result<UpstreamReply, ProxyError>;
}

/// openrouter (or any openai-compatible) chat completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenRouterUpstream {
    url: String,
}

impl OpenRouterUpstream {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Upstream for OpenRouterUpstream {
    async fn complete(&self, call: UpstreamCall) -> Result<UpstreamReply, ProxyError> {
        let url = self.url.clone();
        // ureq is blocking; keep it off the async workers
        tokio::task::spawn_blocking(move || {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .http_status_as_error(false)
                .build()
                .into();
            debug!(target: "persona_chat", "upstream POST {} model={}", url, call.request.model);
            let res = agent
                .post(&url)
                .header("content-type", "application/json")
                .header("authorization", &format!("Bearer {}", call.api_key))
                .header("http-referer", &call.referer)
                .header("x-title", &call.title)
                .send_json(&call.request)
                .map_err(|e| ProxyError::Unexpected(e.to_string()))?;
            let status = res.status().as_u16();
            let body = res
                .into_body()
                .read_to_string()
                .map_err(|e| ProxyError::Unexpected(e.to_string()))?;
            Ok(UpstreamReply { status, body })
        })
        .await
        .map_err(|e| ProxyError::Unexpected(e.to_string()))?
    }
}
