//! client -> proxy http call.
//!
//! native uses blocking `ureq` (run it off the main thread, e.g. on bevy's
//! io pool); wasm uses `gloo-net`'s fetch wrapper.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::wire::{ChatRequestBody, WireMessage, reply_text};

/// sends a whole conversation and returns the assistant reply text.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, messages: Vec<WireMessage>) -> Result<String, TransportError>;
}

/// talks to the persona proxy over http.
#[derive(Clone, Debug)]
pub struct ProxyClient {
    url: String,
    anon_key: String,
}

impl ProxyClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self { url: config.chat_url(), anon_key: config.anon_key.clone() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn body(messages: Vec<WireMessage>) -> ChatRequestBody {
        ChatRequestBody { messages, model: None }
    }
}

/// maps a finished http exchange to reply text.
fn decode_reply(status: u16, text: &str) -> Result<String, TransportError> {
    if !(200..300).contains(&status) {
        return Err(TransportError::Status { status, body: text.to_string() });
    }
    let v: Value = serde_json::from_str(text)?;
    Ok(reply_text(&v))
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl ChatTransport for ProxyClient {
    async fn send(&self, messages: Vec<WireMessage>) -> Result<String, TransportError> {
        // status codes are handled by `decode_reply`, not as ureq errors
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        let res = agent
            .post(&self.url)
            .header("content-type", "application/json")
            .header("authorization", &format!("Bearer {}", self.anon_key))
            .send_json(Self::body(messages))
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let status = res.status().as_u16();
        let text = res
            .into_body()
            .read_to_string()
            .map_err(|e| TransportError::Http(e.to_string()))?;
        decode_reply(status, &text)
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl ChatTransport for ProxyClient {
    async fn send(&self, messages: Vec<WireMessage>) -> Result<String, TransportError> {
        use gloo_net::http::Request;

        let resp = Request::post(&self.url)
            .header("authorization", &format!("Bearer {}", self.anon_key))
            .json(&Self::body(messages))
            .map_err(|e| TransportError::Http(e.to_string()))?
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| TransportError::Http(e.to_string()))?;
        decode_reply(status, &text)
    }
}
