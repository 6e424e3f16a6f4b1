//! persona-proxy: serves the chat proxy endpoint.
//!
//! env:
//!   OPENROUTER_API_KEY    (provider key; requests fail with 500 without it)
//!   PERSONA_UPSTREAM_URL  (default https://openrouter.ai/api/v1/chat/completions)
//!   PERSONA_PROXY_ADDR    (default 127.0.0.1:8787)
//!   RUST_LOG              (default info)

use bevy::log::warn;
use bevy_persona_chat::{ProxyConfig, proxy};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ProxyConfig::from_env();
    if !config.key_present() {
        // keep serving: every chat request reports the missing key to the caller
        warn!(target: "persona_chat", "OPENROUTER_API_KEY is not set");
    }
    proxy::serve(config).await
}
