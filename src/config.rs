//! environment-seeded configuration for the chat client and the proxy.
//!
//! client:
//!   PERSONA_PROXY_URL        (default http://127.0.0.1:8787)
//!   PERSONA_PUBLISHABLE_KEY  (anon key, default empty)
//!
//! proxy:
//!   OPENROUTER_API_KEY       (required per request; never sent to clients)
//!   PERSONA_UPSTREAM_URL     (default openrouter chat completions)
//!   PERSONA_PROXY_ADDR       (default 127.0.0.1:8787)

use bevy::prelude::Resource;

/// path the proxy serves and the client posts to.
pub const CHAT_ROUTE: &str = "/persona-chat";

pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// upstream model used when a request doesn't name one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";
pub const TEMPERATURE: f64 = 0.8;

pub const APP_TITLE: &str = "Persona Chatbot";
/// referer reported upstream when the caller sent no `Origin`.
pub const DEFAULT_REFERER: &str = "https://persona-chat.local";

/// system instruction prepended to every forwarded conversation.
pub const PERSONA_PROMPT: &str = "You are a helpful AI assistant who speaks like a Broadway-bound \
show choir star: theatrical, ambitious, optimistic, and encouraging. You use enthusiastic, \
stage-inflected phrasing, occasional witty asides, and supportive coaching energy. Be helpful \
and on-topic. Avoid sharing copyrighted song lyrics beyond brief, non-copyrightable snippets. \
Keep responses concise unless asked to elaborate.";

/// where the chat client finds the proxy.
#[derive(Resource, Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    /// publishable anon key, sent as a bearer token. not a secret.
    pub anon_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_PROXY_URL.to_string(), anon_key: String::new() }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), anon_key: anon_key.into() }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("PERSONA_PROXY_URL")
                .unwrap_or_else(|_| DEFAULT_PROXY_URL.to_string()),
            anon_key: std::env::var("PERSONA_PUBLISHABLE_KEY").unwrap_or_default(),
        }
    }

    /// browsers have no process env; values are baked in at build time.
    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Self {
        Self {
            base_url: option_env!("PERSONA_PROXY_URL").unwrap_or(DEFAULT_PROXY_URL).to_string(),
            anon_key: option_env!("PERSONA_PUBLISHABLE_KEY").unwrap_or_default().to_string(),
        }
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), CHAT_ROUTE)
    }
}

/// server-side settings. `api_key` stays here and is only ever sent upstream.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub bind_addr: String,
    pub app_title: String,
    pub default_referer: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            app_title: APP_TITLE.to_string(),
            default_referer: DEFAULT_REFERER.to_string(),
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// builds the config from any key lookup. empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Self {
            api_key: get("OPENROUTER_API_KEY"),
            upstream_url: get("PERSONA_UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            bind_addr: get("PERSONA_PROXY_ADDR").unwrap_or(defaults.bind_addr),
            ..defaults
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn key_present(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}
