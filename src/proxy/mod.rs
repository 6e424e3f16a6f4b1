//! stateless http proxy between the chat client and the llm provider.
//!
//! holds the provider key, prepends the persona prompt, and relays exactly one
//! upstream completion per request. every response carries permissive cors
//! headers so a browser-hosted client on any origin can call it.

pub mod handler;
pub mod upstream;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bevy::log::info;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{CHAT_ROUTE, ProxyConfig};
use crate::error::ProxyError;
use crate::wire::ErrorBody;
use upstream::{OpenRouterUpstream, Upstream};

pub const CORS_ALLOW_ORIGIN: &str = "*";
pub const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// shared, read-only per-process state.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub upstream: Arc<dyn Upstream>,
}

impl ProxyState {
    pub fn new(config: ProxyConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self { config: Arc::new(config), upstream }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = handler::status_of(&self);
        let body = match self {
            ProxyError::MissingCredential => ErrorBody {
                error: "Missing OpenRouter API key".into(),
                details: None,
            },
            ProxyError::Upstream { body, .. } => ErrorBody {
                error: "OpenRouter error".into(),
                details: Some(body),
            },
            ProxyError::Unexpected(details) => ErrorBody {
                error: "Unexpected error".into(),
                details: Some(details),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route(CHAT_ROUTE, post(handler::chat).options(handler::preflight))
        .with_state(state)
        // conversations are forwarded whole, however long they get
        .layer(DefaultBodyLimit::disable())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(CORS_ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        ))
}

/// binds `config.bind_addr` and serves until ctrl-c.
pub async fn serve(config: ProxyConfig) -> std::io::Result<()> {
    let upstream: Arc<dyn Upstream> = Arc::new(OpenRouterUpstream::new(config.upstream_url.clone()));
    let addr = config.bind_addr.clone();
    info!(
        target: "persona_chat",
        "proxy: listening on {} route={} upstream={} key_present={}",
        addr, CHAT_ROUTE, config.upstream_url, config.key_present()
    );
    let app = router(ProxyState::new(config, upstream));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::upstream::{UpstreamCall, UpstreamReply};
    use crate::config::{DEFAULT_MODEL, DEFAULT_REFERER, PERSONA_PROMPT};
    use crate::wire::{UpstreamRequest, WireMessage};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// records calls and answers with a canned reply.
    struct FakeUpstream {
        reply: Result<UpstreamReply, String>,
        calls: Mutex<Vec<UpstreamCall>>,
    }

    impl FakeUpstream {
        fn answering(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(UpstreamReply { status, body: body.to_string() }),
                calls: Mutex::new(Vec::new()),
            })
        }
        fn unreachable() -> Arc<Self> {
            Arc::new(Self { reply: Err("connection refused".into()), calls: Mutex::new(Vec::new()) })
        }
        fn calls(&self) -> Vec<UpstreamCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Upstream for FakeUpstream {
        async fn complete(&self, call: UpstreamCall) -> Result<UpstreamReply, ProxyError> {
            self.calls.lock().unwrap().push(call);
            self.reply.clone().map_err(ProxyError::Unexpected)
        }
    }

    fn app(key: Option<&str>, upstream: Arc<FakeUpstream>) -> Router {
        let config = match key {
            Some(key) => ProxyConfig::default().with_api_key(key),
            None => ProxyConfig::default(),
        };
        router(ProxyState::new(config, upstream))
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(CHAT_ROUTE)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, value)
    }

    fn assert_cors(headers: &axum::http::HeaderMap) {
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(headers.get("access-control-allow-headers").unwrap(), CORS_ALLOW_HEADERS);
    }

    #[tokio::test]
    async fn forwards_persona_then_history() {
        let up = FakeUpstream::answering(200, r#"{"choices":[{"message":{"content":"Hi there!"}}]}"#);
        let (status, headers, body) = send(
            app(Some("sk-test"), up.clone()),
            post_json(r#"{"messages":[{"role":"user","content":"Hello"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"content": "Hi there!"}));
        assert_cors(&headers);

        let calls = up.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].api_key, "sk-test");
        assert_eq!(calls[0].referer, DEFAULT_REFERER);
        assert_eq!(
            calls[0].request,
            UpstreamRequest {
                model: DEFAULT_MODEL.into(),
                messages: vec![
                    WireMessage::new("system", PERSONA_PROMPT),
                    WireMessage::new("user", "Hello"),
                ],
                temperature: 0.8,
            }
        );
    }

    #[tokio::test]
    async fn missing_choices_is_empty_content() {
        let up = FakeUpstream::answering(200, r#"{"id":"x"}"#);
        let (status, _, body) =
            send(app(Some("sk-test"), up), post_json(r#"{"messages":[]}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"content": ""}));
    }

    #[tokio::test]
    async fn missing_key_never_calls_upstream() {
        let up = FakeUpstream::answering(200, "{}");
        let (status, headers, body) = send(
            app(None, up.clone()),
            post_json(r#"{"messages":[{"role":"user","content":"Hello"}]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Missing OpenRouter API key"}));
        assert_cors(&headers);
        assert!(up.calls().is_empty());

        // an empty key is just as missing
        let up = FakeUpstream::answering(200, "{}");
        let (status, _, _) = send(app(Some(""), up.clone()), post_json("{}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(up.calls().is_empty());
    }

    #[tokio::test]
    async fn upstream_status_and_body_are_relayed() {
        let up = FakeUpstream::answering(429, "rate limited");
        let (status, headers, body) = send(
            app(Some("sk-test"), up),
            post_json(r#"{"messages":[{"role":"user","content":"Hello"}]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "OpenRouter error");
        assert!(body["details"].as_str().unwrap().contains("rate limited"));
        assert_cors(&headers);
    }

    #[tokio::test]
    async fn transport_and_parse_failures_are_500() {
        let (status, _, body) = send(
            app(Some("sk-test"), FakeUpstream::unreachable()),
            post_json(r#"{"messages":[]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Unexpected error");
        assert!(body["details"].as_str().unwrap().contains("connection refused"));

        let (status, _, body) = send(
            app(Some("sk-test"), FakeUpstream::answering(200, "<html>oops</html>")),
            post_json(r#"{"messages":[]}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Unexpected error");

        let up = FakeUpstream::answering(200, "{}");
        let (status, _, body) = send(app(Some("sk-test"), up.clone()), post_json("not json")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Unexpected error");
        assert!(up.calls().is_empty());
    }

    #[tokio::test]
    async fn preflight_is_ok_without_upstream() {
        let up = FakeUpstream::answering(200, "{}");
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri(CHAT_ROUTE)
            .header("origin", "https://somewhere.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let res = app(None, up.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_cors(res.headers());
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
        assert!(up.calls().is_empty());
    }

    #[tokio::test]
    async fn origin_becomes_referer_and_model_is_honoured() {
        let up = FakeUpstream::answering(200, r#"{"choices":[{"message":{"content":"ok"}}]}"#);
        let req = Request::builder()
            .method(Method::POST)
            .uri(CHAT_ROUTE)
            .header("origin", "https://fan.example")
            .body(Body::from(r#"{"messages":[{"role":"narrator","content":"x"}],"model":"openai/gpt-4o"}"#))
            .unwrap();
        let (status, _, _) = send(app(Some("sk-test"), up.clone()), req).await;
        assert_eq!(status, StatusCode::OK);

        let calls = up.calls();
        assert_eq!(calls[0].referer, "https://fan.example");
        assert_eq!(calls[0].request.model, "openai/gpt-4o");
        // roles are forwarded as-is
        assert_eq!(calls[0].request.messages[1], WireMessage::new("narrator", "x"));
    }

    fn long_conversation() -> String {
        // well past axum's 2 MB default body limit
        let chunk = "la".repeat(1024 * 1024);
        let history: Vec<WireMessage> =
            (0..3).map(|_| WireMessage::new("user", chunk.as_str())).collect();
        serde_json::to_string(&json!({ "messages": history })).unwrap()
    }

    #[tokio::test]
    async fn long_conversations_are_forwarded_whole() {
        let body = long_conversation();
        assert!(body.len() > 2 * 1024 * 1024);

        let up = FakeUpstream::answering(200, r#"{"choices":[{"message":{"content":"Bravo!"}}]}"#);
        let (status, headers, reply) = send(app(Some("sk-test"), up.clone()), post_json(&body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply, json!({"content": "Bravo!"}));
        assert_cors(&headers);
        let calls = up.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.messages.len(), 4);

        // the credential check still answers first
        let up = FakeUpstream::answering(200, "{}");
        let (status, _, reply) = send(app(None, up.clone()), post_json(&body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply, json!({"error": "Missing OpenRouter API key"}));
        assert!(up.calls().is_empty());
    }

    #[tokio::test]
    async fn null_history_forwards_persona_only() {
        for body in [r#"{"messages":null}"#, "null"] {
            let up = FakeUpstream::answering(200, r#"{"choices":[{"message":{"content":"ok"}}]}"#);
            let (status, _, _) = send(app(Some("sk-test"), up.clone()), post_json(body)).await;
            assert_eq!(status, StatusCode::OK, "body {body}");
            let calls = up.calls();
            assert_eq!(calls[0].request.messages, vec![WireMessage::new("system", PERSONA_PROMPT)]);
        }
    }
}
