use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use bevy::log::{info, warn};
use serde_json::Value;

use super::ProxyState;
use super::upstream::UpstreamCall;
use crate::config::{DEFAULT_MODEL, PERSONA_PROMPT, TEMPERATURE};
use crate::error::ProxyError;
use crate::wire::{ChatReply, ChatRequestBody, UpstreamRequest, WireMessage, first_choice_text};

/// `OPTIONS` preflight. cors headers come from the router layers.
pub async fn preflight() -> &'static str {
    "ok"
}

/// `POST`: forward the conversation upstream behind the persona prompt.
pub async fn chat(
    State(state): State<ProxyState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ChatReply>, ProxyError> {
    let Some(api_key) = state.config.api_key.clone().filter(|k| !k.is_empty()) else {
        warn!(target: "persona_chat", "rejecting request: no upstream credential configured");
        return Err(ProxyError::MissingCredential);
    };

    // a bare `null` body is an empty conversation
    let body: Option<ChatRequestBody> = serde_json::from_slice(&body)?;
    let request = build_upstream_request(body.unwrap_or_default());
    info!(
        target: "persona_chat",
        "chat: model={} msgs={}",
        request.model, request.messages.len()
    );

    let referer = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.default_referer.clone());

    let reply = state
        .upstream
        .complete(UpstreamCall {
            api_key,
            referer,
            title: state.config.app_title.clone(),
            request,
        })
        .await?;

    if !reply.is_success() {
        warn!(target: "persona_chat", "upstream returned status {}", reply.status);
        return Err(ProxyError::Upstream { status: reply.status, body: reply.body });
    }

    let completion: Value = serde_json::from_str(&reply.body)?;
    let content = first_choice_text(&completion);
    info!(target: "persona_chat", "chat completed: len={}", content.len());
    Ok(Json(ChatReply { content }))
}

/// persona first, then the caller's messages untouched and in order.
pub fn build_upstream_request(body: ChatRequestBody) -> UpstreamRequest {
    let mut messages = Vec::with_capacity(body.messages.len() + 1);
    messages.push(WireMessage::new("system", PERSONA_PROMPT));
    messages.extend(body.messages);
    UpstreamRequest {
        model: body.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        messages,
        temperature: TEMPERATURE,
    }
}

/// maps a proxy failure onto the http status it is reported with.
pub fn status_of(err: &ProxyError) -> StatusCode {
    match err {
        ProxyError::Upstream { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ProxyError::MissingCredential | ProxyError::Unexpected(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
