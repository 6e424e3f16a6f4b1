//! json shapes exchanged between the chat client, the proxy and the upstream
//! chat-completion provider.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// a message as it travels over http. the role is a free string so the proxy
/// can forward whatever the caller sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }
}

/// `POST` body accepted by the proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub messages: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<WireMessage>, D::Error> {
    Ok(Option::<Vec<WireMessage>>::deserialize(d)?.unwrap_or_default())
}

/// successful proxy response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
}

/// failed proxy response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// body sent to the upstream provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f64,
}

/// pulls `choices[0].message.content` out of an openai-style completion.
/// anything missing (or not a string) reads as empty text.
pub fn first_choice_text(completion: &Value) -> String {
    completion
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// reads `content` out of a proxy reply, tolerating a missing or null field.
pub fn reply_text(reply: &Value) -> String {
    reply.get("content").and_then(Value::as_str).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_body_defaults_missing_fields() {
        let body: ChatRequestBody = serde_json::from_str("{}").unwrap();
        assert!(body.messages.is_empty());
        assert_eq!(body.model, None);

        let body: ChatRequestBody = serde_json::from_str(r#"{"messages":[],"model":null}"#).unwrap();
        assert_eq!(body.model, None);

        let body: ChatRequestBody = serde_json::from_str(r#"{"messages":null}"#).unwrap();
        assert!(body.messages.is_empty());
    }

    #[test]
    fn request_body_keeps_unknown_roles() {
        let body: ChatRequestBody =
            serde_json::from_str(r#"{"messages":[{"role":"narrator","content":"x"}]}"#).unwrap();
        assert_eq!(body.messages, vec![WireMessage::new("narrator", "x")]);
    }

    #[test]
    fn error_body_omits_absent_details() {
        let s = serde_json::to_string(&ErrorBody { error: "boom".into(), details: None }).unwrap();
        assert_eq!(s, r#"{"error":"boom"}"#);
    }

    #[test]
    fn first_choice_text_handles_shapes() {
        let full = json!({"choices":[{"message":{"content":"Hi there!"}}]});
        assert_eq!(first_choice_text(&full), "Hi there!");
        assert_eq!(first_choice_text(&json!({})), "");
        assert_eq!(first_choice_text(&json!({"choices":[]})), "");
        assert_eq!(first_choice_text(&json!({"choices":[{"message":{"content":null}}]})), "");
    }

    #[test]
    fn reply_text_tolerates_null() {
        assert_eq!(reply_text(&json!({"content":"ok"})), "ok");
        assert_eq!(reply_text(&json!({"content":null})), "");
        assert_eq!(reply_text(&json!({})), "");
    }

    #[test]
    fn upstream_request_serializes_temperature() {
        let req = UpstreamRequest {
            model: "m".into(),
            messages: vec![WireMessage::new("user", "Hello")],
            temperature: 0.8,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"model":"m","messages":[{"role":"user","content":"Hello"}],"temperature":0.8}));
    }
}
