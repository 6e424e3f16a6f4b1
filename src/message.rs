//! conversation data model: roles, immutable messages, and the append-only
//! conversation a `ChatSession` owns.

use serde::{Deserialize, Serialize};

use crate::wire::WireMessage;

/// first line of every conversation, spoken by the assistant.
pub const GREETING: &str = "Hi! I'm your starry-eyed study buddy with a Broadway heart. \
What should we rehearse today: ideas, plans, or a big dream?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// a single chat line. fields are private so a message can't change once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
    pub fn role(&self) -> Role {
        self.role
    }
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        WireMessage { role: m.role.as_str().to_string(), content: m.content.clone() }
    }
}

/// chronological message list, oldest first. only grows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::seeded()
    }
}

impl Conversation {
    /// a fresh conversation holding only the assistant greeting.
    pub fn seeded() -> Self {
        Self { messages: vec![Message::assistant(GREETING)] }
    }

    pub(crate) fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[Message] {
        &self.messages
    }

    /// the payload shape the proxy expects.
    pub fn to_wire(&self) -> Vec<WireMessage> {
        self.messages.iter().map(WireMessage::from).collect()
    }
}
