//! chat session controller: owns the conversation, the input line, the busy
//! flag and the "waiting" phrase rotation. pure state; the plugin in `lib.rs`
//! drives it from bevy systems.

use std::time::Duration;

use bevy::input::ButtonInput;
use bevy::input::keyboard::KeyCode;
use bevy::prelude::Component;
use bevy::time::{Timer, TimerMode};

use crate::message::{Conversation, Message};
use crate::wire::WireMessage;

/// shown (in order, wrapping) while a reply is outstanding.
pub const PENDING_PHRASES: [&str; 4] = [
    "Warming up the vocal cords...",
    "Finding the spotlight...",
    "Running lines one more time...",
    "Waiting in the wings...",
];

pub const PENDING_INTERVAL: Duration = Duration::from_millis(1800);

/// user-facing notification raised when an exchange fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: &'static str,
    pub description: &'static str,
}

pub const CONNECTIVITY_NOTICE: Notice = Notice {
    title: "Couldn't reach the star",
    description: "I couldn't connect to the chat service. Make sure the OpenRouter API key is set and try again.",
};

#[derive(Component, Clone, Debug)]
pub struct ChatSession {
    conversation: Conversation,
    input: String,
    busy: bool,
    phrase: usize,
    phrase_timer: Timer,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            conversation: Conversation::seeded(),
            input: String::new(),
            busy: false,
            phrase: 0,
            phrase_timer: Timer::new(PENDING_INTERVAL, TimerMode::Repeating),
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// the input field is disabled while busy, so edits are dropped.
    pub fn set_input(&mut self, text: impl Into<String>) {
        if !self.busy {
            self.input = text.into();
        }
    }

    pub fn push_input(&mut self, text: &str) {
        if !self.busy {
            self.input.push_str(text);
        }
    }

    pub fn pop_input(&mut self) {
        if !self.busy {
            self.input.pop();
        }
    }

    /// whether the send affordance is enabled.
    pub fn can_send(&self) -> bool {
        !self.busy && !self.input.trim().is_empty()
    }

    /// submits the current input line. see `submit_text`.
    pub fn submit(&mut self) -> Option<Vec<WireMessage>> {
        let text = self.input.clone();
        self.submit_text(&text)
    }

    /// appends a user message and marks the session busy, returning the full
    /// history to send. `None` (and no change) for blank text or while busy.
    pub fn submit_text(&mut self, text: &str) -> Option<Vec<WireMessage>> {
        let text = text.trim();
        if self.busy || text.is_empty() {
            return None;
        }
        self.conversation.push(Message::user(text));
        self.input.clear();
        self.set_busy(true);
        Some(self.conversation.to_wire())
    }

    /// the proxy answered; `reply` is already defaulted to "" if it was absent.
    pub fn complete(&mut self, reply: impl Into<String>) {
        self.conversation.push(Message::assistant(reply));
        self.set_busy(false);
    }

    /// the exchange failed. the user's own message stays, nothing else is added.
    pub fn fail(&mut self) {
        self.set_busy(false);
    }

    pub fn tick_pending(&mut self, delta: Duration) {
        if !self.busy {
            return;
        }
        self.phrase_timer.tick(delta);
        let steps = self.phrase_timer.times_finished_this_tick() as usize;
        self.phrase = (self.phrase + steps) % PENDING_PHRASES.len();
    }

    pub fn pending_phrase(&self) -> Option<&'static str> {
        self.busy.then(|| PENDING_PHRASES[self.phrase])
    }

    fn set_busy(&mut self, busy: bool) {
        if self.busy && !busy {
            self.phrase = 0;
            self.phrase_timer.reset();
        }
        self.busy = busy;
    }
}

/// ctrl+enter (or cmd+enter) submits from the input field.
pub fn submit_chord_pressed(keys: &ButtonInput<KeyCode>) -> bool {
    keys.just_pressed(KeyCode::Enter)
        && keys.any_pressed([
            KeyCode::ControlLeft,
            KeyCode::ControlRight,
            KeyCode::SuperLeft,
            KeyCode::SuperRight,
        ])
}
