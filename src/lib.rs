//! bevy_persona_chat: a themed chat front-end for bevy plus the thin proxy
//! that keeps the llm provider key on the server.
//!
//! - `ChatSession` owns the conversation, input line and busy flag.
//! - `PersonaChatPlugin` ships the whole history to the proxy off-thread
//!   and folds the reply (or a connectivity notice) back in as bevy events.
//! - `proxy` (native, `proxy` feature) is the axum endpoint that injects the
//!   persona prompt and calls the upstream chat-completion api.
//!
//! never blocks the main thread: requests run on bevy's io pool (blocking
//! `ureq` on native, `gloo-net` on wasm) and results come back through a
//! bounded channel drained once per frame.

use bevy::input::ButtonInput;
use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy::tasks::IoTaskPool;
use bevy::ui::ScrollPosition;
use flume::{Receiver, Sender, TryRecvError};
use std::sync::Arc;

pub mod config;
pub mod error;
pub mod message;
#[cfg(all(feature = "proxy", not(target_arch = "wasm32")))]
pub mod proxy;
pub mod session;
pub mod transport;
pub mod wire;

pub use config::{CHAT_ROUTE, ClientConfig, DEFAULT_MODEL, PERSONA_PROMPT, ProxyConfig};
pub use error::{ProxyError, TransportError};
pub use message::{Conversation, GREETING, Message, Role};
pub use session::{
    CONNECTIVITY_NOTICE, ChatSession, Notice, PENDING_INTERVAL, PENDING_PHRASES,
    submit_chord_pressed,
};
pub use transport::{ChatTransport, ProxyClient};
pub use wire::WireMessage;

/// the transport every session sends through. defaults to a `ProxyClient`
/// built from `ClientConfig` (or the environment) when the plugin builds.
#[derive(Resource, Clone)]
pub struct Transport(pub Arc<dyn ChatTransport>);

impl Transport {
    pub fn new(transport: impl ChatTransport + 'static) -> Self {
        Self(Arc::new(transport))
    }
}

/// system ordering so uis can run after we apply replies
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum ChatSet {
    /// replies/failures are applied to sessions and emitted here (in `Update`)
    Drain,
}

/// one-shot marker: the session entity has a history waiting to be sent.
#[derive(Component, Clone, Debug)]
pub struct ProxyRequest {
    pub messages: Vec<WireMessage>,
}

/// keyboard text goes to sessions carrying this marker.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct InputFocus;

/// put this next to a `ScrollPosition` to keep the newest message in view.
#[derive(Component, Clone, Copy, Debug)]
pub struct FollowTranscript {
    pub session: Entity,
    seen: usize,
}

impl FollowTranscript {
    pub fn new(session: Entity) -> Self {
        Self { session, seen: 0 }
    }
}

/// submits the session's input line. returns false (and does nothing) when
/// the line is blank or an exchange is already in flight.
pub fn submit_input(commands: &mut Commands, target: Entity, session: &mut ChatSession) -> bool {
    match session.submit() {
        Some(messages) => {
            info!(target: "persona_chat", "submit_input -> entity={:?} history={}", target, messages.len());
            commands.entity(target).insert(ProxyRequest { messages });
            true
        }
        None => {
            debug!(target: "persona_chat", "submit_input ignored (busy={})", session.is_busy());
            false
        }
    }
}

#[derive(Event, Debug)]
pub struct ChatStarted {
    pub entity: Entity,
}
#[derive(Event, Debug)]
pub struct ChatReplyEvt {
    pub entity: Entity,
    pub text: String,
}
#[derive(Event, Debug)]
pub struct ChatFailedEvt {
    pub entity: Entity,
    pub error: String,
    /// what to show the user.
    pub notice: Notice,
}

#[derive(Debug)]
enum InboxMsg {
    Reply { entity: Entity, text: String },
    Failed { entity: Entity, error: String },
}

/// cross-thread inbox; io tasks send, main thread drains.
#[derive(Resource, Clone)]
struct ProxyInbox {
    tx: Sender<InboxMsg>,
    rx: Receiver<InboxMsg>,
}

impl Default for ProxyInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(256);
        Self { tx, rx }
    }
}

fn push_inbox(tx: &Sender<InboxMsg>, msg: InboxMsg) {
    if let Err(err) = tx.send(msg) {
        warn!(target: "persona_chat", "inbox closed, dropping {:?}", err.into_inner());
    }
}

/// bevy plugin: wires systems, events, resources.
/// insert a `Transport` (or a `ClientConfig`) before adding the plugin to
/// override the environment-derived proxy client.
pub struct PersonaChatPlugin;

impl Plugin for PersonaChatPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "persona_chat", "PersonaChatPlugin: build()");
        app.init_resource::<ProxyInbox>()
            .init_resource::<ButtonInput<KeyCode>>()
            .add_event::<KeyboardInput>()
            .add_event::<ChatStarted>()
            .add_event::<ChatReplyEvt>()
            .add_event::<ChatFailedEvt>()
            .configure_sets(Update, ChatSet::Drain)
            .add_systems(
                Update,
                (capture_keyboard_input, spawn_proxy_requests)
                    .chain()
                    .before(ChatSet::Drain),
            )
            .add_systems(Update, drain_proxy_inbox.in_set(ChatSet::Drain))
            .add_systems(
                Update,
                (tick_pending_phrases, follow_transcript).after(ChatSet::Drain),
            );

        if app.world().get_resource::<Transport>().is_none() {
            let config = app
                .world()
                .get_resource::<ClientConfig>()
                .cloned()
                .unwrap_or_else(ClientConfig::from_env);
            let client = ProxyClient::new(&config);
            info!(
                target: "persona_chat",
                "using proxy at {} (anon_key_present={})",
                client.url(), !config.anon_key.is_empty()
            );
            app.insert_resource(Transport::new(client));
        }
    }
}

/// typed text, backspace and the ctrl/cmd+enter chord for focused sessions.
fn capture_keyboard_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    mut q: Query<(Entity, &mut ChatSession), With<InputFocus>>,
) {
    let mut typed = String::new();
    for ev in ev_kbd.read() {
        if ev.state.is_pressed()
            && let Some(txt) = &ev.text {
                typed.extend(txt.chars().filter(|c| !c.is_control()));
        }
    }
    let backspace = keys.just_pressed(KeyCode::Backspace);
    let chord = submit_chord_pressed(&keys);
    if typed.is_empty() && !backspace && !chord {
        return;
    }

    for (e, mut session) in &mut q {
        if !typed.is_empty() {
            session.push_input(&typed);
        }
        if backspace {
            session.pop_input();
        }
        if chord {
            submit_input(&mut commands, e, &mut session);
        }
    }
}

/// hands pending requests to the io pool.
fn spawn_proxy_requests(
    mut commands: Commands,
    transport: Res<Transport>,
    inbox: Res<ProxyInbox>,
    q: Query<(Entity, &ProxyRequest)>,
    mut ev_start: EventWriter<ChatStarted>,
) {
    for (e, req) in &q {
        let transport = transport.0.clone();
        let inbox_tx = inbox.tx.clone();
        let messages = req.messages.clone();

        let user_msgs = messages.iter().filter(|m| m.role == "user").count();
        info!(target: "persona_chat",
            "spawn_proxy_requests: entity={:?} msgs={} (user={})",
            e, messages.len(), user_msgs
        );

        // one-shot marker removal
        commands.entity(e).remove::<ProxyRequest>();
        ev_start.write(ChatStarted { entity: e });

        IoTaskPool::get()
            .spawn(async move {
                match transport.send(messages).await {
                    Ok(text) => {
                        info!(target: "persona_chat", "reply received: len={}", text.len());
                        push_inbox(&inbox_tx, InboxMsg::Reply { entity: e, text });
                    }
                    Err(err) => {
                        error!(target: "persona_chat", "proxy exchange failed: {}", err);
                        push_inbox(&inbox_tx, InboxMsg::Failed { entity: e, error: err.to_string() });
                    }
                }
            })
            .detach();
    }
}

/// applies finished exchanges to their sessions and emits events.
fn drain_proxy_inbox(
    inbox: Res<ProxyInbox>,
    mut sessions: Query<&mut ChatSession>,
    mut ev_reply: EventWriter<ChatReplyEvt>,
    mut ev_failed: EventWriter<ChatFailedEvt>,
) {
    const MAX_PER_FRAME: usize = 64;
    for _ in 0..MAX_PER_FRAME {
        let msg = match inbox.rx.try_recv() {
            Ok(m) => m,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        };
        match msg {
            InboxMsg::Reply { entity, text } => {
                let Ok(mut session) = sessions.get_mut(entity) else {
                    warn!(target: "persona_chat", "reply for missing session {:?}", entity);
                    continue;
                };
                session.complete(text.clone());
                ev_reply.write(ChatReplyEvt { entity, text });
            }
            InboxMsg::Failed { entity, error } => {
                let Ok(mut session) = sessions.get_mut(entity) else {
                    warn!(target: "persona_chat", "failure for missing session {:?}", entity);
                    continue;
                };
                session.fail();
                ev_failed.write(ChatFailedEvt { entity, error, notice: CONNECTIVITY_NOTICE });
            }
        }
    }
}

fn tick_pending_phrases(time: Res<Time>, mut q: Query<&mut ChatSession>) {
    for mut session in &mut q {
        // only touch busy sessions so idle ones don't look changed
        if session.is_busy() {
            session.tick_pending(time.delta());
        }
    }
}

/// pushes the transcript to its max scroll offset after every conversation
/// change; ui layout clamps the offset to the real content height.
fn follow_transcript(
    sessions: Query<&ChatSession>,
    mut views: Query<(&mut FollowTranscript, &mut ScrollPosition)>,
) {
    for (mut follow, mut scroll) in &mut views {
        let Ok(session) = sessions.get(follow.session) else {
            continue;
        };
        let len = session.conversation().len();
        if len != follow.seen {
            follow.seen = len;
            scroll.offset_y = f32::MAX;
        }
    }
}
