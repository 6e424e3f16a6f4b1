//! persona chat front-end on top of bevy_persona_chat.
//! - scrolling transcript that follows the newest message.
//! - input line: type, then ctrl/cmd+enter or click send.
//! - rotating "waiting" line while the proxy answers.
//! - toast when the proxy can't be reached.
//!
//! env:
//!   PERSONA_PROXY_URL        (default http://127.0.0.1:8787; run `cargo run --bin persona-proxy`)
//!   PERSONA_PUBLISHABLE_KEY  (anon key sent as bearer token)

use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy::ui::ScrollPosition;
use bevy_persona_chat::{
    ChatFailedEvt, ChatSession, ChatSet, ClientConfig, FollowTranscript, InputFocus,
    PersonaChatPlugin, Role, submit_input,
};

const TOAST_SECS: f32 = 4.0;
const LINE_HEIGHT: f32 = 21.0;

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct Transcript {
    session: Entity,
    rendered: usize,
}
#[derive(Component)]
struct InputText;
#[derive(Component)]
struct PendingText;
#[derive(Component)]
struct SendButton;
#[derive(Component)]
struct SendLabel;
#[derive(Component)]
struct Toast(Timer);
#[derive(Component)]
struct ToastText;

#[derive(Resource, Clone, Copy)]
struct ActiveSession(Entity);

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(24, 16, 28)))
        .insert_resource(ClientConfig::from_env())
        .add_plugins(DefaultPlugins)
        .add_plugins(PersonaChatPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (btn_send, scroll_with_wheel))
        .add_systems(
            Update,
            (render_transcript, refresh_input, refresh_pending, on_failed, expire_toast)
                .after(ChatSet::Drain),
        )
        .run();
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands) {
    commands.spawn(Camera2d);

    let session = commands.spawn((ChatSession::new(), InputFocus)).id();
    commands.insert_resource(ActiveSession(session));

    let title = TextFont { font_size: 32.0, ..default() };
    let body = TextFont { font_size: 16.0, ..default() };
    let small = TextFont { font_size: 12.0, ..default() };

    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            flex_direction: FlexDirection::Column,
            align_items: AlignItems::Center,
            row_gap: Val::Px(10.0),
            padding: UiRect::all(Val::Px(16.0)),
            ..default()
        })
        .with_children(|p| {
            p.spawn((Text::new("Persona Chatbot"), title, TextColor(Color::WHITE)));
            p.spawn((
                Text::new("Talk to an upbeat, theatrical assistant. Your API key stays on the proxy."),
                small.clone(),
                TextColor(Color::srgb(0.7, 0.7, 0.75)),
            ));

            // --- transcript ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    max_width: Val::Px(760.0),
                    flex_grow: 1.0,
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(12.0),
                    padding: UiRect::all(Val::Px(12.0)),
                    overflow: Overflow::scroll_y(),
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.08, 0.12)),
                ScrollPosition::default(),
                FollowTranscript::new(session),
                Transcript { session, rendered: 0 },
            ));

            p.spawn((
                Text::new(""),
                small.clone(),
                TextColor(Color::srgb(0.95, 0.8, 0.4)),
                PendingText,
            ));

            // --- input row: [text ....] [send] ---
            p.spawn(Node {
                width: Val::Percent(100.0),
                max_width: Val::Px(760.0),
                column_gap: Val::Px(8.0),
                align_items: AlignItems::Center,
                ..default()
            })
            .with_children(|row| {
                row.spawn((
                    Node {
                        flex_grow: 1.0,
                        padding: UiRect::all(Val::Px(8.0)),
                        ..default()
                    },
                    BackgroundColor(Color::srgb(0.16, 0.14, 0.18)),
                ))
                .with_children(|field| {
                    field.spawn((Text::new(""), body.clone(), TextColor(Color::WHITE), InputText));
                });
                row.spawn((
                    Button,
                    Node {
                        width: Val::Px(110.0),
                        height: Val::Px(34.0),
                        align_items: AlignItems::Center,
                        justify_content: JustifyContent::Center,
                        ..default()
                    },
                    BackgroundColor(Color::srgb(0.85, 0.3, 0.5)),
                    SendButton,
                ))
                .with_children(|b| {
                    b.spawn((Text::new("Send"), body.clone(), TextColor(Color::WHITE), SendLabel));
                });
            });

            p.spawn((
                Text::new("Tip: this persona keeps the theatrics but won't reproduce copyrighted lyrics."),
                small,
                TextColor(Color::srgb(0.6, 0.6, 0.65)),
            ));
        });

    // toast, hidden until a failure
    commands
        .spawn((
            Node {
                position_type: PositionType::Absolute,
                right: Val::Px(16.0),
                bottom: Val::Px(16.0),
                max_width: Val::Px(360.0),
                flex_direction: FlexDirection::Column,
                padding: UiRect::all(Val::Px(12.0)),
                row_gap: Val::Px(4.0),
                ..default()
            },
            BackgroundColor(Color::srgb(0.25, 0.08, 0.12)),
            Visibility::Hidden,
            Toast(Timer::from_seconds(TOAST_SECS, TimerMode::Once)),
        ))
        .with_children(|t| {
            t.spawn((Text::new(""), body, TextColor(Color::WHITE), ToastText));
        });
}

// ---------------------- input & buttons ----------------------

fn btn_send(
    mut commands: Commands,
    active: Res<ActiveSession>,
    mut sessions: Query<&mut ChatSession>,
    mut q: Query<(&Interaction, &mut BackgroundColor), (Changed<Interaction>, With<SendButton>)>,
) {
    for (i, mut bg) in &mut q {
        let Ok(mut session) = sessions.get_mut(active.0) else { continue };
        if !session.can_send() {
            bg.0 = Color::srgb(0.35, 0.3, 0.35);
            continue;
        }
        match *i {
            Interaction::Pressed => {
                info!(target: "chat_example", "send clicked");
                submit_input(&mut commands, active.0, &mut session);
            }
            Interaction::Hovered => bg.0 = Color::srgb(0.95, 0.4, 0.6),
            Interaction::None => bg.0 = Color::srgb(0.85, 0.3, 0.5),
        }
    }
}

fn scroll_with_wheel(
    mut ev: EventReader<MouseWheel>,
    mut q: Query<&mut ScrollPosition, With<Transcript>>,
) {
    for wheel in ev.read() {
        let dy = match wheel.unit {
            MouseScrollUnit::Line => wheel.y * LINE_HEIGHT,
            MouseScrollUnit::Pixel => wheel.y,
        };
        for mut pos in &mut q {
            pos.offset_y = (pos.offset_y - dy).max(0.0);
        }
    }
}

// ---------------------- text refresh ----------------------

/// appends a bubble for every message not yet on screen (the list only grows).
fn render_transcript(
    mut commands: Commands,
    sessions: Query<&ChatSession, Changed<ChatSession>>,
    mut q: Query<(Entity, &mut Transcript)>,
) {
    for (node, mut transcript) in &mut q {
        let Ok(session) = sessions.get(transcript.session) else { continue };
        let fresh: Vec<_> = session.conversation().iter().skip(transcript.rendered).cloned().collect();
        if fresh.is_empty() {
            continue;
        }
        transcript.rendered += fresh.len();
        commands.entity(node).with_children(|c| {
            for m in fresh {
                let (align, bg) = match m.role() {
                    Role::User => (AlignSelf::FlexEnd, Color::srgb(0.85, 0.3, 0.5)),
                    Role::Assistant => (AlignSelf::FlexStart, Color::srgb(0.22, 0.2, 0.26)),
                };
                c.spawn((
                    Node {
                        max_width: Val::Percent(80.0),
                        align_self: align,
                        padding: UiRect::axes(Val::Px(12.0), Val::Px(8.0)),
                        ..default()
                    },
                    BackgroundColor(bg),
                ))
                .with_children(|b| {
                    b.spawn((
                        Text::new(m.content().to_string()),
                        TextFont { font_size: 16.0, ..default() },
                        TextColor(Color::WHITE),
                    ));
                });
            }
        });
    }
}

fn refresh_input(
    active: Res<ActiveSession>,
    sessions: Query<&ChatSession, Changed<ChatSession>>,
    mut q_input: Query<&mut Text, (With<InputText>, Without<SendLabel>)>,
    mut q_label: Query<&mut Text, (With<SendLabel>, Without<InputText>)>,
    mut q_btn: Query<&mut BackgroundColor, With<SendButton>>,
) {
    let Ok(session) = sessions.get(active.0) else { return };
    if let Ok(mut t) = q_input.single_mut() {
        t.0 = if session.input().is_empty() && !session.is_busy() {
            "Ask away, press ctrl/cmd+enter to send".to_string()
        } else {
            format!("{} |", session.input())
        };
    }
    if let Ok(mut t) = q_label.single_mut() {
        t.0 = if session.is_busy() { "Sending..." } else { "Send" }.to_string();
    }
    if let Ok(mut bg) = q_btn.single_mut() {
        bg.0 = if session.can_send() {
            Color::srgb(0.85, 0.3, 0.5)
        } else {
            Color::srgb(0.35, 0.3, 0.35)
        };
    }
}

fn refresh_pending(
    active: Res<ActiveSession>,
    sessions: Query<&ChatSession, Changed<ChatSession>>,
    mut q: Query<&mut Text, With<PendingText>>,
) {
    let Ok(session) = sessions.get(active.0) else { return };
    if let Ok(mut t) = q.single_mut() {
        t.0 = session.pending_phrase().unwrap_or_default().to_string();
    }
}

// ---------------------- chat events ----------------------

fn on_failed(
    mut ev: EventReader<ChatFailedEvt>,
    mut q_toast: Query<(&mut Visibility, &mut Toast)>,
    mut q_text: Query<&mut Text, With<ToastText>>,
) {
    for ChatFailedEvt { entity, error, notice } in ev.read() {
        warn!(target: "chat_example", "exchange failed (entity={:?}): {}", entity, error);
        for (mut vis, mut toast) in &mut q_toast {
            *vis = Visibility::Visible;
            toast.0.reset();
        }
        for mut t in &mut q_text {
            t.0 = format!("{}\n{}", notice.title, notice.description);
        }
    }
}

fn expire_toast(time: Res<Time>, mut q: Query<(&mut Visibility, &mut Toast)>) {
    for (mut vis, mut toast) in &mut q {
        if *vis == Visibility::Hidden {
            continue;
        }
        if toast.0.tick(time.delta()).finished() {
            *vis = Visibility::Hidden;
        }
    }
}
