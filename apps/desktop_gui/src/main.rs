use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

mod config;
mod view;

use arboard::Clipboard;
use client_core::{
    rest::RestDataService, validate_display_name, ChatClient, ClientEvent, JoinSessionError,
    SendMessageError,
};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use eframe::egui;
use shared::{
    domain::{ChatSession, SessionId},
    protocol::MessageRecord,
};
use storage::ProfileStore;
use view::{build_transcript, chat_header, EntryKind, TranscriptEntry};

const TOAST_LIFETIME: Duration = Duration::from_millis(2500);

enum BackendCommand {
    SaveIdentity { raw_name: String },
    Logout,
    CreateChat,
    JoinChat { creator: String, key: String },
    OpenChat { session: ChatSession },
    OpenCachedChat,
    SendMessage { content: String },
    RefreshTranscript,
    LeaveChat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinFailureKind {
    Validation,
    NotFound,
    Backend,
}

enum UiEvent {
    ProfileLoaded {
        identity: Option<String>,
        has_cached_session: bool,
    },
    IdentitySaved {
        name: String,
    },
    IdentityRejected {
        reason: String,
    },
    IdentityRequired,
    ChatCreated {
        session: ChatSession,
    },
    ChatOpened {
        session: ChatSession,
    },
    JoinFailed {
        kind: JoinFailureKind,
        message: String,
    },
    TranscriptLoaded {
        session_id: SessionId,
        messages: Vec<MessageRecord>,
    },
    TranscriptFailed {
        session_id: SessionId,
        reason: String,
    },
    MessageSent,
    SendRejected {
        message: String,
    },
    LoggedOut,
    LeftChat {
        has_cached_session: bool,
    },
    BackendFailed {
        action: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Welcome,
    Account,
    Main,
    Created,
    Join,
    Chat,
}

enum TranscriptState {
    Loading,
    Failed(String),
    Loaded(Vec<TranscriptEntry>),
}

struct Toast {
    message: String,
    expires_at: Instant,
}

struct PairchatApp {
    cmd_tx: Sender<BackendCommand>,
    ui_rx: Receiver<UiEvent>,
    screen: Screen,
    identity: Option<String>,
    account_input: String,
    join_creator_input: String,
    join_key_input: String,
    compose_input: String,
    session: Option<ChatSession>,
    has_cached_session: bool,
    transcript: TranscriptState,
    focus_compose: bool,
    toast: Option<Toast>,
}

impl PairchatApp {
    fn new(cmd_tx: Sender<BackendCommand>, ui_rx: Receiver<UiEvent>) -> Self {
        Self {
            cmd_tx,
            ui_rx,
            screen: Screen::Welcome,
            identity: None,
            account_input: String::new(),
            join_creator_input: String::new(),
            join_key_input: String::new(),
            compose_input: String::new(),
            session: None,
            has_cached_session: false,
            transcript: TranscriptState::Loading,
            focus_compose: false,
            toast: None,
        }
    }

    fn show_screen(&mut self, screen: Screen) {
        if screen == Screen::Chat {
            self.focus_compose = true;
        }
        self.screen = screen;
    }

    fn show_toast(&mut self, message: impl Into<String>) {
        self.toast = Some(Toast {
            message: message.into(),
            expires_at: Instant::now() + TOAST_LIFETIME,
        });
    }

    fn queue_command(&mut self, command: BackendCommand) {
        match self.cmd_tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.show_toast("Still working, try again in a moment");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.show_toast("Backend worker is not running");
            }
        }
    }

    fn active_session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    fn process_ui_events(&mut self) {
        while let Ok(event) = self.ui_rx.try_recv() {
            match event {
                UiEvent::ProfileLoaded {
                    identity,
                    has_cached_session,
                } => {
                    self.account_input = identity.clone().unwrap_or_default();
                    self.has_cached_session = has_cached_session;
                    let target = if identity.is_some() {
                        Screen::Main
                    } else {
                        Screen::Welcome
                    };
                    self.identity = identity;
                    self.show_screen(target);
                }
                UiEvent::IdentitySaved { name } => {
                    self.account_input = name.clone();
                    self.identity = Some(name);
                    self.show_screen(Screen::Main);
                }
                UiEvent::IdentityRejected { reason } => self.show_toast(reason),
                UiEvent::IdentityRequired => {
                    self.show_toast("Choose a display name first");
                    self.show_screen(Screen::Account);
                }
                UiEvent::ChatCreated { session } => {
                    self.session = Some(session);
                    self.has_cached_session = true;
                    self.show_screen(Screen::Created);
                }
                UiEvent::ChatOpened { session } => {
                    self.session = Some(session);
                    self.has_cached_session = true;
                    self.transcript = TranscriptState::Loading;
                    self.join_creator_input.clear();
                    self.join_key_input.clear();
                    self.show_screen(Screen::Chat);
                }
                UiEvent::JoinFailed { kind, message } => {
                    // NotFound gets its own wording, distinct from transport
                    // failures; both keep the join screen active for a retry.
                    if kind == JoinFailureKind::Backend {
                        tracing::warn!("join failed: {message}");
                    }
                    self.show_toast(message);
                }
                UiEvent::TranscriptLoaded {
                    session_id,
                    messages,
                } => {
                    if self.active_session_id() != Some(session_id) {
                        continue;
                    }
                    let my_account = self
                        .session
                        .as_ref()
                        .map(|session| session.my_account.clone())
                        .unwrap_or_default();
                    self.transcript =
                        TranscriptState::Loaded(build_transcript(&messages, &my_account));
                }
                UiEvent::TranscriptFailed { session_id, reason } => {
                    if self.active_session_id() != Some(session_id) {
                        continue;
                    }
                    self.transcript = TranscriptState::Failed(reason);
                }
                UiEvent::MessageSent => {
                    self.compose_input.clear();
                    self.focus_compose = true;
                }
                UiEvent::SendRejected { message } => {
                    // Compose input is deliberately left untouched for retry.
                    self.show_toast(message);
                }
                UiEvent::LoggedOut => {
                    self.identity = None;
                    self.session = None;
                    self.has_cached_session = false;
                    self.account_input.clear();
                    self.join_creator_input.clear();
                    self.join_key_input.clear();
                    self.compose_input.clear();
                    self.show_screen(Screen::Welcome);
                }
                UiEvent::LeftChat { has_cached_session } => {
                    self.has_cached_session = has_cached_session;
                    self.show_screen(Screen::Main);
                }
                UiEvent::BackendFailed { action, message } => {
                    tracing::warn!("{action} failed: {message}");
                    self.show_toast(format!("{action} failed: {message}"));
                }
            }
        }
    }

    fn copy_to_clipboard(&mut self, label: &str, text: &str) {
        let outcome =
            Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.to_string()));
        match outcome {
            Ok(()) => self.show_toast(format!("{label} copied")),
            Err(err) => {
                tracing::warn!("clipboard copy failed: {err}");
                self.show_toast("Copy failed");
            }
        }
    }

    fn back_button(&mut self, ui: &mut egui::Ui, target: Screen) {
        if ui.button("< Back").clicked() {
            self.show_screen(target);
        }
    }

    fn try_send(&mut self) {
        if self.compose_input.trim().is_empty() {
            self.show_toast("Type a message first");
            return;
        }
        self.queue_command(BackendCommand::SendMessage {
            content: self.compose_input.clone(),
        });
    }

    fn show_welcome_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(80.0);
            ui.vertical_centered(|ui| {
                ui.heading("Pairchat");
                ui.add_space(8.0);
                ui.weak("A private chat for two, joined with a short shared key.");
                ui.add_space(24.0);
                if ui.button("Get started").clicked() {
                    self.show_screen(Screen::Account);
                }
            });
        });
    }

    fn show_account_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            self.back_button(ui, Screen::Welcome);
            ui.add_space(24.0);
            ui.vertical_centered(|ui| {
                ui.heading("Pick a name");
                ui.add_space(4.0);
                ui.weak("This is how your partner will see you.");
                ui.add_space(12.0);

                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.account_input)
                        .hint_text("alice")
                        .desired_width(220.0),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                ui.add_space(12.0);
                if ui.button("Continue").clicked() || submitted {
                    self.queue_command(BackendCommand::SaveIdentity {
                        raw_name: self.account_input.clone(),
                    });
                }
            });
        });
    }

    fn show_main_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label("Signed in as");
                ui.strong(self.identity.clone().unwrap_or_default());
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Log out").clicked() {
                        self.queue_command(BackendCommand::Logout);
                    }
                });
            });
            ui.separator();
            ui.add_space(24.0);

            ui.vertical_centered(|ui| {
                if ui.button("Create a chat").clicked() {
                    self.queue_command(BackendCommand::CreateChat);
                }
                ui.add_space(8.0);
                if ui.button("Join a chat").clicked() {
                    self.show_screen(Screen::Join);
                }
                if self.has_cached_session {
                    ui.add_space(8.0);
                    if ui.button("Continue previous chat").clicked() {
                        self.queue_command(BackendCommand::OpenCachedChat);
                    }
                }
            });
        });
    }

    fn show_created_screen(&mut self, ctx: &egui::Context) {
        let Some(session) = self.session.clone() else {
            self.show_screen(Screen::Main);
            return;
        };

        egui::CentralPanel::default().show(ctx, |ui| {
            self.back_button(ui, Screen::Main);
            ui.add_space(16.0);
            ui.vertical_centered(|ui| {
                ui.heading("Chat created");
                ui.add_space(4.0);
                ui.weak("Share your name and this key with your partner.");
                ui.add_space(16.0);

                ui.horizontal(|ui| {
                    ui.label("Name:");
                    ui.monospace(&session.creator_account);
                    if ui.small_button("Copy").clicked() {
                        self.copy_to_clipboard("Name", &session.creator_account);
                    }
                });
                ui.horizontal(|ui| {
                    ui.label("Key:");
                    ui.monospace(egui::RichText::new(&session.key).size(20.0).strong());
                    if ui.small_button("Copy").clicked() {
                        self.copy_to_clipboard("Key", &session.key);
                    }
                });

                ui.add_space(20.0);
                if ui.button("Open chat").clicked() {
                    self.queue_command(BackendCommand::OpenChat { session });
                }
            });
        });
    }

    fn show_join_screen(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            self.back_button(ui, Screen::Main);
            ui.add_space(16.0);
            ui.vertical_centered(|ui| {
                ui.heading("Join a chat");
                ui.add_space(4.0);
                ui.weak("Enter the creator's name and the key you were given.");
                ui.add_space(12.0);

                ui.add(
                    egui::TextEdit::singleline(&mut self.join_creator_input)
                        .hint_text("Creator's name")
                        .desired_width(220.0),
                );
                ui.add_space(6.0);
                ui.add(
                    egui::TextEdit::singleline(&mut self.join_key_input)
                        .hint_text("Key, e.g. ABCD2345")
                        .desired_width(220.0),
                );

                ui.add_space(12.0);
                if ui.button("Join").clicked() {
                    if self.join_creator_input.trim().is_empty()
                        || self.join_key_input.trim().is_empty()
                    {
                        self.show_toast("Fill in both fields");
                    } else {
                        self.queue_command(BackendCommand::JoinChat {
                            creator: self.join_creator_input.clone(),
                            key: self.join_key_input.clone(),
                        });
                    }
                }
            });
        });
    }

    fn show_chat_screen(&mut self, ctx: &egui::Context) {
        let Some(session) = self.session.clone() else {
            self.show_screen(Screen::Main);
            return;
        };
        let (title, waiting_hint) = chat_header(&session);

        egui::TopBottomPanel::top("chat_header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("< Back").clicked() {
                    self.queue_command(BackendCommand::LeaveChat);
                }
                ui.heading(title);
                if let Some(hint) = waiting_hint {
                    ui.weak(hint);
                }
            });
        });

        egui::TopBottomPanel::bottom("chat_composer").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.compose_input)
                        .hint_text("Type a message")
                        .desired_width(ui.available_width() - 60.0),
                );
                if self.focus_compose {
                    response.request_focus();
                    self.focus_compose = false;
                }
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("Send").clicked() || submitted {
                    self.try_send();
                    response.request_focus();
                }
            });
            ui.add_space(4.0);
        });

        let mut retry_requested = false;
        egui::CentralPanel::default().show(ctx, |ui| match &self.transcript {
            TranscriptState::Loading => {
                ui.centered_and_justified(|ui| {
                    ui.weak("Loading messages");
                });
            }
            TranscriptState::Failed(reason) => {
                ui.vertical_centered(|ui| {
                    ui.add_space(24.0);
                    ui.colored_label(egui::Color32::LIGHT_RED, "Failed to load messages");
                    ui.weak(reason.clone());
                    ui.add_space(8.0);
                    if ui.button("Retry").clicked() {
                        retry_requested = true;
                    }
                });
            }
            TranscriptState::Loaded(entries) if entries.is_empty() => {
                ui.centered_and_justified(|ui| {
                    ui.weak("No messages yet. Write the first one!");
                });
            }
            TranscriptState::Loaded(entries) => {
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .stick_to_bottom(true)
                    .show(ui, |ui| {
                        for entry in entries {
                            render_transcript_entry(ui, entry);
                        }
                    });
            }
        });
        if retry_requested {
            self.queue_command(BackendCommand::RefreshTranscript);
        }
    }

    fn show_toast_panel(&mut self, ctx: &egui::Context) {
        let expired = self
            .toast
            .as_ref()
            .is_some_and(|toast| Instant::now() >= toast.expires_at);
        if expired {
            self.toast = None;
        }
        if let Some(toast) = &self.toast {
            let message = toast.message.clone();
            egui::TopBottomPanel::bottom("toast_panel").show(ctx, |ui| {
                ui.label(egui::RichText::new(message).color(egui::Color32::LIGHT_YELLOW));
            });
        }
    }
}

fn render_transcript_entry(ui: &mut egui::Ui, entry: &TranscriptEntry) {
    let align = match entry.kind {
        EntryKind::Sent => egui::Align::Max,
        EntryKind::Received => egui::Align::Min,
    };
    ui.with_layout(egui::Layout::top_down(align), |ui| {
        ui.group(|ui| {
            ui.set_max_width(ui.available_width() * 0.8);
            // Plain label: content is untrusted and must never be
            // interpreted as markup.
            ui.label(&entry.content);
            let meta = match entry.kind {
                EntryKind::Sent => entry.time_label.clone(),
                EntryKind::Received => format!("{} · {}", entry.time_label, entry.sender),
            };
            ui.label(egui::RichText::new(meta).small().weak());
        });
    });
    ui.add_space(6.0);
}

impl eframe::App for PairchatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_ui_events();

        // Panels claim space outside-in, so the toast strip goes up before
        // the screen's own panels and the central panel comes last.
        self.show_toast_panel(ctx);

        match self.screen {
            Screen::Welcome => self.show_welcome_screen(ctx),
            Screen::Account => self.show_account_screen(ctx),
            Screen::Main => self.show_main_screen(ctx),
            Screen::Created => self.show_created_screen(ctx),
            Screen::Join => self.show_join_screen(ctx),
            Screen::Chat => self.show_chat_screen(ctx),
        }

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

fn resolve_profile_data_dir() -> Result<PathBuf, String> {
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return Ok(PathBuf::from(home).join(".pairchat"));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            if !userprofile.trim().is_empty() {
                return Ok(PathBuf::from(userprofile).join(".pairchat"));
            }
        }
        if let Ok(local_app_data) = std::env::var("LOCALAPPDATA") {
            if !local_app_data.trim().is_empty() {
                return Ok(PathBuf::from(local_app_data).join("pairchat"));
            }
        }
    }

    Err("no usable per-user directory; set HOME and relaunch".to_string())
}

fn spawn_backend_thread(
    settings: config::Settings,
    cmd_rx: Receiver<BackendCommand>,
    ui_tx: Sender<UiEvent>,
) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::BackendFailed {
                    action: "backend startup",
                    message: format!("failed to build runtime: {err}"),
                });
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let profile = match init_profile_store().await {
                Ok(profile) => profile,
                Err(message) => {
                    tracing::error!("profile store unavailable: {message}");
                    let _ = ui_tx.try_send(UiEvent::BackendFailed {
                        action: "backend startup",
                        message,
                    });
                    return;
                }
            };

            let data = Arc::new(RestDataService::new(
                settings.backend_url.clone(),
                settings.backend_api_key.clone(),
            ));
            let client = ChatClient::new(data);

            let mut client_events = client.subscribe_events();
            let event_ui_tx = ui_tx.clone();
            tokio::spawn(async move {
                loop {
                    match client_events.recv().await {
                        Ok(ClientEvent::TranscriptUpdated {
                            session_id,
                            messages,
                        }) => {
                            let _ = event_ui_tx.try_send(UiEvent::TranscriptLoaded {
                                session_id,
                                messages,
                            });
                        }
                        Ok(ClientEvent::TranscriptFetchFailed { session_id, reason }) => {
                            let _ = event_ui_tx
                                .try_send(UiEvent::TranscriptFailed { session_id, reason });
                        }
                        Ok(ClientEvent::SessionOpened(_)) | Ok(ClientEvent::SessionClosed) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            });

            let mut identity = match profile.load_identity().await {
                Ok(identity) => identity,
                Err(err) => {
                    tracing::warn!("failed to load cached identity: {err:#}");
                    None
                }
            };
            let cached_session = match profile.load_session().await {
                Ok(session) => session,
                Err(err) => {
                    tracing::warn!("failed to load cached session: {err:#}");
                    None
                }
            };
            let _ = ui_tx.try_send(UiEvent::ProfileLoaded {
                identity: identity.clone(),
                has_cached_session: cached_session.is_some(),
            });

            while let Ok(command) = cmd_rx.recv() {
                match command {
                    BackendCommand::SaveIdentity { raw_name } => {
                        match validate_display_name(&raw_name) {
                            Ok(name) => match profile.store_identity(&name).await {
                                Ok(()) => {
                                    identity = Some(name.clone());
                                    let _ = ui_tx.try_send(UiEvent::IdentitySaved { name });
                                }
                                Err(err) => {
                                    let _ = ui_tx.try_send(UiEvent::BackendFailed {
                                        action: "saving your name",
                                        message: format!("{err:#}"),
                                    });
                                }
                            },
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::IdentityRejected {
                                    reason: err.to_string(),
                                });
                            }
                        }
                    }
                    BackendCommand::Logout => {
                        client.close_session().await;
                        if let Err(err) = profile.clear_profile().await {
                            let _ = ui_tx.try_send(UiEvent::BackendFailed {
                                action: "logging out",
                                message: format!("{err:#}"),
                            });
                            continue;
                        }
                        identity = None;
                        let _ = ui_tx.try_send(UiEvent::LoggedOut);
                    }
                    BackendCommand::CreateChat => {
                        let Some(creator) = identity.clone() else {
                            let _ = ui_tx.try_send(UiEvent::IdentityRequired);
                            continue;
                        };
                        match client.create_session(&creator).await {
                            Ok(session) => {
                                if let Err(err) = profile.store_session(&session).await {
                                    tracing::warn!("failed to cache session: {err:#}");
                                }
                                let _ = ui_tx.try_send(UiEvent::ChatCreated { session });
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::BackendFailed {
                                    action: "creating the chat",
                                    message: err.to_string(),
                                });
                            }
                        }
                    }
                    BackendCommand::JoinChat { creator, key } => {
                        let Some(my_account) = identity.clone() else {
                            let _ = ui_tx.try_send(UiEvent::IdentityRequired);
                            continue;
                        };
                        match client.join_session(&creator, &key, &my_account).await {
                            Ok(session) => {
                                if let Err(err) = profile.store_session(&session).await {
                                    tracing::warn!("failed to cache session: {err:#}");
                                }
                                open_chat(&client, &ui_tx, session).await;
                            }
                            Err(err @ JoinSessionError::MissingField) => {
                                let _ = ui_tx.try_send(UiEvent::JoinFailed {
                                    kind: JoinFailureKind::Validation,
                                    message: err.to_string(),
                                });
                            }
                            Err(JoinSessionError::NotFound) => {
                                let _ = ui_tx.try_send(UiEvent::JoinFailed {
                                    kind: JoinFailureKind::NotFound,
                                    message: "Chat not found. Check the name and key.".to_string(),
                                });
                            }
                            Err(err @ JoinSessionError::Backend(_)) => {
                                let _ = ui_tx.try_send(UiEvent::JoinFailed {
                                    kind: JoinFailureKind::Backend,
                                    message: format!("Connection error: {err}"),
                                });
                            }
                        }
                    }
                    BackendCommand::OpenChat { session } => {
                        open_chat(&client, &ui_tx, session).await;
                    }
                    BackendCommand::OpenCachedChat => match profile.load_session().await {
                        Ok(Some(session)) => {
                            open_chat(&client, &ui_tx, session).await;
                        }
                        Ok(None) => {
                            let _ = ui_tx.try_send(UiEvent::LeftChat {
                                has_cached_session: false,
                            });
                        }
                        Err(err) => {
                            let _ = ui_tx.try_send(UiEvent::BackendFailed {
                                action: "restoring the chat",
                                message: format!("{err:#}"),
                            });
                        }
                    },
                    BackendCommand::SendMessage { content } => {
                        match client.send_message(&content).await {
                            Ok(()) => {
                                let _ = ui_tx.try_send(UiEvent::MessageSent);
                            }
                            Err(err @ SendMessageError::EmptyContent) => {
                                let _ = ui_tx.try_send(UiEvent::SendRejected {
                                    message: err.to_string(),
                                });
                            }
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::SendRejected {
                                    message: format!("Message not sent: {err}"),
                                });
                            }
                        }
                    }
                    BackendCommand::RefreshTranscript => {
                        if let Some(session) = client.active_session().await {
                            client.refresh_transcript(session.id).await;
                        }
                    }
                    BackendCommand::LeaveChat => {
                        client.close_session().await;
                        let has_cached_session =
                            matches!(profile.load_session().await, Ok(Some(_)));
                        let _ = ui_tx.try_send(UiEvent::LeftChat { has_cached_session });
                    }
                }
            }
        });
    });
}

async fn init_profile_store() -> Result<ProfileStore, String> {
    let data_dir = resolve_profile_data_dir()?;
    let database_url = ProfileStore::sqlite_url_for_data_dir(&data_dir);
    ProfileStore::new(&database_url)
        .await
        .map_err(|err| format!("could not open profile database {database_url}: {err:#}"))
}

async fn open_chat(
    client: &Arc<ChatClient>,
    ui_tx: &Sender<UiEvent>,
    session: ChatSession,
) {
    match client.open_session(session.clone()).await {
        Ok(()) => {
            let _ = ui_tx.try_send(UiEvent::ChatOpened { session });
        }
        Err(err) => {
            let _ = ui_tx.try_send(UiEvent::BackendFailed {
                action: "opening the chat",
                message: format!("{err:#}"),
            });
        }
    }
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = config::load_settings();
    if let Err(err) = config::validate_backend_url(&settings.backend_url) {
        tracing::error!("configuration error: {err:#}");
        std::process::exit(2);
    }

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    spawn_backend_thread(settings, cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Pairchat")
            .with_inner_size([420.0, 640.0])
            .with_min_inner_size([360.0, 520.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Pairchat",
        options,
        Box::new(|_cc| Ok(Box::new(PairchatApp::new(cmd_tx, ui_rx)))),
    )
}
