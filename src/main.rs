mod album_art;
mod backend;
mod config;
mod engine;
mod fullscreen;
mod locator;
mod logging;
mod mailbox;
mod metadata;
mod playlist;
mod recent;
mod session;
mod settings;
mod skin;

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{mpsc::Receiver, Arc},
    thread,
    time::Instant,
};

use anyhow::anyhow;
use eframe::egui::{self, ViewportBuilder, ViewportCommand};
use tracing::{error, info, warn};

use crate::{
    album_art::AlbumArtView,
    backend::RodioBackend,
    config::Config,
    engine::{EngineClient, EngineEvent, PlayState},
    fullscreen::{FullscreenState, PlaybackSnapshot, WindowBounds},
    locator::SUPPORTED_EXTENSIONS,
    mailbox::Mailbox,
    metadata::{load_media_info, MediaInfo},
    playlist::parse_playlist,
    recent::RecentFiles,
    session::{time_label, Display, Effect, Session},
    settings::SettingsStore,
    skin::Skin,
};

const APP_NAME: &str = "Viewed";

enum WorkerMessage {
    PlaylistFetched { url: String, tracks: Vec<String> },
    MediaInfoLoaded { request_id: u64, info: MediaInfo },
}

enum Dialog {
    Message(String),
    About,
}

enum MenuAction {
    OpenFile,
    OpenPlaylistUrl,
    OpenRecent(PathBuf),
    Exit,
    ToggleFullscreen,
    ReloadPlayer,
    About,
    Help,
}

struct App {
    config: Config,
    skin: Skin,
    engine: EngineClient,
    engine_rx: Receiver<EngineEvent>,
    worker_mailbox: Mailbox<WorkerMessage>,
    worker_rx: Receiver<WorkerMessage>,
    session: Session,
    album_art: AlbumArtView,
    volume: f32,
    fullscreen: FullscreenState,
    dialogs: VecDeque<Dialog>,
    url_prompt: Option<String>,
}

impl App {
    fn new(cc: &eframe::CreationContext<'_>, config: Config) -> anyhow::Result<Self> {
        let skin = Skin::from_config(&config.colors);
        cc.egui_ctx.set_visuals(egui::Visuals::dark());
        skin.apply_style(&cc.egui_ctx);

        let repaint_ctx = cc.egui_ctx.clone();
        let waker: mailbox::Waker = Arc::new(move || repaint_ctx.request_repaint());
        let (engine_mailbox, engine_rx) = Mailbox::channel(Arc::clone(&waker));
        let (worker_mailbox, worker_rx) = Mailbox::channel(waker);

        let volume = config.playback.initial_volume();
        let http_timeout = config.playback.http_timeout();
        let engine = EngineClient::spawn(
            move || RodioBackend::new(http_timeout),
            volume,
            config.playback.tick_interval(),
            engine_mailbox,
        )
        .map_err(|err| anyhow!("Failed to start playback engine thread: {err}"))?;

        let store = SettingsStore::user_default();
        if let Some(path) = store.path() {
            info!(path = %path.display(), "settings store");
        }

        Ok(Self {
            config,
            skin,
            engine,
            engine_rx,
            worker_mailbox,
            worker_rx,
            session: Session::new(RecentFiles::load(store)),
            album_art: AlbumArtView::default(),
            volume,
            fullscreen: FullscreenState::default(),
            dialogs: VecDeque::new(),
            url_prompt: None,
        })
    }

    fn show_message(&mut self, message: impl Into<String>) {
        self.dialogs.push_back(Dialog::Message(message.into()));
    }

    fn apply(&mut self, ctx: &egui::Context, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Open(request) => self.engine.open(request),
                Effect::LoadInfo { request_id, path } => self.request_media_info(request_id, path),
                Effect::Message(message) => self.show_message(message),
                Effect::ClearArtwork => self.album_art.clear(),
                Effect::RefreshArtwork => {
                    if let Display::Audio { info } = self.session.display() {
                        self.album_art.set_info(ctx, info);
                    }
                }
            }
        }
    }

    fn open_file_dialog(&mut self, ctx: &egui::Context) {
        let picked = rfd::FileDialog::new()
            .set_title("Open Audio/Video file")
            .add_filter("Audio/Video", &SUPPORTED_EXTENSIONS)
            .pick_file();
        if let Some(path) = picked {
            let effects = self.session.open_path(&path);
            self.apply(ctx, effects);
        }
    }

    fn fetch_playlist(&mut self, url: String) {
        let url = url.trim().to_string();
        if url.is_empty() {
            return;
        }
        info!(url = %url, "fetching playlist");
        let timeout = self.config.playback.http_timeout();
        let mailbox = self.worker_mailbox.clone();
        let spawned = thread::Builder::new()
            .name("playlist-fetch".into())
            .spawn(move || {
                let tracks = parse_playlist(&url, timeout);
                mailbox.post(WorkerMessage::PlaylistFetched { url, tracks });
            });
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn playlist fetch");
            self.show_message("No tracks found in playlist!");
        }
    }

    fn request_media_info(&mut self, request_id: u64, path: PathBuf) {
        let mailbox = self.worker_mailbox.clone();
        let spawned = thread::Builder::new()
            .name("metadata".into())
            .spawn(move || {
                let info = load_media_info(&path);
                mailbox.post(WorkerMessage::MediaInfoLoaded { request_id, info });
            });
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn metadata loader");
        }
    }

    fn drain_engine_events(&mut self, ctx: &egui::Context) {
        let events: Vec<_> = self.engine_rx.try_iter().collect();
        for event in events {
            let effects = self.session.handle_engine_event(event);
            self.apply(ctx, effects);
        }
    }

    fn drain_worker_messages(&mut self, ctx: &egui::Context) {
        let messages: Vec<_> = self.worker_rx.try_iter().collect();
        for message in messages {
            let effects = match message {
                WorkerMessage::PlaylistFetched { url, tracks } => {
                    info!(url = %url, count = tracks.len(), "playlist fetched");
                    self.session.playlist_fetched(tracks)
                }
                WorkerMessage::MediaInfoLoaded { request_id, info } => {
                    self.session.info_loaded(request_id, info)
                }
            };
            self.apply(ctx, effects);
        }
    }

    fn toggle_fullscreen(&mut self, ctx: &egui::Context) {
        let bounds = ctx.input(|input| {
            let viewport = input.viewport();
            viewport.inner_rect.map(|inner| WindowBounds {
                position: viewport.outer_rect.map(|outer| outer.min),
                size: inner.size(),
            })
        });
        let snapshot = PlaybackSnapshot {
            position: self.session.elapsed(),
            was_playing: self.session.play_state() == PlayState::Playing,
        };
        self.engine.pause();

        let commands = self.fullscreen.toggle(
            bounds,
            snapshot,
            Instant::now(),
            self.config.playback.resume_delay(),
        );
        info!(fullscreen = self.fullscreen.is_active(), "window mode switched");
        for command in commands {
            ctx.send_viewport_cmd(command);
        }
    }

    fn resume_after_mode_switch(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        if let Some(snapshot) = self.fullscreen.due_resume(now) {
            self.engine.seek_to(snapshot.position);
            if snapshot.was_playing {
                self.engine.play();
            }
        } else if let Some(wait) = self.fullscreen.resume_in(now) {
            ctx.request_repaint_after(wait);
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let (f11, escape) = ctx.input(|input| {
            (
                input.key_pressed(egui::Key::F11),
                input.key_pressed(egui::Key::Escape),
            )
        });
        let modal_open = !self.dialogs.is_empty() || self.url_prompt.is_some();
        if f11 || (escape && !modal_open && self.fullscreen.is_active()) {
            self.toggle_fullscreen(ctx);
        }
    }

    fn apply_menu_action(&mut self, ctx: &egui::Context, action: MenuAction) {
        match action {
            MenuAction::OpenFile => self.open_file_dialog(ctx),
            MenuAction::OpenPlaylistUrl => self.url_prompt = Some(String::new()),
            MenuAction::OpenRecent(path) => {
                let effects = self.session.open_path(&path);
                self.apply(ctx, effects);
            }
            MenuAction::Exit => ctx.send_viewport_cmd(ViewportCommand::Close),
            MenuAction::ToggleFullscreen => self.toggle_fullscreen(ctx),
            MenuAction::ReloadPlayer => {
                info!("reloading player");
                self.engine.dispose();
                self.show_message("Player reloaded!");
            }
            MenuAction::About => self.dialogs.push_back(Dialog::About),
            MenuAction::Help => self.show_message("Help not available yet."),
        }
    }

    fn render_menu(&self, ui: &mut egui::Ui) -> Option<MenuAction> {
        let mut action = None;
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open Audio/Video file...").clicked() {
                    action = Some(MenuAction::OpenFile);
                    ui.close();
                }
                if ui.button("Open Playlist URL...").clicked() {
                    action = Some(MenuAction::OpenPlaylistUrl);
                    ui.close();
                }
                ui.menu_button("Recent Files", |ui| {
                    let recent = self.session.recent();
                    if recent.is_empty() {
                        ui.add_enabled(false, egui::Button::new("No recent files :("));
                    }
                    for path in recent.entries() {
                        if ui.button(path.display().to_string()).clicked() {
                            action = Some(MenuAction::OpenRecent(path.clone()));
                            ui.close();
                        }
                    }
                });
                ui.separator();
                if ui.button("Exit").clicked() {
                    action = Some(MenuAction::Exit);
                    ui.close();
                }
            });
            ui.menu_button("View", |ui| {
                if ui.button("Toggle Fullscreen").clicked() {
                    action = Some(MenuAction::ToggleFullscreen);
                    ui.close();
                }
            });
            ui.menu_button("Playback", |ui| {
                if ui.button("Reload Player").clicked() {
                    action = Some(MenuAction::ReloadPlayer);
                    ui.close();
                }
            });
            ui.menu_button("Help", |ui| {
                if ui.button("About").clicked() {
                    action = Some(MenuAction::About);
                    ui.close();
                }
                if ui.button("Help").clicked() {
                    action = Some(MenuAction::Help);
                    ui.close();
                }
            });
        });
        action
    }

    fn render_seek_bar(&mut self, ui: &mut egui::Ui) {
        let seekable = self.session.total().is_some_and(|total| !total.is_zero());
        let seek_bar = &mut self.session.seek_bar;
        let response = self
            .skin
            .seek_slider(ui, &mut seek_bar.value, 0.0..=100.0, seekable);
        if !seekable {
            return;
        }

        if response.drag_started() {
            seek_bar.begin_drag();
        }
        if response.drag_stopped() {
            let fraction = seek_bar.end_drag();
            self.engine.seek_fraction(fraction);
        } else if response.clicked() && !seek_bar.is_dragging() {
            self.engine.seek_fraction(seek_bar.fraction());
        }
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.skin.button(ui, "▶ Play").clicked() {
                self.engine.play();
            }
            if self.skin.button(ui, "⏸ Pause").clicked() {
                self.engine.pause();
            }
            ui.label("🔊");
            let volume = ui.add(
                egui::Slider::new(&mut self.volume, 0.0..=1.0)
                    .show_value(false)
                    .trailing_fill(true),
            );
            if volume.changed() {
                self.engine.set_volume(self.volume);
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let label = time_label(self.session.elapsed(), self.session.total());
                ui.label(self.skin.details_text(label));
            });
        });
    }

    fn render_display(&self, ui: &mut egui::Ui) {
        match self.session.display() {
            Display::Empty => {
                ui.centered_and_justified(|ui| {
                    ui.label(self.skin.title_text("No media loaded :(", 24.0));
                });
            }
            Display::Video { caption } => {
                egui::Frame::new()
                    .fill(egui::Color32::BLACK)
                    .show(ui, |ui| {
                        ui.set_min_size(ui.available_size());
                        ui.centered_and_justified(|ui| {
                            ui.label(self.skin.details_text(caption.as_str()));
                        });
                    });
            }
            Display::Audio { info } => self.album_art.show(ui, &self.skin, info),
        }
    }

    fn render_dialogs(&mut self, ctx: &egui::Context) {
        if let Some(text) = self.url_prompt.as_mut() {
            let mut submit = false;
            let mut cancel = false;
            let modal = egui::Modal::new(egui::Id::new("playlist_url_prompt")).show(ctx, |ui| {
                ui.set_width(420.0);
                ui.heading("Open Playlist URL");
                ui.label("Enter playlist URL:");
                let edit = ui.add(
                    egui::TextEdit::singleline(text)
                        .hint_text("https://example.com/list.m3u")
                        .desired_width(f32::INFINITY),
                );
                edit.request_focus();
                if edit.lost_focus() && ui.input(|input| input.key_pressed(egui::Key::Enter)) {
                    submit = true;
                }
                ui.horizontal(|ui| {
                    if ui.button("Open").clicked() {
                        submit = true;
                    }
                    if ui.button("Cancel").clicked() {
                        cancel = true;
                    }
                });
            });
            if submit {
                let url = std::mem::take(text);
                self.url_prompt = None;
                self.fetch_playlist(url);
            } else if cancel || modal.should_close() {
                self.url_prompt = None;
            }
            return;
        }

        let Some(dialog) = self.dialogs.front() else {
            return;
        };
        let mut dismissed = false;
        let modal = egui::Modal::new(egui::Id::new("message_dialog")).show(ctx, |ui| {
            ui.set_min_width(280.0);
            match dialog {
                Dialog::Message(text) => {
                    ui.label(text.as_str());
                }
                Dialog::About => {
                    ui.heading(APP_NAME);
                    ui.label(format!("Version {}", env!("CARGO_PKG_VERSION")));
                }
            }
            ui.add_space(8.0);
            if ui.button("OK").clicked() {
                dismissed = true;
            }
        });
        if dismissed || modal.should_close() {
            self.dialogs.pop_front();
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_engine_events(ctx);
        self.drain_worker_messages(ctx);
        self.resume_after_mode_switch(ctx);
        self.handle_shortcuts(ctx);

        if !self.fullscreen.is_active() {
            let mut action = None;
            egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
                action = self.render_menu(ui);
            });
            if let Some(action) = action {
                self.apply_menu_action(ctx, action);
            }
        }

        egui::TopBottomPanel::top("seek_bar")
            .show_separator_line(false)
            .show(ctx, |ui| self.render_seek_bar(ui));

        egui::TopBottomPanel::bottom("controls")
            .min_height(44.0)
            .show(ctx, |ui| {
                ui.add_space(6.0);
                self.render_controls(ui);
            });

        let panel_frame =
            egui::Frame::central_panel(&ctx.style()).inner_margin(egui::Margin::ZERO);
        egui::CentralPanel::default()
            .frame(panel_frame)
            .show(ctx, |ui| self.render_display(ui));

        self.render_dialogs(ctx);
    }
}

fn main() -> anyhow::Result<()> {
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(err) => (Config::default(), Some(err)),
    };

    let _log_guard = match logging::init_logging(&config.logging) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("logging disabled: {err:#}");
            None
        }
    };
    if let Some(err) = config_error {
        warn!("config unreadable, using defaults: {err:#}");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "starting {APP_NAME}");

    let title = config.window.title.clone();
    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title(title.clone())
            .with_inner_size([config.window.width, config.window.height])
            .with_min_inner_size([320.0, 240.0]),
        ..Default::default()
    };

    eframe::run_native(
        &title,
        native_options,
        Box::new(
            move |cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(App::new(cc, config)?)) },
        ),
    )
    .map_err(|err| anyhow!("window system error: {err}"))?;

    info!("shutting down");
    Ok(())
}
