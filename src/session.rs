use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{error, info, warn};

use crate::{
    engine::{EngineEvent, PlayState, StreamMetadata},
    locator::{self, DispatchError, Locator, MediaKind, OpenRequest},
    metadata::{MediaInfo, UNKNOWN_ALBUM, UNKNOWN_ARTIST, UNKNOWN_TITLE},
    recent::RecentFiles,
};

/// A fetched playlist and the index of the entry currently playing.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    tracks: Vec<String>,
    cursor: Option<usize>,
}

impl Playlist {
    /// `None` for an empty track list; nothing is playing until the first `advance`.
    pub fn new(tracks: Vec<String>) -> Option<Self> {
        if tracks.is_empty() {
            return None;
        }
        Some(Self {
            tracks,
            cursor: None,
        })
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&str> {
        self.cursor
            .and_then(|i| self.tracks.get(i))
            .map(String::as_str)
    }

    pub fn has_next(&self) -> bool {
        self.next_index() < self.tracks.len()
    }

    /// Moves the cursor forward. The cursor stays on the last entry once the end is reached.
    pub fn advance(&mut self) -> Option<&str> {
        let next = self.next_index();
        if next >= self.tracks.len() {
            return None;
        }
        self.cursor = Some(next);
        self.tracks.get(next).map(String::as_str)
    }

    /// Advances to the next entry that can be opened, skipping unsupported
    /// entries and local files that no longer exist.
    pub fn next_request(&mut self) -> Option<OpenRequest> {
        while let Some(entry) = self.advance() {
            let entry = entry.to_string();
            match locator::dispatch(&entry) {
                Ok(request) => match request.locator.local_path() {
                    Some(path) if !path.exists() => {
                        warn!(entry = %entry, "playlist entry missing; skipping");
                    }
                    _ => return Some(request),
                },
                Err(err) => warn!(entry = %entry, error = %err, "playlist entry skipped"),
            }
        }
        None
    }

    fn next_index(&self) -> usize {
        self.cursor.map_or(0, |i| i + 1)
    }
}

/// What the central area shows.
#[derive(Debug, Clone, PartialEq)]
pub enum Display {
    Empty,
    Video { caption: String },
    Audio { info: MediaInfo },
}

#[derive(Debug, Clone)]
pub enum DisplayEvent {
    /// A stream was dispatched; its placeholder shows before the engine answers.
    StreamRequested,
    Opened(OpenRequest),
    InfoLoaded(MediaInfo),
    StreamMetadata(StreamMetadata),
}

impl Display {
    pub fn transition(self, event: DisplayEvent) -> Display {
        match (self, event) {
            (_, DisplayEvent::StreamRequested) => Display::Audio {
                info: MediaInfo::stream_placeholder(),
            },
            (current, DisplayEvent::Opened(request)) => {
                let name = request.locator.display_name();
                match (request.kind, request.locator.is_stream()) {
                    (MediaKind::Video, _) => Display::Video { caption: name },
                    (MediaKind::Audio, true) => match current {
                        audio @ Display::Audio { .. } => audio,
                        _ => Display::Audio {
                            info: MediaInfo::stream_placeholder(),
                        },
                    },
                    (MediaKind::Audio, false) => Display::Audio {
                        info: MediaInfo::new(None, name, UNKNOWN_ARTIST, UNKNOWN_ALBUM),
                    },
                }
            }
            (Display::Audio { .. }, DisplayEvent::InfoLoaded(info)) => Display::Audio { info },
            (Display::Audio { .. }, DisplayEvent::StreamMetadata(metadata)) => {
                let field = |key: &str, default: &str| {
                    metadata
                        .get(key)
                        .cloned()
                        .unwrap_or_else(|| default.to_string())
                };
                Display::Audio {
                    info: MediaInfo::new(
                        None,
                        field("title", UNKNOWN_TITLE),
                        field("artist", UNKNOWN_ARTIST),
                        field("album", ""),
                    ),
                }
            }
            (current, _) => current,
        }
    }
}

/// Seek bar position on a 0..=100 scale.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeekBar {
    pub value: f64,
    dragging: bool,
}

impl SeekBar {
    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn begin_drag(&mut self) {
        self.dragging = true;
    }

    /// Ends a drag and returns the fraction to seek to.
    pub fn end_drag(&mut self) -> f64 {
        self.dragging = false;
        self.fraction()
    }

    pub fn fraction(&self) -> f64 {
        (self.value / 100.0).clamp(0.0, 1.0)
    }

    /// Follows playback unless the user holds the handle or the length is unknown.
    pub fn apply_time(&mut self, elapsed: Duration, total: Option<Duration>) {
        if self.dragging {
            return;
        }
        let Some(total) = total.filter(|t| !t.is_zero()) else {
            return;
        };
        let percent = (elapsed.as_secs_f64() / total.as_secs_f64() * 100.0).floor();
        self.value = percent.clamp(0.0, 100.0);
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
        self.dragging = false;
    }
}

pub fn format_mm_ss(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{:02}:{:02}", total / 60, total % 60)
}

pub fn time_label(elapsed: Duration, total: Option<Duration>) -> String {
    format!(
        "{} / {}",
        format_mm_ss(elapsed),
        format_mm_ss(total.unwrap_or_default())
    )
}

/// Side effects the window applies after the session reacts to an input.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Open(OpenRequest),
    LoadInfo { request_id: u64, path: PathBuf },
    Message(String),
    ClearArtwork,
    /// Re-upload the artwork of the displayed `MediaInfo`.
    RefreshArtwork,
}

/// Playback session: playlist, display, recent files and time state.
///
/// Every input returns the effects to apply, so the rules run without a window
/// or an audio device.
#[derive(Debug)]
pub struct Session {
    recent: RecentFiles,
    playlist: Option<Playlist>,
    display: Display,
    pub seek_bar: SeekBar,
    elapsed: Duration,
    total: Option<Duration>,
    play_state: PlayState,
    /// A directly picked file that replaces the playlist once it opens.
    direct_open: Option<OpenRequest>,
    next_info_request: u64,
    info_inflight: Option<u64>,
}

impl Session {
    pub fn new(recent: RecentFiles) -> Self {
        Self {
            recent,
            playlist: None,
            display: Display::Empty,
            seek_bar: SeekBar::default(),
            elapsed: Duration::ZERO,
            total: None,
            play_state: PlayState::Stopped,
            direct_open: None,
            next_info_request: 1,
            info_inflight: None,
        }
    }

    pub fn recent(&self) -> &RecentFiles {
        &self.recent
    }

    #[cfg(test)]
    pub fn playlist(&self) -> Option<&Playlist> {
        self.playlist.as_ref()
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    pub fn play_state(&self) -> PlayState {
        self.play_state
    }

    /// A file picked by the user or from the recent list. The playlist is only
    /// dropped once the engine reports the file open.
    pub fn open_path(&mut self, path: &Path) -> Vec<Effect> {
        match locator::dispatch_path(path) {
            Ok(request) => {
                self.direct_open = Some(request.clone());
                self.start_open(request)
            }
            Err(DispatchError::Unsupported(name)) => {
                warn!(file = %name, "unsupported file type");
                vec![Effect::Message("Unsupported file type!".into())]
            }
            Err(err) => {
                warn!(error = %err, "cannot open path");
                vec![Effect::Message(err.to_string())]
            }
        }
    }

    fn start_open(&mut self, request: OpenRequest) -> Vec<Effect> {
        info!(locator = %request.locator.display_name(), kind = ?request.kind, "opening media");
        let mut effects = Vec::new();
        if request.locator.is_stream() {
            effects.push(Effect::ClearArtwork);
            self.transition(DisplayEvent::StreamRequested);
        }
        effects.push(Effect::Open(request));
        effects
    }

    pub fn playlist_fetched(&mut self, tracks: Vec<String>) -> Vec<Effect> {
        match Playlist::new(tracks) {
            Some(playlist) => {
                self.direct_open = None;
                self.playlist = Some(playlist);
                self.play_next_in_playlist()
            }
            None => vec![Effect::Message("No tracks found in playlist!".into())],
        }
    }

    fn play_next_in_playlist(&mut self) -> Vec<Effect> {
        let next = self.playlist.as_mut().and_then(|playlist| {
            let request = playlist.next_request()?;
            info!(
                index = ?playlist.cursor(),
                of = playlist.track_count(),
                entry = ?playlist.current(),
                "playlist advanced"
            );
            Some(request)
        });
        match next {
            Some(request) => self.start_open(request),
            None => {
                if self.playlist.take().is_some() {
                    info!("playlist finished");
                }
                Vec::new()
            }
        }
    }

    pub fn handle_engine_event(&mut self, event: EngineEvent) -> Vec<Effect> {
        match event {
            EngineEvent::Opened { request, total } => self.opened(request, total),
            EngineEvent::OpenFailed { request, message } => {
                error!(locator = %request.locator.display_name(), error = %message, "open failed");
                if self.direct_open.as_ref() == Some(&request) {
                    self.direct_open = None;
                } else if self.playlist.take().is_some() {
                    warn!("playlist stopped after a failed open");
                }
                vec![Effect::Message(format!(
                    "Could not open file:\n{}\n{}",
                    request.locator.display_name(),
                    message
                ))]
            }
            EngineEvent::Time { elapsed, total } => {
                self.elapsed = elapsed;
                self.total = total;
                self.seek_bar.apply_time(elapsed, total);
                Vec::new()
            }
            EngineEvent::State(state) => {
                self.play_state = state;
                Vec::new()
            }
            EngineEvent::EndOfMedia => {
                if self.playlist.as_ref().is_some_and(Playlist::has_next) {
                    self.play_next_in_playlist()
                } else {
                    self.playlist = None;
                    self.play_state = PlayState::Stopped;
                    Vec::new()
                }
            }
            EngineEvent::Metadata(metadata) => {
                self.transition(DisplayEvent::StreamMetadata(metadata));
                vec![Effect::RefreshArtwork]
            }
            EngineEvent::Disposed => {
                self.elapsed = Duration::ZERO;
                self.total = None;
                self.seek_bar.reset();
                self.play_state = PlayState::Stopped;
                Vec::new()
            }
        }
    }

    fn opened(&mut self, request: OpenRequest, total: Option<Duration>) -> Vec<Effect> {
        self.total = total;
        self.elapsed = Duration::ZERO;
        self.seek_bar.reset();
        self.info_inflight = None;

        if self.direct_open.as_ref() == Some(&request) {
            self.direct_open = None;
            if self.playlist.take().is_some() {
                info!("playlist replaced by a directly opened file");
            }
        }

        let mut effects = Vec::new();
        if let Locator::File(path) = &request.locator {
            self.recent.add(path);
            if request.kind == MediaKind::Audio {
                let request_id = self.next_info_request;
                self.next_info_request += 1;
                self.info_inflight = Some(request_id);
                effects.push(Effect::LoadInfo {
                    request_id,
                    path: path.clone(),
                });
            }
        }
        if !request.locator.is_stream() {
            effects.push(Effect::ClearArtwork);
        }
        self.transition(DisplayEvent::Opened(request));
        effects
    }

    /// Results for anything but the latest metadata request are dropped.
    pub fn info_loaded(&mut self, request_id: u64, info: MediaInfo) -> Vec<Effect> {
        if self.info_inflight != Some(request_id) {
            return Vec::new();
        }
        self.info_inflight = None;
        self.transition(DisplayEvent::InfoLoaded(info));
        vec![Effect::RefreshArtwork]
    }

    fn transition(&mut self, event: DisplayEvent) {
        let display = std::mem::replace(&mut self.display, Display::Empty);
        self.display = display.transition(event);
    }
}
