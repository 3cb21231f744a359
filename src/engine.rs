//! Playback engine adapter.
//!
//! The engine thread owns the single live media handle. The UI talks to it only
//! through [`EngineClient`] commands and hears back through [`EngineEvent`]s posted
//! to its mailbox, so neither side touches the other's state.

use std::{
    collections::BTreeMap,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{locator::OpenRequest, mailbox::Mailbox};

pub type StreamMetadata = BTreeMap<String, String>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PlayState {
    Playing,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Open(OpenRequest),
    Play,
    Pause,
    /// Fraction of the total duration, 0.0..=1.0.
    SeekFraction(f64),
    SeekTo(Duration),
    SetVolume(f32),
    Dispose,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Opened {
        request: OpenRequest,
        total: Option<Duration>,
    },
    OpenFailed {
        request: OpenRequest,
        message: String,
    },
    Time {
        elapsed: Duration,
        total: Option<Duration>,
    },
    State(PlayState),
    EndOfMedia,
    Metadata(StreamMetadata),
    Disposed,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no audio output available: {0}")]
    Output(String),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt media: {0}")]
    Decode(String),
    #[error("stream request failed: {0}")]
    Stream(#[from] reqwest::Error),
    #[error("seek failed: {0}")]
    Seek(String),
}

/// One loaded media item inside the backend.
pub trait MediaHandle {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration) -> Result<(), EngineError>;
    fn set_volume(&mut self, volume: f32);
    fn position(&self) -> Duration;
    fn total_duration(&self) -> Option<Duration>;
    fn state(&self) -> PlayState;
    fn is_finished(&self) -> bool;
    /// Metadata reported by the source since the last call, if any.
    fn take_metadata(&mut self) -> Option<StreamMetadata>;
}

/// The external media framework.
///
/// Opening is split in two: `prepare` may fail and must not disturb the live
/// handle, `start` cannot fail and is only called once the old handle is gone.
pub trait Backend {
    type Prepared;
    type Handle: MediaHandle;

    fn prepare(&mut self, request: &OpenRequest) -> Result<Self::Prepared, EngineError>;
    fn start(&mut self, prepared: Self::Prepared, volume: f32) -> Self::Handle;
}

pub struct Engine<B: Backend> {
    backend: B,
    handle: Option<B::Handle>,
    volume: f32,
    last_state: Option<PlayState>,
    last_position: Option<Duration>,
    end_reported: bool,
    events: Mailbox<EngineEvent>,
}

impl<B: Backend> Engine<B> {
    pub fn new(backend: B, volume: f32, events: Mailbox<EngineEvent>) -> Self {
        Self {
            backend,
            handle: None,
            volume: volume.clamp(0.0, 1.0),
            last_state: None,
            last_position: None,
            end_reported: false,
            events,
        }
    }

    /// Returns false when the engine should shut down.
    pub fn handle_command(&mut self, command: EngineCommand) -> bool {
        match command {
            EngineCommand::Open(request) => self.open(request),
            EngineCommand::Play => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.play();
                }
            }
            EngineCommand::Pause => {
                if let Some(handle) = self.handle.as_mut() {
                    handle.pause();
                }
            }
            EngineCommand::SeekFraction(fraction) => self.seek_fraction(fraction),
            EngineCommand::SeekTo(position) => self.seek_to(position),
            EngineCommand::SetVolume(volume) => {
                self.volume = volume.clamp(0.0, 1.0);
                if let Some(handle) = self.handle.as_mut() {
                    handle.set_volume(self.volume);
                }
            }
            EngineCommand::Dispose => {
                if self.dispose_current() {
                    info!("player reloaded");
                }
                self.events.post(EngineEvent::Disposed);
            }
            EngineCommand::Shutdown => {
                self.dispose_current();
                return false;
            }
        }
        true
    }

    fn open(&mut self, request: OpenRequest) {
        let prepared = match self.backend.prepare(&request) {
            Ok(prepared) => prepared,
            Err(err) => {
                error!(locator = ?request.locator, error = %err, "could not open media");
                self.events.post(EngineEvent::OpenFailed {
                    request,
                    message: err.to_string(),
                });
                return;
            }
        };

        self.dispose_current();

        let mut handle = self.backend.start(prepared, self.volume);
        handle.play();
        let total = handle.total_duration();
        self.handle = Some(handle);
        self.last_state = None;
        self.last_position = None;
        self.end_reported = false;

        info!(locator = ?request.locator, kind = ?request.kind, ?total, "opened media");
        self.events.post(EngineEvent::Opened { request, total });
        self.tick();
    }

    fn seek_fraction(&mut self, fraction: f64) {
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        let Some(total) = handle.total_duration() else {
            debug!("seek ignored; total duration unknown");
            return;
        };
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.seek_to(total.mul_f64(fraction));
    }

    fn seek_to(&mut self, position: Duration) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        if let Err(err) = handle.seek(position) {
            warn!(error = %err, ?position, "seek rejected");
            return;
        }
        self.last_position = None;
    }

    /// Stops and drops the live handle. Returns whether there was one.
    fn dispose_current(&mut self) -> bool {
        let Some(mut handle) = self.handle.take() else {
            return false;
        };
        handle.stop();
        drop(handle);
        self.last_state = None;
        self.last_position = None;
        true
    }

    /// Publishes time, state, metadata and end-of-media changes of the live handle.
    pub fn tick(&mut self) {
        let Some(handle) = self.handle.as_mut() else {
            return;
        };

        if let Some(metadata) = handle.take_metadata() {
            self.events.post(EngineEvent::Metadata(metadata));
        }

        let state = handle.state();
        if self.last_state != Some(state) {
            self.last_state = Some(state);
            self.events.post(EngineEvent::State(state));
        }

        let elapsed = handle.position();
        if self.last_position != Some(elapsed) {
            self.last_position = Some(elapsed);
            self.events.post(EngineEvent::Time {
                elapsed,
                total: handle.total_duration(),
            });
        }

        if !self.end_reported && handle.is_finished() {
            self.end_reported = true;
            self.events.post(EngineEvent::EndOfMedia);
        }
    }

    #[cfg(test)]
    fn has_handle(&self) -> bool {
        self.handle.is_some()
    }
}

/// How long dropping the client waits for the engine thread before detaching it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// UI-side handle to the engine thread.
pub struct EngineClient {
    tx: Sender<EngineCommand>,
    join: Option<JoinHandle<()>>,
    /// Disconnects when the engine thread returns.
    done: Receiver<()>,
    shutdown_grace: Duration,
}

impl EngineClient {
    /// Spawns the engine thread. The backend is built on that thread since output
    /// streams are not always `Send`.
    pub fn spawn<B, F>(
        make_backend: F,
        volume: f32,
        tick_interval: Duration,
        events: Mailbox<EngineEvent>,
    ) -> std::io::Result<Self>
    where
        B: Backend + 'static,
        F: FnOnce() -> Result<B, EngineError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let (done_tx, done) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name("engine".into())
            .spawn(move || {
                let _done = done_tx;
                match make_backend() {
                    Ok(backend) => {
                        run_engine(Engine::new(backend, volume, events), rx, tick_interval)
                    }
                    Err(err) => {
                        error!(error = %err, "playback engine unavailable");
                        run_unavailable(rx, events, err.to_string());
                    }
                }
            })?;

        Ok(Self {
            tx,
            join: Some(join),
            done,
            shutdown_grace: SHUTDOWN_GRACE,
        })
    }

    #[cfg(test)]
    fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn send(&self, command: EngineCommand) {
        if self.tx.send(command).is_err() {
            warn!("engine thread is gone; command dropped");
        }
    }

    pub fn open(&self, request: OpenRequest) {
        self.send(EngineCommand::Open(request));
    }

    pub fn play(&self) {
        self.send(EngineCommand::Play);
    }

    pub fn pause(&self) {
        self.send(EngineCommand::Pause);
    }

    pub fn seek_fraction(&self, fraction: f64) {
        self.send(EngineCommand::SeekFraction(fraction));
    }

    pub fn seek_to(&self, position: Duration) {
        self.send(EngineCommand::SeekTo(position));
    }

    pub fn set_volume(&self, volume: f32) {
        self.send(EngineCommand::SetVolume(volume));
    }

    pub fn dispose(&self) {
        self.send(EngineCommand::Dispose);
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        let _ = self.tx.send(EngineCommand::Shutdown);
        let Some(join) = self.join.take() else {
            return;
        };
        match self.done.recv_timeout(self.shutdown_grace) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace = ?self.shutdown_grace,
                    "engine thread still busy at shutdown; detaching it"
                );
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = join.join();
            }
        }
    }
}

fn run_engine<B: Backend>(
    mut engine: Engine<B>,
    rx: Receiver<EngineCommand>,
    tick_interval: Duration,
) {
    let mut last_tick = Instant::now();
    loop {
        match rx.recv_timeout(tick_interval) {
            Ok(command) => {
                if !engine.handle_command(command) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                engine.handle_command(EngineCommand::Shutdown);
                break;
            }
        }

        if last_tick.elapsed() >= tick_interval {
            engine.tick();
            last_tick = Instant::now();
        }
    }
    debug!("engine thread stopped");
}

fn run_unavailable(rx: Receiver<EngineCommand>, events: Mailbox<EngineEvent>, message: String) {
    while let Ok(command) = rx.recv() {
        match command {
            EngineCommand::Open(request) => {
                events.post(EngineEvent::OpenFailed {
                    request,
                    message: message.clone(),
                });
            }
            EngineCommand::Shutdown => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        locator::{Locator, MediaKind},
        mailbox::noop_waker,
    };
    use std::{
        path::PathBuf,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc, Mutex,
        },
    };

    type Log = Arc<Mutex<Vec<String>>>;

    struct FakeBackend {
        log: Log,
        total: Option<Duration>,
        finished: Arc<AtomicBool>,
        metadata: Option<StreamMetadata>,
    }

    struct FakeHandle {
        name: String,
        log: Log,
        position: Duration,
        total: Option<Duration>,
        state: PlayState,
        finished: Arc<AtomicBool>,
        metadata: Option<StreamMetadata>,
    }

    impl Drop for FakeHandle {
        fn drop(&mut self) {
            self.log.lock().unwrap().push(format!("dispose {}", self.name));
        }
    }

    impl MediaHandle for FakeHandle {
        fn play(&mut self) {
            self.state = PlayState::Playing;
            self.log.lock().unwrap().push(format!("play {}", self.name));
        }
        fn pause(&mut self) {
            self.state = PlayState::Paused;
            self.log.lock().unwrap().push(format!("pause {}", self.name));
        }
        fn stop(&mut self) {
            self.state = PlayState::Stopped;
            self.log.lock().unwrap().push(format!("stop {}", self.name));
        }
        fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
            self.position = position;
            self.log
                .lock()
                .unwrap()
                .push(format!("seek {} {}", self.name, position.as_secs()));
            Ok(())
        }
        fn set_volume(&mut self, volume: f32) {
            self.log
                .lock()
                .unwrap()
                .push(format!("volume {} {volume}", self.name));
        }
        fn position(&self) -> Duration {
            self.position
        }
        fn total_duration(&self) -> Option<Duration> {
            self.total
        }
        fn state(&self) -> PlayState {
            self.state
        }
        fn is_finished(&self) -> bool {
            self.finished.load(Ordering::SeqCst)
        }
        fn take_metadata(&mut self) -> Option<StreamMetadata> {
            self.metadata.take()
        }
    }

    impl Backend for FakeBackend {
        type Prepared = String;
        type Handle = FakeHandle;

        fn prepare(&mut self, request: &OpenRequest) -> Result<String, EngineError> {
            let name = request.locator.display_name();
            self.log.lock().unwrap().push(format!("prepare {name}"));
            if name.contains("bad") {
                return Err(EngineError::Decode(format!("cannot decode {name}")));
            }
            Ok(name)
        }

        fn start(&mut self, prepared: String, volume: f32) -> FakeHandle {
            self.log
                .lock()
                .unwrap()
                .push(format!("start {prepared} {volume}"));
            FakeHandle {
                name: prepared,
                log: Arc::clone(&self.log),
                position: Duration::ZERO,
                total: self.total,
                state: PlayState::Stopped,
                finished: Arc::clone(&self.finished),
                metadata: self.metadata.take(),
            }
        }
    }

    fn request(name: &str) -> OpenRequest {
        OpenRequest {
            locator: Locator::File(PathBuf::from(format!("/media/{name}"))),
            kind: MediaKind::Audio,
        }
    }

    fn engine(
        total: Option<Duration>,
    ) -> (Engine<FakeBackend>, Log, Arc<AtomicBool>, Receiver<EngineEvent>) {
        let log: Log = Arc::default();
        let finished = Arc::new(AtomicBool::new(false));
        let backend = FakeBackend {
            log: Arc::clone(&log),
            total,
            finished: Arc::clone(&finished),
            metadata: None,
        };
        let (mailbox, rx) = Mailbox::channel(noop_waker());
        (Engine::new(backend, 0.5, mailbox), log, finished, rx)
    }

    fn position_of(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|line| line == entry)
            .unwrap_or_else(|| panic!("missing {entry:?} in {log:?}"))
    }

    #[test]
    fn previous_handle_is_disposed_before_next_starts() {
        let (mut engine, log, _, rx) = engine(Some(Duration::from_secs(60)));
        engine.handle_command(EngineCommand::Open(request("a.mp3")));
        engine.handle_command(EngineCommand::Open(request("b.mp3")));

        let log = log.lock().unwrap().clone();
        let disposed = position_of(&log, "dispose a.mp3");
        assert!(position_of(&log, "stop a.mp3") < disposed);
        assert!(disposed < position_of(&log, "start b.mp3 0.5"));
        assert!(position_of(&log, "prepare b.mp3") < position_of(&log, "stop a.mp3"));

        let opened: Vec<_> = rx
            .try_iter()
            .filter(|event| matches!(event, EngineEvent::Opened { .. }))
            .collect();
        assert_eq!(opened.len(), 2);
    }

    #[test]
    fn failed_open_keeps_the_working_handle() {
        let (mut engine, log, _, rx) = engine(None);
        engine.handle_command(EngineCommand::Open(request("good.mp3")));
        engine.handle_command(EngineCommand::Open(request("bad.mp3")));

        assert!(engine.has_handle());
        let log = log.lock().unwrap().clone();
        assert!(!log.contains(&"stop good.mp3".to_string()));
        assert!(!log.contains(&"dispose good.mp3".to_string()));

        let failure = rx
            .try_iter()
            .find_map(|event| match event {
                EngineEvent::OpenFailed { request, message } => Some((request, message)),
                _ => None,
            })
            .expect("open failure event");
        assert_eq!(failure.0, request("bad.mp3"));
        assert!(failure.1.contains("bad.mp3"));
    }

    #[test]
    fn transport_commands_without_handle_are_noops() {
        let (mut engine, log, _, rx) = engine(None);
        assert!(engine.handle_command(EngineCommand::Play));
        assert!(engine.handle_command(EngineCommand::Pause));
        assert!(engine.handle_command(EngineCommand::SeekFraction(0.5)));
        engine.tick();
        assert!(log.lock().unwrap().is_empty());
        assert!(rx.try_iter().next().is_none());
    }

    #[test]
    fn seek_fraction_resolves_against_total() {
        let (mut engine, log, _, _rx) = engine(Some(Duration::from_secs(200)));
        engine.handle_command(EngineCommand::Open(request("a.mp3")));
        engine.handle_command(EngineCommand::SeekFraction(0.25));
        assert!(log.lock().unwrap().contains(&"seek a.mp3 50".to_string()));
    }

    #[test]
    fn seek_fraction_ignored_for_unknown_duration() {
        let (mut engine, log, _, _rx) = engine(None);
        engine.handle_command(EngineCommand::Open(request("live.mp3")));
        engine.handle_command(EngineCommand::SeekFraction(0.5));
        assert!(!log
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.starts_with("seek")));
    }

    #[test]
    fn volume_is_remembered_for_later_handles() {
        let (mut engine, log, _, _rx) = engine(None);
        engine.handle_command(EngineCommand::SetVolume(1.7));
        engine.handle_command(EngineCommand::Open(request("a.mp3")));
        assert!(log.lock().unwrap().contains(&"start a.mp3 1".to_string()));
    }

    #[test]
    fn end_of_media_is_reported_once() {
        let (mut engine, _, finished, rx) = engine(Some(Duration::from_secs(5)));
        engine.handle_command(EngineCommand::Open(request("a.mp3")));
        finished.store(true, Ordering::SeqCst);
        engine.tick();
        engine.tick();
        let ends = rx
            .try_iter()
            .filter(|event| *event == EngineEvent::EndOfMedia)
            .count();
        assert_eq!(ends, 1);
    }

    #[test]
    fn metadata_and_state_are_published() {
        let (mut engine, _, _, rx) = engine(None);
        let mut metadata = StreamMetadata::new();
        metadata.insert("title".into(), "Radio".into());
        engine.backend.metadata = Some(metadata.clone());

        engine.handle_command(EngineCommand::Open(request("stream.mp3")));
        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.contains(&EngineEvent::Metadata(metadata)));
        assert!(events.contains(&EngineEvent::State(PlayState::Playing)));
        assert!(events.contains(&EngineEvent::Time {
            elapsed: Duration::ZERO,
            total: None
        }));
    }

    #[test]
    fn dispose_and_shutdown_release_the_handle() {
        let (mut engine, log, _, rx) = engine(None);
        engine.handle_command(EngineCommand::Open(request("a.mp3")));
        assert!(engine.handle_command(EngineCommand::Dispose));
        assert!(!engine.has_handle());
        assert!(log.lock().unwrap().contains(&"dispose a.mp3".to_string()));
        assert!(rx.try_iter().any(|event| event == EngineEvent::Disposed));

        engine.handle_command(EngineCommand::Open(request("b.mp3")));
        assert!(!engine.handle_command(EngineCommand::Shutdown));
        assert!(!engine.has_handle());
    }

    #[test]
    fn unavailable_backend_answers_opens_with_failures() {
        let (mailbox, rx) = Mailbox::channel(noop_waker());
        let client = EngineClient::spawn::<FakeBackend, _>(
            || Err(EngineError::Output("no device".into())),
            1.0,
            Duration::from_millis(50),
            mailbox,
        )
        .unwrap();

        client.open(request("a.mp3"));
        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            event,
            EngineEvent::OpenFailed { ref message, .. } if message.contains("no device")
        ));
        drop(client);
    }

    /// Blocks in `prepare` until the test lets go, like a stalled network read.
    struct StalledBackend {
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl Backend for StalledBackend {
        type Prepared = String;
        type Handle = FakeHandle;

        fn prepare(&mut self, request: &OpenRequest) -> Result<String, EngineError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            Err(EngineError::Decode(request.locator.display_name()))
        }

        fn start(&mut self, prepared: String, _volume: f32) -> FakeHandle {
            FakeHandle {
                name: prepared,
                log: Arc::default(),
                position: Duration::ZERO,
                total: None,
                state: PlayState::Stopped,
                finished: Arc::default(),
                metadata: None,
            }
        }
    }

    #[test]
    fn shutdown_does_not_wait_forever_on_a_stalled_open() {
        let (entered_tx, entered) = mpsc::channel();
        let (release_tx, release) = mpsc::channel();
        let (mailbox, _rx) = Mailbox::channel(noop_waker());
        let client = EngineClient::spawn(
            move || {
                Ok(StalledBackend {
                    entered: entered_tx,
                    release,
                })
            },
            1.0,
            Duration::from_millis(50),
            mailbox,
        )
        .unwrap()
        .with_shutdown_grace(Duration::from_millis(100));

        client.open(request("stalled.mp3"));
        entered.recv_timeout(Duration::from_secs(5)).unwrap();

        let started = Instant::now();
        drop(client);
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(release_tx);
    }

    #[test]
    fn shutdown_joins_an_idle_engine() {
        let (mailbox, _rx) = Mailbox::channel(noop_waker());
        let (entered_tx, entered) = mpsc::channel();
        let (_release_tx, release) = mpsc::channel();
        let client = EngineClient::spawn(
            move || {
                Ok(StalledBackend {
                    entered: entered_tx,
                    release,
                })
            },
            1.0,
            Duration::from_millis(50),
            mailbox,
        )
        .unwrap();

        drop(client);
        // The backend went away with the joined thread.
        assert!(matches!(
            entered.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        ));
    }
}
