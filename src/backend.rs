//! `rodio` implementation of the engine backend.
//!
//! Local files and finite HTTP resources are decoded from seekable readers.
//! Responses without a content length are treated as live streams and decoded
//! from a forward-only reader. The backend produces audio only: video
//! containers play their audio track.

use std::{
    fs::File,
    io::{self, BufReader, Cursor, Read, Seek, SeekFrom},
    path::Path,
    sync::Mutex,
    time::Duration,
};

use lofty::file::{AudioFile, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::Accessor;
use reqwest::{blocking::Response, header::HeaderMap};
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use tracing::debug;

use crate::{
    engine::{Backend, EngineError, MediaHandle, PlayState, StreamMetadata},
    locator::{Locator, OpenRequest},
};

/// Streams larger than this are played from the socket instead of memory.
const MAX_BUFFERED_STREAM_BYTES: u64 = 256 * 1024 * 1024;

pub struct RodioBackend {
    stream: OutputStream,
    client: reqwest::blocking::Client,
}

impl RodioBackend {
    pub fn new(http_timeout: Duration) -> Result<Self, EngineError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|err| EngineError::Output(err.to_string()))?;
        stream.log_on_drop(false);

        let client = http_client(http_timeout)?;
        Ok(Self { stream, client })
    }

    fn prepare_file(&self, path: &Path) -> Result<PreparedMedia, EngineError> {
        let file = File::open(path)?;
        let decoder = Decoder::new(BufReader::new(file))
            .map_err(|err| EngineError::Decode(err.to_string()))?;
        let total = file_duration(path).or_else(|| decoder.total_duration());
        Ok(PreparedMedia::File { decoder, total })
    }

    fn prepare_stream(&self, url: &str) -> Result<PreparedMedia, EngineError> {
        let response = self.client.get(url).send()?.error_for_status()?;
        let mut metadata = icy_metadata(response.headers());

        match response.content_length() {
            Some(len) if len <= MAX_BUFFERED_STREAM_BYTES => {
                let mut bytes = Vec::with_capacity(len as usize);
                let mut response = response;
                response.read_to_end(&mut bytes)?;

                let (tags, tag_total) = read_stream_tags(&bytes);
                metadata.extend(tags);

                let decoder = Decoder::new(Cursor::new(bytes))
                    .map_err(|err| EngineError::Decode(err.to_string()))?;
                let total = tag_total.or_else(|| decoder.total_duration());
                Ok(PreparedMedia::Buffered {
                    decoder,
                    total,
                    metadata,
                })
            }
            _ => {
                let reader = LiveStream::new(response);
                let decoder =
                    Decoder::new(reader).map_err(|err| EngineError::Decode(err.to_string()))?;
                Ok(PreparedMedia::Live { decoder, metadata })
            }
        }
    }
}

pub enum PreparedMedia {
    File {
        decoder: Decoder<BufReader<File>>,
        total: Option<Duration>,
    },
    Buffered {
        decoder: Decoder<Cursor<Vec<u8>>>,
        total: Option<Duration>,
        metadata: StreamMetadata,
    },
    Live {
        decoder: Decoder<LiveStream<Response>>,
        metadata: StreamMetadata,
    },
}

impl Backend for RodioBackend {
    type Prepared = PreparedMedia;
    type Handle = RodioHandle;

    fn prepare(&mut self, request: &OpenRequest) -> Result<PreparedMedia, EngineError> {
        match &request.locator {
            Locator::File(path) => self.prepare_file(path),
            Locator::Stream(url) => self.prepare_stream(url),
        }
    }

    fn start(&mut self, prepared: PreparedMedia, volume: f32) -> RodioHandle {
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(volume);

        let (total, metadata) = match prepared {
            PreparedMedia::File { decoder, total } => {
                sink.append(decoder);
                (total, None)
            }
            PreparedMedia::Buffered {
                decoder,
                total,
                metadata,
            } => {
                sink.append(decoder);
                (total, Some(metadata))
            }
            PreparedMedia::Live { decoder, metadata } => {
                sink.append(decoder);
                (None, Some(metadata))
            }
        };

        RodioHandle {
            sink,
            total,
            metadata: metadata.filter(|m| !m.is_empty()),
            stopped: false,
        }
    }
}

pub struct RodioHandle {
    sink: Sink,
    total: Option<Duration>,
    metadata: Option<StreamMetadata>,
    stopped: bool,
}

impl MediaHandle for RodioHandle {
    fn play(&mut self) {
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn stop(&mut self) {
        self.stopped = true;
        self.sink.stop();
    }

    fn seek(&mut self, position: Duration) -> Result<(), EngineError> {
        self.sink
            .try_seek(position)
            .map_err(|err| EngineError::Seek(err.to_string()))
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.total
    }

    fn state(&self) -> PlayState {
        if self.stopped || self.sink.empty() {
            PlayState::Stopped
        } else if self.sink.is_paused() {
            PlayState::Paused
        } else {
            PlayState::Playing
        }
    }

    fn is_finished(&self) -> bool {
        !self.stopped && self.sink.empty()
    }

    fn take_metadata(&mut self) -> Option<StreamMetadata> {
        self.metadata.take()
    }
}

/// Forward-only reader over an HTTP body.
pub struct LiveStream<R> {
    // The decoder needs `Sync`; the body is only ever touched through `&mut self`.
    body: Mutex<R>,
    position: u64,
}

impl<R: Read> LiveStream<R> {
    fn new(body: R) -> Self {
        Self {
            body: Mutex::new(body),
            position: 0,
        }
    }
}

impl<R: Read> Read for LiveStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let body = self
            .body
            .get_mut()
            .map_err(|_| io::Error::other("stream reader poisoned"))?;
        let read = body.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R> Seek for LiveStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            SeekFrom::Start(offset) if offset == self.position => Ok(offset),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "live streams cannot seek",
            )),
        }
    }
}

/// The blocking client applies `timeout` to the response head and to every
/// body read, so a stalled server fails the open while a live stream that keeps
/// sending plays on.
fn http_client(timeout: Duration) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
}

fn file_duration(path: &Path) -> Option<Duration> {
    match lofty::read_from_path(path) {
        Ok(tagged) => Some(tagged.properties().duration()).filter(|d| !d.is_zero()),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "duration lookup failed");
            None
        }
    }
}

fn read_stream_tags(bytes: &[u8]) -> (StreamMetadata, Option<Duration>) {
    let mut metadata = StreamMetadata::new();
    let tagged = match Probe::new(Cursor::new(bytes))
        .guess_file_type()
        .map_err(|err| err.to_string())
        .and_then(|detected| detected.read().map_err(|err| err.to_string()))
    {
        Ok(tagged) => tagged,
        Err(err) => {
            debug!(error = %err, "stream tag read failed");
            return (metadata, None);
        }
    };

    if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
        if let Some(title) = tag.title() {
            metadata.insert("title".into(), title.into_owned());
        }
        if let Some(artist) = tag.artist() {
            metadata.insert("artist".into(), artist.into_owned());
        }
        if let Some(album) = tag.album() {
            metadata.insert("album".into(), album.into_owned());
        }
    }

    let total = Some(tagged.properties().duration()).filter(|d| !d.is_zero());
    (metadata, total)
}

/// Maps shoutcast/icecast response headers onto title/artist/album keys.
pub fn icy_metadata(headers: &HeaderMap) -> StreamMetadata {
    let mut metadata = StreamMetadata::new();
    for (header, key) in [
        ("icy-name", "title"),
        ("icy-description", "artist"),
        ("icy-genre", "album"),
    ] {
        if let Some(value) = headers
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            metadata.insert(key.to_string(), value.to_string());
        }
    }
    metadata
}
