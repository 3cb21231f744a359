use std::path::{Path, PathBuf};

use reqwest::Url;
use thiserror::Error;

/// Extensions offered by the open dialog.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["mp4", "m4v", "mp3", "wav", "aac", "aiff"];

const VIDEO_EXTENSIONS: [&str; 2] = ["mp4", "m4v"];
const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "wav", "aiff", "aac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    File(PathBuf),
    Stream(String),
}

impl Locator {
    pub fn display_name(&self) -> String {
        match self {
            Locator::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Locator::Stream(url) => url.clone(),
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Locator::File(path) => Some(path),
            Locator::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, Locator::Stream(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub locator: Locator,
    pub kind: MediaKind,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("invalid file URL: {0}")]
    InvalidFileUrl(String),
}

/// Routes a chosen file, recent entry or playlist entry to the video or audio path.
///
/// `http`/`https` locators are always streams on the audio path, whatever they carry.
pub fn dispatch(raw: &str) -> Result<OpenRequest, DispatchError> {
    let raw = raw.trim();
    if let Some(scheme) = scheme_of(raw) {
        if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
            return Ok(OpenRequest {
                locator: Locator::Stream(raw.to_string()),
                kind: MediaKind::Audio,
            });
        }
        if scheme.eq_ignore_ascii_case("file") {
            let path = Url::parse(raw)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(|| DispatchError::InvalidFileUrl(raw.to_string()))?;
            return dispatch_path(&path);
        }
    }
    dispatch_path(Path::new(raw))
}

pub fn dispatch_path(path: &Path) -> Result<OpenRequest, DispatchError> {
    let kind = kind_for_path(path)
        .ok_or_else(|| DispatchError::Unsupported(path.display().to_string()))?;
    Ok(OpenRequest {
        locator: Locator::File(absolute(path)),
        kind,
    })
}

pub fn kind_for_path(path: &Path) -> Option<MediaKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Audio)
    } else {
        None
    }
}

fn scheme_of(raw: &str) -> Option<&str> {
    let (scheme, _) = raw.split_once("://")?;
    // A single letter is a Windows drive, not a scheme.
    if scheme.len() < 2
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some(scheme)
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_extensions_route_to_video() {
        let request = dispatch("/media/clip.MP4").unwrap();
        assert_eq!(request.kind, MediaKind::Video);
        assert_eq!(request.locator, Locator::File(PathBuf::from("/media/clip.MP4")));
        assert_eq!(dispatch("/media/clip.m4v").unwrap().kind, MediaKind::Video);
    }

    #[test]
    fn audio_extensions_route_to_audio() {
        for name in ["a.mp3", "b.wav", "c.aiff", "d.AAC"] {
            let request = dispatch(&format!("/music/{name}")).unwrap();
            assert_eq!(request.kind, MediaKind::Audio, "{name}");
        }
    }

    #[test]
    fn http_locators_are_streams_even_for_video() {
        let request = dispatch("https://example.com/movie.mp4").unwrap();
        assert_eq!(request.kind, MediaKind::Audio);
        assert!(request.locator.is_stream());
        assert!(dispatch("HTTP://radio.example/live").unwrap().locator.is_stream());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(matches!(
            dispatch("/music/notes.txt"),
            Err(DispatchError::Unsupported(_))
        ));
        assert!(dispatch("/music/no_extension").is_err());
        assert!(dispatch("ftp://host/a.flac").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn file_urls_become_paths() {
        let request = dispatch("file:///music/song%20one.mp3").unwrap();
        assert_eq!(
            request.locator,
            Locator::File(PathBuf::from("/music/song one.mp3"))
        );
    }

    #[test]
    fn display_name_uses_file_name() {
        let locator = Locator::File(PathBuf::from("/music/track.mp3"));
        assert_eq!(locator.display_name(), "track.mp3");
    }
}
