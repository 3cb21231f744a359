use std::path::Path;

use image::{imageops::FilterType, DynamicImage, RgbaImage};
use lofty::error::LoftyError;
use lofty::file::TaggedFileExt;
use lofty::tag::Accessor;
use tracing::{debug, warn};

pub const ARTWORK_SIZE: u32 = 300;
pub const UNKNOWN_ARTIST: &str = "Unknown Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown Album";
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// What the album-art panel shows for one opened item.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaInfo {
    pub artwork: Option<RgbaImage>,
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl MediaInfo {
    pub fn new(
        artwork: Option<RgbaImage>,
        title: impl Into<String>,
        artist: impl Into<String>,
        album: impl Into<String>,
    ) -> Self {
        Self {
            artwork,
            title: title.into(),
            artist: artist.into(),
            album: album.into(),
        }
    }

    pub fn stream_placeholder() -> Self {
        Self::new(None, "Loading...", "Stream", "")
    }
}

struct TagFields {
    title: Option<String>,
    artist: Option<String>,
    album: Option<String>,
    artwork: Option<RgbaImage>,
}

/// Reads tags and artwork for a local audio file. Never fails: missing pieces get defaults.
pub fn load_media_info(path: &Path) -> MediaInfo {
    let mut title = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mut artist = UNKNOWN_ARTIST.to_string();
    let mut album = UNKNOWN_ALBUM.to_string();
    let mut artwork = None;

    match read_tag_fields(path) {
        Ok(Some(fields)) => {
            if let Some(value) = fields.title {
                title = value;
            }
            if let Some(value) = fields.artist {
                artist = value;
            }
            if let Some(value) = fields.album {
                album = value;
            }
            artwork = fields.artwork;
        }
        Ok(None) => debug!(path = %path.display(), "no tag present"),
        Err(err) => debug!(path = %path.display(), error = %err, "tag read failed"),
    }

    if artwork.is_none() {
        artwork = load_sibling_artwork(path);
    }

    MediaInfo {
        artwork,
        title,
        artist,
        album,
    }
}

fn read_tag_fields(path: &Path) -> Result<Option<TagFields>, LoftyError> {
    let tagged = lofty::read_from_path(path)?;
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(None);
    };

    let artwork = tagged
        .tags()
        .iter()
        .flat_map(|tag| tag.pictures())
        .next()
        .and_then(|picture| match decode_artwork(picture.data()) {
            Ok(image) => Some(image),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "embedded artwork did not decode");
                None
            }
        });

    Ok(Some(TagFields {
        title: tag.title().map(|v| v.into_owned()),
        artist: tag.artist().map(|v| v.into_owned()),
        album: tag.album().map(|v| v.into_owned()),
        artwork,
    }))
}

fn load_sibling_artwork(path: &Path) -> Option<RgbaImage> {
    let candidate = ["jpg", "png"]
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|candidate| candidate.is_file())?;

    match image::open(&candidate) {
        Ok(image) => Some(scale_artwork(image)),
        Err(err) => {
            warn!(path = %candidate.display(), error = %err, "sibling artwork did not decode");
            None
        }
    }
}

pub fn decode_artwork(bytes: &[u8]) -> image::ImageResult<RgbaImage> {
    image::load_from_memory(bytes).map(scale_artwork)
}

fn scale_artwork(image: DynamicImage) -> RgbaImage {
    image
        .resize_exact(ARTWORK_SIZE, ARTWORK_SIZE, FilterType::Lanczos3)
        .to_rgba8()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use lofty::config::WriteOptions;
    use lofty::tag::{Tag, TagExt, TagType};
    use std::fs;

    fn write_silent_wav(path: &Path) {
        let sample_rate: u32 = 8000;
        let samples: u32 = 800;
        let data_len = samples * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        fs::write(path, bytes).unwrap();
    }

    fn write_image(path: &Path) {
        let image = RgbImage::from_pixel(16, 8, Rgb([200, 40, 90]));
        image.save(path).unwrap();
    }

    #[test]
    fn tag_fields_override_defaults_and_missing_album_keeps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("song.wav");
        write_silent_wav(&path);

        let mut tag = Tag::new(TagType::Id3v2);
        tag.set_title("Song".to_string());
        tag.set_artist("Band".to_string());
        tag.save_to_path(&path, WriteOptions::default()).unwrap();

        let info = load_media_info(&path);
        assert_eq!(info.title, "Song");
        assert_eq!(info.artist, "Band");
        assert_eq!(info.album, UNKNOWN_ALBUM);
        assert!(info.artwork.is_none());
    }

    #[test]
    fn untagged_file_uses_sibling_jpg_and_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.mp3");
        fs::write(&path, b"definitely not an mp3 stream").unwrap();
        write_image(&dir.path().join("track.jpg"));

        let info = load_media_info(&path);
        assert_eq!(info.title, "track.mp3");
        assert_eq!(info.artist, UNKNOWN_ARTIST);
        assert_eq!(info.album, UNKNOWN_ALBUM);
        let artwork = info.artwork.expect("sibling artwork");
        assert_eq!(artwork.dimensions(), (ARTWORK_SIZE, ARTWORK_SIZE));
    }

    #[test]
    fn png_sibling_is_used_when_jpg_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.wav");
        fs::write(&path, b"junk").unwrap();
        write_image(&dir.path().join("other.png"));

        assert!(load_media_info(&path).artwork.is_some());
    }

    #[test]
    fn corrupt_sibling_is_treated_as_no_artwork() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        fs::write(&path, b"junk").unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();

        let info = load_media_info(&path);
        assert!(info.artwork.is_none());
        assert_eq!(info.title, "broken.mp3");
    }

    #[test]
    fn missing_file_still_yields_defaults() {
        let info = load_media_info(Path::new("/definitely/not/here.mp3"));
        assert_eq!(info.title, "here.mp3");
        assert_eq!(info.artist, UNKNOWN_ARTIST);
        assert!(info.artwork.is_none());
    }

    #[test]
    fn decode_artwork_fails_on_garbage_input() {
        assert!(decode_artwork(&[0u8, 1, 2, 3]).is_err());
    }
}
