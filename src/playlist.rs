use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    time::Duration,
};

use reqwest::Url;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("invalid playlist URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported playlist URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("playlist request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read playlist: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloads and parses the playlist at `url`, degrading any failure to an empty list.
pub fn parse_playlist(url: &str, timeout: Duration) -> Vec<String> {
    match fetch_playlist(url, timeout) {
        Ok(tracks) => tracks,
        Err(err) => {
            warn!(url, error = %err, "playlist fetch failed");
            Vec::new()
        }
    }
}

pub fn fetch_playlist(url: &str, timeout: Duration) -> Result<Vec<String>, PlaylistError> {
    let parsed = Url::parse(url.trim()).map_err(|err| PlaylistError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?;
            let response = client.get(parsed).send()?.error_for_status()?;
            Ok(parse_playlist_reader(response))
        }
        "file" => {
            let path = parsed
                .to_file_path()
                .map_err(|_| PlaylistError::UnsupportedScheme(url.to_string()))?;
            let file = File::open(&path)?;
            Ok(parse_playlist_reader(file))
        }
        other => Err(PlaylistError::UnsupportedScheme(other.to_string())),
    }
}

/// Parses newline-delimited playlist text from an already-open stream.
///
/// Every trimmed, non-empty line that does not start with `#` is a track locator.
/// A read error ends the scan and keeps what was read so far.
pub fn parse_playlist_reader<R: Read>(reader: R) -> Vec<String> {
    let mut reader = BufReader::new(reader);
    let mut tracks = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                tracks.push(line.to_string());
            }
            Err(err) => {
                warn!(error = %err, "playlist stream ended with an error");
                break;
            }
        }
    }

    debug!(count = tracks.len(), "parsed playlist");
    tracks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn skips_comments_and_blank_lines() {
        let input = "# comment\n\nhttp://a/1.mp3\n  http://a/2.mp3  \n";
        let tracks = parse_playlist_reader(Cursor::new(input));
        assert_eq!(tracks, vec!["http://a/1.mp3", "http://a/2.mp3"]);
    }

    #[test]
    fn preserves_order_and_trims_every_line() {
        let input = "#EXTM3U\r\n#EXTINF:123,Artist - Title\r\n/music/b.mp3\r\n\t/music/a.wav \r\n   \r\nhttp://radio/live";
        let tracks = parse_playlist_reader(Cursor::new(input));
        assert_eq!(tracks, vec!["/music/b.mp3", "/music/a.wav", "http://radio/live"]);

        let originals: Vec<&str> = input.split('\n').map(str::trim).collect();
        for track in &tracks {
            assert!(originals.contains(&track.as_str()));
            assert!(!track.starts_with('#'));
            assert!(!track.is_empty());
        }
    }

    #[test]
    fn indented_comment_is_still_a_comment() {
        let tracks = parse_playlist_reader(Cursor::new("   # not a track\nkeep.mp3\n"));
        assert_eq!(tracks, vec!["keep.mp3"]);
    }

    #[test]
    fn empty_input_yields_no_tracks() {
        assert!(parse_playlist_reader(Cursor::new("")).is_empty());
        assert!(parse_playlist_reader(Cursor::new("\n\n# only comments\n")).is_empty());
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let bytes = b"caf\xe9.mp3\n".to_vec();
        let tracks = parse_playlist_reader(Cursor::new(bytes));
        assert_eq!(tracks.len(), 1);
        assert!(tracks[0].starts_with("caf"));
    }

    #[test]
    fn malformed_url_degrades_to_empty() {
        assert!(parse_playlist("not a url", Duration::from_secs(1)).is_empty());
        assert!(matches!(
            fetch_playlist("not a url", Duration::from_secs(1)),
            Err(PlaylistError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn unsupported_scheme_is_reported() {
        assert!(matches!(
            fetch_playlist("ftp://example.com/list.m3u", Duration::from_secs(1)),
            Err(PlaylistError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.m3u");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "#EXTM3U").unwrap();
        writeln!(file, "/music/one.mp3").unwrap();
        writeln!(file, "http://a/two.mp3").unwrap();
        drop(file);

        let url = Url::from_file_path(&path).unwrap();
        let tracks = parse_playlist(url.as_str(), Duration::from_secs(1));
        assert_eq!(tracks, vec!["/music/one.mp3", "http://a/two.mp3"]);
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("missing.m3u")).unwrap();
        assert!(parse_playlist(url.as_str(), Duration::from_secs(1)).is_empty());
    }
}
