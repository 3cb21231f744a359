use anyhow::Context;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

const DEFAULT_TITLE: &str = "Viewed - V0.2 (Ready for liftoff)";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub window: WindowConfig,
    pub playback: PlaybackConfig,
    pub logging: LoggingConfig,
    pub colors: ColorConfig,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        for path in Self::candidates() {
            if path.exists() {
                let data = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                return Self::from_toml(&data)
                    .with_context(|| format!("Failed to parse config: {}", path.display()));
            }
        }

        Ok(Config::default())
    }

    pub fn from_toml(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("config.toml"));
            candidates.push(current_dir.join("config").join("viewed.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("config.toml"));
                candidates.push(dir.join("config").join("viewed.toml"));
            }
        }

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("viewed").join("config.toml"));
        }

        candidates
    }
}

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub title: String,
    pub width: f32,
    pub height: f32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            width: 900.0,
            height: 700.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub initial_volume: f32,
    pub tick_interval_ms: u64,
    pub resume_delay_ms: u64,
    pub http_timeout_secs: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            initial_volume: 1.0,
            tick_interval_ms: 250,
            resume_delay_ms: 150,
            http_timeout_secs: 15,
        }
    }
}

impl PlaybackConfig {
    pub fn initial_volume(&self) -> f32 {
        self.initial_volume.clamp(0.0, 1.0)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.clamp(50, 2000))
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms.min(2000))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub directory: Option<PathBuf>,
}

/// Raw color strings; `skin` parses them and falls back per entry.
#[derive(Debug, Clone, Default)]
pub struct ColorConfig {
    pub accent: Option<String>,
    pub art_background: Option<String>,
    pub meta_background: Option<String>,
    pub title: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    window: WindowSection,
    #[serde(default)]
    playback: PlaybackSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    colors: ColorSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let window_defaults = WindowConfig::default();
        let playback_defaults = PlaybackConfig::default();

        let window = WindowConfig {
            title: value.window.title.unwrap_or(window_defaults.title),
            width: value.window.width.unwrap_or(window_defaults.width).max(320.0),
            height: value.window.height.unwrap_or(window_defaults.height).max(240.0),
        };

        let playback = PlaybackConfig {
            initial_volume: value
                .playback
                .initial_volume
                .unwrap_or(playback_defaults.initial_volume),
            tick_interval_ms: value
                .playback
                .tick_interval_ms
                .unwrap_or(playback_defaults.tick_interval_ms),
            resume_delay_ms: value
                .playback
                .resume_delay_ms
                .unwrap_or(playback_defaults.resume_delay_ms),
            http_timeout_secs: value
                .playback
                .http_timeout_secs
                .unwrap_or(playback_defaults.http_timeout_secs),
        };

        let logging = LoggingConfig {
            filter: value.logging.filter,
            directory: value.logging.directory,
        };

        let colors = ColorConfig {
            accent: value.colors.accent,
            art_background: value.colors.art_background,
            meta_background: value.colors.meta_background,
            title: value.colors.title,
            details: value.colors.details,
        };

        Config {
            window,
            playback,
            logging,
            colors,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WindowSection {
    title: Option<String>,
    width: Option<f32>,
    height: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaybackSection {
    initial_volume: Option<f32>,
    tick_interval_ms: Option<u64>,
    resume_delay_ms: Option<u64>,
    http_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingSection {
    filter: Option<String>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ColorSection {
    accent: Option<String>,
    art_background: Option<String>,
    meta_background: Option<String>,
    title: Option<String>,
    details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.window.title, DEFAULT_TITLE);
        assert_eq!(config.window.width, 900.0);
        assert_eq!(config.playback.initial_volume(), 1.0);
        assert_eq!(config.playback.tick_interval(), Duration::from_millis(250));
        assert!(config.logging.filter.is_none());
    }

    #[test]
    fn values_are_read_and_clamped() {
        let config = Config::from_toml(
            r##"
            [window]
            width = 100.0
            title = "Mine"

            [playback]
            initial_volume = 3.5
            tick_interval_ms = 1
            resume_delay_ms = 90000

            [logging]
            filter = "debug"

            [colors]
            accent = "#ff8800"
            "##,
        )
        .unwrap();

        assert_eq!(config.window.title, "Mine");
        assert_eq!(config.window.width, 320.0);
        assert_eq!(config.playback.initial_volume(), 1.0);
        assert_eq!(config.playback.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.playback.resume_delay(), Duration::from_millis(2000));
        assert_eq!(config.logging.filter.as_deref(), Some("debug"));
        assert_eq!(config.colors.accent.as_deref(), Some("#ff8800"));
    }

    #[test]
    fn malformed_document_is_an_error() {
        assert!(Config::from_toml("[window\nwidth = ").is_err());
    }
}
