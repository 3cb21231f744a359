use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode settings: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// User-scoped string key/value store backed by a flat TOML table.
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl SettingsStore {
    /// Store under the platform config directory, e.g. `~/.config/viewed/settings.toml`.
    pub fn user_default() -> Self {
        match dirs::config_dir() {
            Some(dir) => Self::open(dir.join("viewed").join("settings.toml")),
            None => {
                warn!("no user config directory; settings will not persist");
                Self::in_memory()
            }
        }
    }

    /// Opens the store at `path`. A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(data) => match toml::from_str::<BTreeMap<String, String>>(&data) {
                Ok(values) => values,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "settings file is malformed; starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "settings file is unreadable; starting empty"
                );
                BTreeMap::new()
            }
        };

        Self {
            path: Some(path),
            values,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn flush(&self) -> Result<(), SettingsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let data = toml::to_string(&self.values)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, data).map_err(|source| SettingsError::Write {
            path: path.clone(),
            source,
        })
    }
}
