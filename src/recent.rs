use std::path::{Path, PathBuf};

use tracing::warn;

use crate::settings::SettingsStore;

pub const MAX_RECENT_FILES: usize = 5;
const KEY_PREFIX: &str = "recentFile";

/// Most-recent-first list of opened files, mirrored into the settings store on every change.
#[derive(Debug)]
pub struct RecentFiles {
    entries: Vec<PathBuf>,
    store: SettingsStore,
}

impl RecentFiles {
    pub fn load(store: SettingsStore) -> Self {
        let entries = (0..MAX_RECENT_FILES)
            .filter_map(|i| store.get(&key(i)).map(PathBuf::from))
            .collect();
        Self { entries, store }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves `path` to the front, dropping any older copy and anything past capacity.
    pub fn add(&mut self, path: &Path) {
        self.entries.retain(|existing| existing != path);
        self.entries.insert(0, path.to_path_buf());
        self.entries.truncate(MAX_RECENT_FILES);
        self.persist();
    }

    fn persist(&mut self) {
        for i in 0..MAX_RECENT_FILES {
            match self.entries.get(i) {
                Some(path) => self.store.put(key(i), path.to_string_lossy()),
                None => self.store.remove(&key(i)),
            }
        }
        if let Err(err) = self.store.flush() {
            warn!(error = %err, "failed to persist recent files");
        }
    }
}

fn key(index: usize) -> String {
    format!("{KEY_PREFIX}{index}")
}
