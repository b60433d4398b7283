//! Small persistent key/value store for browser-style local storage.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dirs_next::data_dir;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const STORE_DIR: &str = "loide";
const STORE_FILE: &str = "storage.json";

/// Keys written by the session.
pub mod keys {
    pub const PROJECT: &str = "loideProject";
    pub const OUTPUT_POSITION: &str = "outputPos";
    pub const THEME: &str = "theme";
    pub const MODE: &str = "mode";
    pub const FONT_SIZE_EDITOR: &str = "fontSizeEditor";
    pub const FONT_SIZE_OUTPUT: &str = "fontSizeOutput";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// String values persisted to a JSON file. Every write goes straight to disk.
#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
    contents: StoreFile,
}

impl LocalStore {
    /// Open the store at `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = if path.exists() {
            let data = fs::read_to_string(&path)
                .with_context(|| format!("failed to read storage file at {}", path.display()))?;
            serde_json::from_str(&data)
                .with_context(|| format!("invalid storage data in {}", path.display()))?
        } else {
            StoreFile::default()
        };
        Ok(Self { path, contents })
    }

    /// Open the store under `dir`, or under the user data directory when `dir` is `None`.
    pub fn open_in(dir: Option<&Path>) -> Result<Self> {
        let base = match dir {
            Some(dir) => dir.to_path_buf(),
            None => data_dir()
                .map(|base| base.join(STORE_DIR))
                .context("no user data directory available")?,
        };
        Self::open(base.join(STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.contents.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        self.contents.entries.insert(key.to_owned(), value.into());
        self.save()
    }

    pub fn remove(&mut self, key: &str) -> Result<Option<String>> {
        let removed = self.contents.entries.remove(key);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Time of the last write, RFC 3339.
    pub fn updated_at(&self) -> Option<&str> {
        self.contents.updated_at.as_deref()
    }

    fn save(&mut self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create storage directory {}", dir.display()))?;
        }
        self.contents.updated_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
        let data = serde_json::to_string_pretty(&self.contents)
            .context("failed to serialize storage entries")?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write storage file to {}", self.path.display()))?;
        tracing::trace!(path = %self.path.display(), "storage saved");
        Ok(())
    }
}
