//! Dotenv-style persistence for the username and the encrypted password
//! token. The file keeps plain KEY=VALUE lines so it stays inspectable;
//! saves go through a temp file and a rename so a crash never leaves a
//! half-written token behind.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const USERNAME_KEY: &str = "USERNAME";
pub const PASSWORD_KEY: &str = "PASSWORD";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store unreadable: {0}")]
    Read(String),
    #[error("credential store parse failed: {0}")]
    Parse(String),
    #[error("credential store unwritable: {0}")]
    Write(String),
}

/// Ordered key-value view of the on-disk env file. Entries the tool does not
/// know about are carried through a load/save cycle untouched.
#[derive(Debug, Default)]
pub struct EnvStore {
    entries: Vec<(String, String)>,
}

impl EnvStore {
    /// Loads the store from `path`; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let iter = dotenvy::from_path_iter(path)
            .map_err(|e| StoreError::Read(format!("{}: {e}", path.display())))?;
        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Parse(format!("{e}")))?;
            entries.push((key, value));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts or replaces a value, keeping the position of existing entries.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value.into(),
            None => self.entries.push((key.to_string(), value.into())),
        }
    }

    /// Writes every entry back out, creating the file if needed.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut rendered = String::new();
        for (key, value) in &self.entries {
            rendered.push_str(key);
            rendered.push('=');
            rendered.push_str(value);
            rendered.push('\n');
        }

        let tmp = sibling_tmp(path);
        fs::write(&tmp, rendered.as_bytes())
            .map_err(|e| StoreError::Write(format!("{}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| StoreError::Write(format!("{}: {e}", path.display())))?;
        Ok(())
    }
}

fn sibling_tmp(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store".into());
    name.push(".tmp");
    path.with_file_name(name)
}
