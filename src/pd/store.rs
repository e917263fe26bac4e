// SPDX-License-Identifier: AGPL-3.0-only

//! Append-only keyed array stores for checkpoints.
//!
//! The driver writes `displacement_{step}`, `damage_{step}`,
//! `velocity_{step}` and `broken_{step}`; a resumed run reads them back.
//! A missing key is `Ok(None)`, never an error.

use crate::error::{PeridynError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Persistence collaborator.
pub trait ArrayStore {
    /// Store `values` under `key`. Writing an existing key fails.
    fn write(&mut self, key: &str, values: &[f64]) -> Result<()>;

    /// Values under `key`, `None` if never written.
    fn read(&self, key: &str) -> Result<Option<Vec<f64>>>;

    /// Whether `key` has been written.
    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.read(key)?.is_some())
    }
}

/// Checkpoint key for one array at one step.
#[must_use]
pub fn checkpoint_key(name: &str, step: usize) -> String {
    format!("{name}_{step}")
}

fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(PeridynError::Persistence(format!("invalid key '{key}'")))
    }
}

// ═══════════════════════════════════════════════════════════════════
// In-memory
// ═══════════════════════════════════════════════════════════════════

/// Store backed by a `HashMap`; used by tests and short runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    arrays: HashMap<String, Vec<f64>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored arrays.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.arrays.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ArrayStore for MemoryStore {
    fn write(&mut self, key: &str, values: &[f64]) -> Result<()> {
        validate_key(key)?;
        if self.arrays.contains_key(key) {
            return Err(PeridynError::Persistence(format!(
                "key '{key}' already written"
            )));
        }
        self.arrays.insert(key.to_owned(), values.to_vec());
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<f64>>> {
        Ok(self.arrays.get(key).cloned())
    }
}

// ═══════════════════════════════════════════════════════════════════
// JSON directory
// ═══════════════════════════════════════════════════════════════════

/// One `<key>.json` file per array in a directory.
#[derive(Clone, Debug)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PeridynError::Persistence(format!("{}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ArrayStore for JsonDirStore {
    fn write(&mut self, key: &str, values: &[f64]) -> Result<()> {
        validate_key(key)?;
        let path = self.path(key);
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| PeridynError::Persistence(format!("{}: {e}", path.display())))?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, values)
            .map_err(|e| PeridynError::Persistence(format!("{}: {e}", path.display())))?;
        std::io::Write::flush(&mut writer)
            .map_err(|e| PeridynError::Persistence(format!("{}: {e}", path.display())))
    }

    fn read(&self, key: &str) -> Result<Option<Vec<f64>>> {
        validate_key(key)?;
        let path = self.path(key);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PeridynError::Persistence(format!(
                    "{}: {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| PeridynError::Persistence(format!("{}: {e}", path.display())))
    }
}
