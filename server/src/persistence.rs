//! File-backed snapshots of the world.
//!
//! The world is stored as a single pretty-printed JSON document. Saves go to a
//! sibling temporary file which is flushed and then renamed over the target, so
//! a reader never observes a truncated document.

use crate::error::PersistenceError;
use chrono::{SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::WorldSnapshot;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// On-disk layout: the snapshot fields plus a `lastSaved` timestamp.
#[derive(Serialize)]
struct PersistedWorld<'a> {
    #[serde(flatten)]
    world: &'a WorldSnapshot,
    #[serde(rename = "lastSaved")]
    last_saved: String,
}

#[derive(Debug, Clone)]
pub struct PersistenceStore {
    path: PathBuf,
}

impl PersistenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved world, falling back to the empty default.
    ///
    /// Never fails: a missing file is normal on first start. A file that
    /// cannot be decoded is logged and moved aside so the next save does not
    /// overwrite the only copy. A file that cannot be read at all is logged
    /// and left where it is.
    pub fn load(&self) -> WorldSnapshot {
        match self.try_load() {
            Ok(Some(snapshot)) => {
                info!(
                    "Loaded world from {}: {}",
                    self.path.display(),
                    snapshot.summary()
                );
                if let Some(last_saved) = &snapshot.last_saved {
                    info!("World was last saved at {}", last_saved);
                }
                snapshot
            }
            Ok(None) => {
                info!(
                    "No world file at {}, starting with an empty world",
                    self.path.display()
                );
                WorldSnapshot::default()
            }
            Err(e @ PersistenceError::Format { .. }) => {
                error!("Failed to load world: {}", e);
                self.quarantine();
                WorldSnapshot::default()
            }
            Err(e) => {
                error!(
                    "Failed to load world: {}. Starting empty and leaving the file in place",
                    e
                );
                WorldSnapshot::default()
            }
        }
    }

    /// Reads the world file. `Ok(None)` means no file exists.
    pub fn try_load(&self) -> Result<Option<WorldSnapshot>, PersistenceError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| PersistenceError::Format {
                path: self.path.clone(),
                source,
            })
    }

    /// Writes the snapshot, logging on failure. Returns whether it succeeded.
    pub fn save(&self, snapshot: &WorldSnapshot) -> bool {
        match self.try_save(snapshot) {
            Ok(()) => {
                debug!("Saved world: {}", snapshot.summary());
                true
            }
            Err(e) => {
                error!("Failed to save world: {}", e);
                false
            }
        }
    }

    pub fn try_save(&self, snapshot: &WorldSnapshot) -> Result<(), PersistenceError> {
        let document = PersistedWorld {
            world: snapshot,
            last_saved: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let data =
            serde_json::to_vec_pretty(&document).map_err(|source| PersistenceError::Format {
                path: self.path.clone(),
                source,
            })?;

        let io_error = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let tmp_path = self.sibling("tmp");
        let written = File::create(&tmp_path).and_then(|mut file| {
            file.write_all(&data)?;
            file.sync_all()
        });
        if let Err(source) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(source));
        }

        fs::rename(&tmp_path, &self.path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            io_error(source)
        })
    }

    /// Moves an undecodable world file out of the way, under a name no
    /// earlier quarantine has used.
    fn quarantine(&self) {
        if !self.path.exists() {
            return;
        }
        let target = self.quarantine_path();
        match fs::rename(&self.path, &target) {
            Ok(()) => warn!(
                "Moved unreadable world file to {}",
                target.display()
            ),
            Err(e) => warn!(
                "Could not move unreadable world file {} aside: {}",
                self.path.display(),
                e
            ),
        }
    }

    /// `<file>.corrupt-<UTC timestamp>`, with a counter appended if that
    /// name is already taken.
    fn quarantine_path(&self) -> PathBuf {
        let base = format!("corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"));
        let mut candidate = self.sibling(&base);
        let mut attempt = 1;
        while candidate.exists() {
            candidate = self.sibling(&format!("{}-{}", base, attempt));
            attempt += 1;
        }
        candidate
    }

    /// `<file>.<suffix>` in the same directory as the world file.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("world"));
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }
}
