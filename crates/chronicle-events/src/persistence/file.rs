//! File-per-event persistence backend.
//!
//! Layout under the conversation directory:
//!
//! ```text
//! <dir>/event-00000-<event id>.json
//! <dir>/event-00001-<event id>.json
//! <dir>/base_state.json
//! ```
//!
//! The numeric prefix is the append position, so loading sorts by it rather
//! than trusting id order. Every file is written to a temporary sibling and
//! renamed into place, so a crash never leaves a half-written event behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chronicle_core::events::Event;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::EventPersistence;
use crate::errors::{EventStoreError, Result};

/// Sidecar file name.
pub const BASE_STATE_FILE: &str = "base_state.json";

const EVENT_PREFIX: &str = "event-";
const EVENT_SUFFIX: &str = ".json";

/// File name for the event stored at `sequence`.
pub fn event_file_name(sequence: usize, event: &Event) -> String {
    format!("{EVENT_PREFIX}{sequence:05}-{}{EVENT_SUFFIX}", event.id)
}

/// Parse the append position out of an event file name.
fn parse_sequence(name: &str) -> Option<usize> {
    let rest = name.strip_prefix(EVENT_PREFIX)?.strip_suffix(EVENT_SUFFIX)?;
    let (seq, _id) = rest.split_once('-')?;
    seq.parse().ok()
}

/// Directory-backed persistence for one conversation.
#[derive(Clone, Debug)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    /// Open (creating if needed) a conversation directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Conversation directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        let _ = tmp.persist(self.dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }
}

impl EventPersistence for FilePersistence {
    fn persist_event(&self, sequence: usize, event: &Event) -> Result<()> {
        let name = event_file_name(sequence, event);
        let bytes = serde_json::to_vec_pretty(event)?;
        self.write_atomic(&name, &bytes)?;
        debug!(file = %name, "event persisted");
        Ok(())
    }

    fn load_events(&self) -> Result<Vec<Event>> {
        let mut files: Vec<(usize, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Some(seq) = parse_sequence(name) {
                files.push((seq, entry.path()));
            } else if name.starts_with(EVENT_PREFIX) {
                warn!(file = name, "skipping unrecognized event file name");
            }
        }
        files.sort();

        let mut events = Vec::with_capacity(files.len());
        for (expected, (seq, path)) in files.into_iter().enumerate() {
            if seq != expected {
                return Err(EventStoreError::CorruptEventFile {
                    path,
                    message: format!("expected sequence {expected}, found {seq}"),
                });
            }
            let content = fs::read_to_string(&path)?;
            let event: Event = serde_json::from_str(&content).map_err(|e| {
                EventStoreError::CorruptEventFile {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?;
            events.push(event);
        }
        debug!(dir = %self.dir.display(), count = events.len(), "events loaded");
        Ok(events)
    }

    fn write_base_state(&self, state: &Value) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.write_atomic(BASE_STATE_FILE, &bytes)
    }

    fn read_base_state(&self) -> Result<Option<Value>> {
        let path = self.dir.join(BASE_STATE_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
