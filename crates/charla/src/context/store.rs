//! JSON persistence for conversation histories, keyed by conversation id.
//!
//! One document per conversation under the store's root directory. Writes
//! are atomic (tempfile + rename) and best-effort: a failed save is logged
//! and never aborts the caller's reply to the user. A failed or missing
//! load degrades to a cold start.

use crate::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Current on-disk schema version.
const STORE_VERSION: u32 = 1;

/// Versioned envelope for a persisted history.
///
/// Earlier deployments wrote a bare JSON array of messages; [`ContextStore::load`]
/// still accepts that form.
#[derive(Serialize, Deserialize, Debug)]
struct StoredHistory {
    version: u32,
    messages: Vec<Message>,
}

/// File-backed store for conversation histories.
pub struct ContextStore {
    dir: PathBuf,
}

impl ContextStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the document for one conversation id.
    fn history_path(&self, chat_id: &str) -> PathBuf {
        // Conversation ids come from the transport; keep only filename-safe
        // characters so an id can never escape the store directory.
        let safe: String = chat_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Load a conversation's history. Returns `None` when no prior state
    /// exists — and also on any read or parse failure, which is logged:
    /// a cold start is an acceptable fallback for both cases.
    pub fn load(&self, chat_id: &str) -> Option<Vec<Message>> {
        let path = self.history_path(chat_id);
        if !path.exists() {
            return None;
        }
        let json = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!("cannot load chat history for {chat_id}: {e}");
                return None;
            }
        };
        match serde_json::from_str::<StoredHistory>(&json) {
            Ok(stored) => Some(stored.messages),
            // Legacy form: a bare array of messages with no version tag.
            Err(_) => match serde_json::from_str::<Vec<Message>>(&json) {
                Ok(messages) => Some(messages),
                Err(e) => {
                    warn!("cannot parse chat history for {chat_id}: {e}");
                    None
                }
            },
        }
    }

    /// Persist a conversation's history. Atomic write; errors are reported
    /// so the caller can log them, but a failed save must not fail the turn.
    pub fn save(&self, chat_id: &str, messages: &[Message]) -> Result<(), String> {
        let stored = StoredHistory {
            version: STORE_VERSION,
            messages: messages.to_vec(),
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| format!("failed to serialize history: {e}"))?;

        let path = self.history_path(chat_id);
        let tmp = tmp_path(&path);
        std::fs::write(&tmp, json).map_err(|e| format!("failed to write history: {e}"))?;
        std::fs::rename(&tmp, &path).map_err(|e| format!("failed to rename history: {e}"))?;
        Ok(())
    }

    /// Delete a conversation's stored state.
    pub fn purge(&self, chat_id: &str) -> Result<(), String> {
        let path = self.history_path(chat_id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| format!("failed to delete history: {e}"))?;
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageRole;

    fn sample_history() -> Vec<Message> {
        vec![
            Message::system("sys"),
            Message::user("hello"),
            Message::assistant("hi there"),
        ]
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();

        store.save("chat-1", &sample_history()).unwrap();
        let loaded = store.load("chat-1").unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].role, MessageRole::System);
        assert_eq!(loaded[2].content, "hi there");
    }

    #[test]
    fn missing_history_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        assert!(store.load("nope").is_none());
    }

    #[test]
    fn corrupt_history_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(store.load("bad").is_none());
    }

    #[test]
    fn legacy_bare_array_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        let legacy = serde_json::to_string(&sample_history()).unwrap();
        std::fs::write(dir.path().join("old.json"), legacy).unwrap();

        let loaded = store.load("old").unwrap();
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn purge_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();

        store.save("gone", &sample_history()).unwrap();
        assert!(store.load("gone").is_some());
        store.purge("gone").unwrap();
        assert!(store.load("gone").is_none());
    }

    #[test]
    fn purge_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        store.purge("never-existed").unwrap();
    }

    #[test]
    fn unsafe_ids_cannot_escape_the_store_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();

        store.save("../escape", &sample_history()).unwrap();
        assert!(store.load("../escape").is_some());
        // Nothing was written outside the store directory.
        assert!(!dir.path().parent().unwrap().join("escape.json").exists());
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new(dir.path()).unwrap();
        store.save("chat-2", &sample_history()).unwrap();
        assert!(!dir.path().join(".chat-2.json.tmp").exists());
    }
}
