use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ActionCode, ActivityEntry, ActivityResponse};

/// Oldest entries are dropped past this many.
pub const MAX_STORED_ENTRIES: usize = 2_000;
const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredActivity {
    #[serde(rename = "sessionId", alias = "session_id")]
    session_id: String,
    #[serde(rename = "actionPerformed", alias = "action_performed")]
    action_performed: String,
    #[serde(rename = "nodeId", alias = "node_id")]
    node_id: String,
    #[serde(rename = "createdAt", alias = "created_at")]
    created_at: String,
}

#[derive(Debug, Serialize)]
struct ActivityStoreFile<'a> {
    version: u8,
    entries: &'a VecDeque<StoredActivity>,
}

#[derive(Clone, Debug, Deserialize)]
struct ActivityStoreFileRaw {
    version: u8,
    entries: Vec<serde_json::Value>,
}

/// Serialized store contents waiting to be written to disk.
#[derive(Debug)]
pub struct PendingWrite {
    pub path: PathBuf,
    pub text: String,
}

impl PendingWrite {
    pub fn write(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, &self.text)
    }
}

/// Append-only log of decisions that reached the probability network.
/// Writes are batched: `record` only marks the store dirty and the host
/// persists it through `take_pending_write` or `flush`.
pub struct ActivityStore {
    file_path: PathBuf,
    entries: VecDeque<StoredActivity>,
    dirty: bool,
}

impl ActivityStore {
    pub fn new(file_path: PathBuf) -> Self {
        let entries = load_entries(&file_path);
        Self {
            file_path,
            entries,
            dirty: false,
        }
    }

    pub fn record(&mut self, session_id: &str, action: ActionCode, node_id: &str) {
        let session_id = session_id.trim();
        self.entries.push_back(StoredActivity {
            session_id: if session_id.is_empty() {
                "anonymous".to_string()
            } else {
                session_id.to_string()
            },
            action_performed: action_name(action).to_string(),
            node_id: node_id.to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        while self.entries.len() > MAX_STORED_ENTRIES {
            self.entries.pop_front();
        }
        self.dirty = true;
    }

    /// Newest entries first.
    pub fn build_response(&self, requested_limit: Option<usize>) -> ActivityResponse {
        let limit = requested_limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        ActivityResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            entries: self
                .entries
                .iter()
                .rev()
                .take(limit)
                .map(|entry| ActivityEntry {
                    session_id: entry.session_id.clone(),
                    action_performed: entry.action_performed.clone(),
                    node_id: entry.node_id.clone(),
                    created_at: entry.created_at.clone(),
                })
                .collect(),
        }
    }

    /// Compact snapshot of the store if anything changed since the last call.
    pub fn take_pending_write(&mut self) -> Option<PendingWrite> {
        if !self.dirty {
            return None;
        }
        let payload = ActivityStoreFile {
            version: 1,
            entries: &self.entries,
        };
        match serde_json::to_string(&payload) {
            Ok(text) => {
                self.dirty = false;
                Some(PendingWrite {
                    path: self.file_path.clone(),
                    text,
                })
            }
            Err(error) => {
                tracing::warn!(path = %self.file_path.display(), %error, "activity store: failed to serialize");
                None
            }
        }
    }

    /// Marks the store dirty again after a failed write.
    pub fn restore_pending(&mut self) {
        self.dirty = true;
    }

    pub fn flush(&mut self) {
        let Some(pending) = self.take_pending_write() else {
            return;
        };
        if let Err(error) = pending.write() {
            tracing::warn!(path = %pending.path.display(), %error, "activity store: failed to write");
            self.dirty = true;
        }
    }
}

pub fn action_name(action: ActionCode) -> &'static str {
    match action {
        ActionCode::Evacuate => "Evacuation",
        ActionCode::Suppress => "Suppression",
        ActionCode::Scan => "Scan",
        ActionCode::ControlLine => "Control Line",
    }
}

fn load_entries(path: &Path) -> VecDeque<StoredActivity> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), %error, "activity store: failed to read");
            }
            return VecDeque::new();
        }
    };
    let parsed = match serde_json::from_str::<ActivityStoreFileRaw>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            tracing::warn!(path = %path.display(), version = value.version, "activity store: unsupported version");
            return VecDeque::new();
        }
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "activity store: failed to parse");
            return VecDeque::new();
        }
    };

    let mut entries = VecDeque::with_capacity(parsed.entries.len());
    for (idx, raw) in parsed.entries.into_iter().enumerate() {
        match serde_json::from_value::<StoredActivity>(raw) {
            Ok(entry) if !entry.node_id.trim().is_empty() => entries.push_back(entry),
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(path = %path.display(), idx, %error, "activity store: skipping entry");
            }
        }
    }
    while entries.len() > MAX_STORED_ENTRIES {
        entries.pop_front();
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let unique = format!(
            "{}-{}-{}",
            name,
            std::process::id(),
            rand::random::<u32>()
        );
        std::env::temp_dir().join(unique).join("activity.json")
    }

    #[test]
    fn record_persists_and_reloads() {
        let path = temp_file("activity-store-record");
        let mut store = ActivityStore::new(path.clone());
        store.record("s1", ActionCode::Suppress, "Fire Across Gap");
        store.record("", ActionCode::Evacuate, "ACT-3");
        assert!(!path.exists());
        store.flush();

        let reloaded = ActivityStore::new(path.clone());
        let response = reloaded.build_response(None);
        assert_eq!(response.entries.len(), 2);
        assert_eq!(response.entries[0].node_id, "ACT-3");
        assert_eq!(response.entries[0].session_id, "anonymous");
        assert_eq!(response.entries[0].action_performed, "Evacuation");
        assert_eq!(response.entries[1].action_performed, "Suppression");
        assert!(response.entries[1].created_at.ends_with('Z'));

        let _ = fs::remove_dir_all(path.parent().expect("parent exists"));
    }

    #[test]
    fn build_response_limits_range() {
        let path = temp_file("activity-store-limit");
        let mut store = ActivityStore::new(path.clone());
        for idx in 0..5 {
            store.record("s", ActionCode::Scan, &format!("INT-{idx}"));
        }
        assert_eq!(store.build_response(Some(0)).entries.len(), 1);
        assert_eq!(store.build_response(Some(3)).entries.len(), 3);
        assert_eq!(store.build_response(Some(999)).entries.len(), 5);

        let _ = fs::remove_dir_all(path.parent().expect("parent exists"));
    }

    #[test]
    fn pending_write_is_compact_and_taken_once() {
        let path = temp_file("activity-store-pending");
        let mut store = ActivityStore::new(path.clone());
        assert!(store.take_pending_write().is_none());

        store.record("s1", ActionCode::Suppress, "ACT-1");
        let pending = store.take_pending_write().expect("dirty store");
        assert_eq!(pending.path, path);
        assert!(!pending.text.contains('\n'));
        assert!(pending.text.starts_with(r#"{"version":1,"entries":[{"#));
        assert!(store.take_pending_write().is_none());

        store.restore_pending();
        assert!(store.take_pending_write().is_some());
    }

    #[test]
    fn load_skips_broken_entries_and_legacy_keys() {
        let path = temp_file("activity-store-load");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        let raw = r#"{
  "version": 1,
  "entries": [
    { "session_id": "legacy", "action_performed": "Scan", "node_id": "INT-0", "created_at": "2025-01-01T00:00:00.000Z" },
    { "sessionId": "s2", "nodeId": 4 },
    { "sessionId": "s3", "actionPerformed": "Scan", "nodeId": "  ", "createdAt": "x" }
  ]
}"#;
        fs::write(&path, raw).expect("write file");

        let store = ActivityStore::new(path.clone());
        let response = store.build_response(None);
        assert_eq!(response.entries.len(), 1);
        assert_eq!(response.entries[0].session_id, "legacy");

        let _ = fs::remove_dir_all(&parent);
    }

    #[test]
    fn unsupported_version_starts_empty() {
        let path = temp_file("activity-store-version");
        let parent = path.parent().expect("parent exists").to_path_buf();
        fs::create_dir_all(&parent).expect("create dir");
        fs::write(&path, r#"{ "version": 7, "entries": [] }"#).expect("write file");
        assert!(ActivityStore::new(path).build_response(None).entries.is_empty());
        let _ = fs::remove_dir_all(&parent);
    }
}
