use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stored identity data for one chat member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub username: Option<String>,
    #[serde(default = "default_first_name")]
    pub first_name: String,
}

/// Placeholder used when Telegram gives us no usable first name.
pub const NAME_PLACEHOLDER: &str = "Member";

fn default_first_name() -> String {
    NAME_PLACEHOLDER.to_string()
}

/// Members of a single chat, keyed by user id.
pub type ChatMembers = BTreeMap<u64, MemberRecord>;

/// The whole persisted store: chat id -> members of that chat.
///
/// serde_json writes the integer keys as JSON object keys, so the on-disk
/// shape is `{ "<chat_id>": { "<user_id>": { "username": ..., "first_name": ... } } }`.
pub type MemberMap = BTreeMap<i64, ChatMembers>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read member store: {0}")]
    Read(#[source] std::io::Error),
    #[error("member store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("failed to write member store: {0}")]
    Write(#[source] std::io::Error),
}

/// Load-all/save-all backend behind the registry.
///
/// The store is tiny (tens to low thousands of records), so every mutation
/// rewrites the whole file. Injected as a trait so tests can swap in a
/// throwaway backend.
pub trait MemberStore: Send + Sync {
    fn load(&self) -> Result<MemberMap, StorageError>;
    fn save(&self, members: &MemberMap) -> Result<(), StorageError>;
}

/// Single-file JSON store, the bot's only production backend.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MemberStore for JsonFileStore {
    fn load(&self) -> Result<MemberMap, StorageError> {
        if !self.path.exists() {
            return Ok(MemberMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(StorageError::Read)?;
        let members = serde_json::from_str(&content)?;
        Ok(members)
    }

    fn save(&self, members: &MemberMap) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(members)?;
        std::fs::write(&self.path, json).map_err(StorageError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(username: Option<&str>, first_name: &str) -> MemberRecord {
        MemberRecord {
            username: username.map(str::to_string),
            first_name: first_name.to_string(),
        }
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("members.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("members.json"));

        let mut members = MemberMap::new();
        let chat = members.entry(-100123).or_default();
        chat.insert(10, record(Some("alice"), "Alice"));
        chat.insert(11, record(None, "Боб"));

        store.save(&members).unwrap();
        assert_eq!(store.load().unwrap(), members);
    }

    #[test]
    fn test_on_disk_shape_is_string_keyed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        let store = JsonFileStore::new(&path);

        let mut members = MemberMap::new();
        members
            .entry(42)
            .or_default()
            .insert(10, record(Some("alice"), "Alice"));
        store.save(&members).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["42"]["10"]["username"], "alice");
        assert_eq!(raw["42"]["10"]["first_name"], "Alice");
    }

    #[test]
    fn test_null_username_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        let store = JsonFileStore::new(&path);

        let mut members = MemberMap::new();
        members.entry(1).or_default().insert(7, record(None, "Bob"));
        store.save(&members).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"username\": null"));
        assert_eq!(store.load().unwrap()[&1][&7].username, None);
    }

    #[test]
    fn test_corrupt_file_is_a_corrupt_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert!(matches!(store.load(), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_missing_first_name_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        std::fs::write(&path, r#"{ "1": { "7": { "username": "alice" } } }"#).unwrap();

        let store = JsonFileStore::new(&path);
        let members = store.load().unwrap();
        assert_eq!(members[&1][&7].first_name, NAME_PLACEHOLDER);
    }
}
