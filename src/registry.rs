use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::storage::{ChatMembers, MemberMap, MemberRecord, MemberStore, StorageError, NAME_PLACEHOLDER};

/// Per-chat participant registry over an injected load-all/save-all backend.
///
/// Every mutation is a full read-modify-write cycle over the persisted store,
/// serialized by a single writer lock so overlapping updates cannot clobber
/// each other at file granularity.
pub struct Registry {
    store: Mutex<Box<dyn MemberStore>>,
}

impl Registry {
    pub fn new(store: Box<dyn MemberStore>) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Record (or refresh) one member of a chat. Bots are never stored.
    ///
    /// A corrupt or unreadable existing store is logged and treated as empty;
    /// the write that follows starts the store over. Write failures propagate.
    pub async fn upsert(
        &self,
        chat_id: i64,
        user_id: u64,
        username: Option<&str>,
        first_name: Option<&str>,
        is_bot: bool,
    ) -> Result<(), StorageError> {
        if is_bot {
            debug!("Skipping bot user {} in chat {}", user_id, chat_id);
            return Ok(());
        }

        let record = MemberRecord {
            username: username.map(str::to_string),
            first_name: first_name
                .filter(|name| !name.is_empty())
                .unwrap_or(NAME_PLACEHOLDER)
                .to_string(),
        };

        let store = self.store.lock().await;
        let mut members = Self::load_or_empty(store.as_ref());
        members.entry(chat_id).or_default().insert(user_id, record);
        store.save(&members)
    }

    /// All recorded members of a chat; empty if the chat is unknown or the
    /// store cannot be read.
    pub async fn list_for_chat(&self, chat_id: i64) -> ChatMembers {
        let store = self.store.lock().await;
        Self::load_or_empty(store.as_ref())
            .remove(&chat_id)
            .unwrap_or_default()
    }

    /// Drop every record for one chat, returning how many were removed.
    /// The caller is responsible for having authorized this.
    pub async fn clear_chat(&self, chat_id: i64) -> Result<usize, StorageError> {
        let store = self.store.lock().await;
        let mut members = Self::load_or_empty(store.as_ref());
        let removed = members.remove(&chat_id).map(|chat| chat.len()).unwrap_or(0);
        if removed > 0 {
            store.save(&members)?;
        }
        Ok(removed)
    }

    fn load_or_empty(store: &dyn MemberStore) -> MemberMap {
        match store.load() {
            Ok(members) => members,
            Err(e) => {
                warn!("Member store unreadable, starting from empty: {}", e);
                MemberMap::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::JsonFileStore;
    use std::sync::Mutex as StdMutex;

    /// Test double keeping the store in memory.
    struct InMemoryStore {
        members: StdMutex<MemberMap>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self {
                members: StdMutex::new(MemberMap::new()),
            }
        }
    }

    impl MemberStore for InMemoryStore {
        fn load(&self) -> Result<MemberMap, StorageError> {
            Ok(self.members.lock().unwrap().clone())
        }

        fn save(&self, members: &MemberMap) -> Result<(), StorageError> {
            *self.members.lock().unwrap() = members.clone();
            Ok(())
        }
    }

    fn registry() -> Registry {
        Registry::new(Box::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_upsert_then_list() {
        let registry = registry();
        registry
            .upsert(1, 10, Some("alice"), Some("Alice"), false)
            .await
            .unwrap();

        let members = registry.list_for_chat(1).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[&10].username.as_deref(), Some("alice"));
        assert_eq!(members[&10].first_name, "Alice");
    }

    #[tokio::test]
    async fn test_upsert_overwrites_with_last_values() {
        let registry = registry();
        registry
            .upsert(1, 10, Some("alice"), Some("Alice"), false)
            .await
            .unwrap();
        registry
            .upsert(1, 10, None, Some("Alicia"), false)
            .await
            .unwrap();

        let members = registry.list_for_chat(1).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[&10].username, None);
        assert_eq!(members[&10].first_name, "Alicia");
    }

    #[tokio::test]
    async fn test_bot_upsert_is_a_no_op() {
        let registry = registry();
        registry
            .upsert(1, 99, Some("spam_bot"), Some("Spam"), true)
            .await
            .unwrap();

        assert!(registry.list_for_chat(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_first_name_stored_as_placeholder() {
        let registry = registry();
        registry.upsert(1, 10, None, None, false).await.unwrap();

        let members = registry.list_for_chat(1).await;
        assert_eq!(members[&10].first_name, NAME_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_unknown_chat_lists_empty() {
        let registry = registry();
        assert!(registry.list_for_chat(404).await.is_empty());
    }

    #[tokio::test]
    async fn test_chats_are_isolated() {
        let registry = registry();
        registry
            .upsert(1, 10, Some("alice"), Some("Alice"), false)
            .await
            .unwrap();
        registry
            .upsert(2, 20, Some("bob"), Some("Bob"), false)
            .await
            .unwrap();

        assert_eq!(registry.list_for_chat(1).await.len(), 1);
        assert_eq!(registry.list_for_chat(2).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_chat_reports_count_and_empties() {
        let registry = registry();
        for user_id in [10, 11, 12] {
            registry
                .upsert(1, user_id, None, Some("Someone"), false)
                .await
                .unwrap();
        }
        registry
            .upsert(2, 20, Some("bob"), Some("Bob"), false)
            .await
            .unwrap();

        assert_eq!(registry.clear_chat(1).await.unwrap(), 3);
        assert!(registry.list_for_chat(1).await.is_empty());
        // Other chats untouched
        assert_eq!(registry.list_for_chat(2).await.len(), 1);
        // Clearing again removes nothing
        assert_eq!(registry.clear_chat(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_store_restarts_empty_on_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("members.json");
        std::fs::write(&path, "{ broken").unwrap();

        let registry = Registry::new(Box::new(JsonFileStore::new(&path)));
        registry
            .upsert(1, 10, Some("alice"), Some("Alice"), false)
            .await
            .unwrap();

        let members = registry.list_for_chat(1).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[&10].username.as_deref(), Some("alice"));
    }
}
