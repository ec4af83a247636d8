//! The `Storage` collaborator: durable list state keyed by list id.
//!
//! Workers and clients both persist through this trait; the core never
//! assumes anything beyond get/put/delete/keys.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::crdt::ListState;
use crate::error::StorageError;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<ListState>, StorageError>;
    async fn put(&self, key: &str, state: &ListState) -> Result<(), StorageError>;
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// JSON-file backed storage: one file holding `{list_id: ListState, ...}`.
///
/// The whole map is loaded at open and rewritten on every mutation. Fine for
/// the list counts a single worker holds; a worker that outgrows this swaps
/// the implementation, not the trait.
pub struct JsonFileStorage {
    path: PathBuf,
    data: Mutex<BTreeMap<String, ListState>>,
}

impl JsonFileStorage {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let empty = BTreeMap::new();
                tokio::fs::write(&path, serde_json::to_vec(&empty)?).await?;
                empty
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), lists = data.len(), "opened list store");
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    async fn flush(&self, data: &BTreeMap<String, ListState>) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn get(&self, key: &str) -> Result<Option<ListState>, StorageError> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, state: &ListState) -> Result<(), StorageError> {
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), state.clone());
        self.flush(&data).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut data = self.data.lock().await;
        if data.remove(key).is_some() {
            self.flush(&data).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.data.lock().await.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::ShoppingList;

    fn sample_state(id: &str) -> ListState {
        let mut list = ShoppingList::new(id);
        list.add("milk", 2);
        list.add("bread", 1);
        list.to_state()
    }

    #[tokio::test]
    async fn put_get_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStorage::open(dir.path().join("lists.json"))
            .await
            .unwrap();

        assert!(store.get("a").await.unwrap().is_none());

        let state = sample_state("a");
        store.put("a", &state).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(state));
        assert_eq!(store.keys().await.unwrap(), vec!["a".to_string()]);

        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_key_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStorage::open(dir.path().join("lists.json"))
            .await
            .unwrap();
        store.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn contents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/lists.json");

        let state = sample_state("persisted");
        {
            let store = JsonFileStorage::open(&path).await.unwrap();
            store.put("persisted", &state).await.unwrap();
        }

        let reopened = JsonFileStorage::open(&path).await.unwrap();
        assert_eq!(reopened.get("persisted").await.unwrap(), Some(state));
    }
}
