//! Client-side shopping lists.
//!
//! A client keeps its own replica of every list it touches in a local JSON
//! store and edits it offline; `sync_list` pushes the replica to the cluster
//! and folds the canonical copy back in. Quantity validation happens here,
//! at the boundary, so invalid quantities never reach the CRDT.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use cartcast_core::crdt::ShoppingList;
use cartcast_core::error::{ListError, StorageError};
use cartcast_core::protocol::{PeerRequest, PeerResponse, GET_LIST, MERGE_LISTS};
use cartcast_core::storage::{JsonFileStorage, Storage};

/// Upper bound on any request to the cluster.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    List(#[from] ListError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("list {0} does not exist")]
    ListNotFound(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

pub struct ShoppingListClient {
    server_addr: String,
    storage: JsonFileStorage,
    http: reqwest::Client,
}

impl ShoppingListClient {
    /// `server_addr` is any worker in the cluster; requests for lists that
    /// worker does not own get forwarded server-side.
    pub async fn open(
        server_addr: impl Into<String>,
        data_path: impl Into<PathBuf>,
    ) -> ClientResult<Self> {
        let storage = JsonFileStorage::open(data_path).await?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            server_addr: server_addr.into(),
            storage,
            http,
        })
    }

    /// Create a fresh, empty list locally and return its identity.
    pub async fn create_list(&self) -> ClientResult<String> {
        let list = ShoppingList::with_fresh_id();
        self.storage.put(list.list_id(), &list.to_state()).await?;
        Ok(list.list_id().to_string())
    }

    /// Identities of every locally known list.
    pub async fn lists(&self) -> ClientResult<Vec<String>> {
        Ok(self.storage.keys().await?)
    }

    /// The local replica if present, otherwise fetched from the cluster and
    /// cached.
    pub async fn get_list(&self, list_id: &str) -> ClientResult<ShoppingList> {
        if let Some(state) = self.storage.get(list_id).await? {
            return Ok(ShoppingList::from_state(state));
        }
        let request = PeerRequest {
            action: GET_LIST.to_string(),
            list_id: list_id.to_string(),
            list: None,
            id: String::new(),
            port: String::new(),
        };
        let response = self.call(&request).await?;
        if !response_ok(&response) {
            return Err(ClientError::ListNotFound(list_id.to_string()));
        }
        let Some(state) = response.list else {
            return Err(ClientError::ListNotFound(list_id.to_string()));
        };
        self.storage.put(list_id, &state).await?;
        Ok(ShoppingList::from_state(state))
    }

    pub async fn add_item(&self, list_id: &str, name: &str, quantity: i64) -> ClientResult<()> {
        if quantity <= 0 {
            return Err(ListError::InvalidQuantity(quantity).into());
        }
        let mut list = self.get_list(list_id).await?;
        list.add(name, quantity);
        self.storage.put(list_id, &list.to_state()).await?;
        Ok(())
    }

    pub async fn remove_item(&self, list_id: &str, name: &str, quantity: i64) -> ClientResult<()> {
        if quantity <= 0 {
            return Err(ListError::InvalidQuantity(quantity).into());
        }
        let mut list = self.get_list(list_id).await?;
        list.remove(name, quantity)?;
        self.storage.put(list_id, &list.to_state()).await?;
        Ok(())
    }

    /// Push the local replica to the cluster and merge the canonical state
    /// back into the local copy.
    pub async fn sync_list(&self, list_id: &str) -> ClientResult<ShoppingList> {
        let Some(local_state) = self.storage.get(list_id).await? else {
            return Err(ClientError::ListNotFound(list_id.to_string()));
        };
        let request = PeerRequest {
            action: MERGE_LISTS.to_string(),
            list_id: list_id.to_string(),
            list: Some(local_state.clone()),
            id: String::new(),
            port: String::new(),
        };
        let response = self.call(&request).await?;
        if !response_ok(&response) {
            return Err(ClientError::Server(
                response
                    .message
                    .unwrap_or_else(|| "sync rejected".to_string()),
            ));
        }
        let mut local = ShoppingList::from_state(local_state);
        if let Some(canonical) = response.list {
            local.merge(&canonical);
        }
        self.storage.put(list_id, &local.to_state()).await?;
        Ok(local)
    }

    async fn call(&self, request: &PeerRequest) -> ClientResult<PeerResponse> {
        let url = format!("http://{}/rpc", self.server_addr);
        let response = self.http.post(&url).json(request).send().await?;
        Ok(response.json::<PeerResponse>().await?)
    }
}

fn response_ok(response: &PeerResponse) -> bool {
    response.status == cartcast_core::protocol::Status::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn offline_client(dir: &tempfile::TempDir) -> ShoppingListClient {
        // Nothing listens on this address; these tests stay local.
        ShoppingListClient::open("127.0.0.1:1", dir.path().join("lists.json"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_add_get_cycle_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir).await;

        let list_id = client.create_list().await.unwrap();
        client.add_item(&list_id, "milk", 2).await.unwrap();
        client.remove_item(&list_id, "milk", 1).await.unwrap();

        let list = client.get_list(&list_id).await.unwrap();
        assert_eq!(list.view().get("milk"), Some(&1));
        assert_eq!(client.lists().await.unwrap(), vec![list_id]);
    }

    #[tokio::test]
    async fn quantity_validation_happens_at_the_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir).await;
        let list_id = client.create_list().await.unwrap();

        let err = client.add_item(&list_id, "milk", 0).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::List(ListError::InvalidQuantity(0))
        ));
        let err = client.remove_item(&list_id, "milk", -2).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::List(ListError::InvalidQuantity(-2))
        ));
        assert!(client.get_list(&list_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_an_item_that_was_never_added_fails() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir).await;
        let list_id = client.create_list().await.unwrap();

        let err = client.remove_item(&list_id, "eggs", 1).await.unwrap_err();
        assert!(matches!(err, ClientError::List(ListError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn operations_on_unknown_lists_report_list_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let client = offline_client(&dir).await;

        let err = client.sync_list("missing").await.unwrap_err();
        assert!(matches!(err, ClientError::ListNotFound(_)));
    }
}
