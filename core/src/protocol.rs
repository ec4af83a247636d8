//! Wire shapes exchanged between workers and clients, and the identity
//! derivations both sides must agree on.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::crdt::ListState;

/// Fetch the canonical copy of a list from its owner.
pub const GET_LIST: &str = "get_list";
/// Push a client's OR-Set state into the canonical copy.
pub const MERGE_LISTS: &str = "merge_lists";
/// Peer-to-peer replica push; executes wherever it lands.
pub const MERGE_REPLICAS: &str = "merge_replicas";

/// A worker's identity: the hex SHA-256 of its advertised address.
///
/// Deterministic, so every node derives the same total order over the ring,
/// and stable across restarts as long as the address is stable.
pub fn node_id_for_addr(addr: &str) -> String {
    hex::encode(Sha256::digest(addr.as_bytes()))
}

/// A fresh list identity when the caller did not supply one.
pub fn fresh_list_id() -> String {
    hex::encode(Sha256::digest(Uuid::new_v4().to_string().as_bytes()))
}

/// Epoch seconds, fractional. Heartbeats and ring timestamps use this unit.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// A peer/client RPC request.
///
/// `action` stays a plain string so unrecognized values reach the router and
/// come back as an explicit error response instead of failing to parse.
/// `id`/`port` identify the sender; clients leave them empty.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerRequest {
    pub action: String,
    pub list_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListState>,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub port: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// A peer/client RPC response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerResponse {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<ListState>,
}

impl PeerResponse {
    pub fn success(list: ListState) -> Self {
        Self {
            status: Status::Success,
            message: None,
            list: Some(list),
        }
    }

    pub fn success_with(message: impl Into<String>, list: ListState) -> Self {
        Self {
            status: Status::Success,
            message: Some(message.into()),
            list: Some(list),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            list: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// One liveness announcement, broadcast over the message bus.
///
/// `port` carries the sender's reachable address; `timestamp` is epoch
/// seconds at send time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub id: String,
    pub port: String,
    pub timestamp: f64,
}
