//! Core building blocks for cartcast workers and clients.
//!
//! This crate holds everything that does not touch the ring or the network
//! loops directly:
//! - [`crdt`]: the OR-Set shopping list, the one data structure replicas
//!   exchange. Merges are commutative, associative and idempotent, so any
//!   two replicas converge no matter how their updates interleave.
//! - [`protocol`]: wire shapes for peer RPC and heartbeat gossip, plus the
//!   deterministic identity derivations for nodes and lists.
//! - [`storage`]: the `Storage` collaborator (JSON-file backed).
//! - [`bus`]: the `MessageBus` collaborator used to fan heartbeats out to
//!   every worker (in-process bus for tests, TCP relay bus for deployments).
//! - [`config`]: env-driven worker configuration.

pub mod bus;
pub mod config;
pub mod crdt;
pub mod error;
pub mod protocol;
pub mod storage;

pub use bus::{LocalBus, MessageBus, RelayBus};
pub use config::NodeConfig;
pub use crdt::{Entry, ListState, ShoppingList, Tag};
pub use error::{BusError, ListError, StorageError};
pub use protocol::{Heartbeat, PeerRequest, PeerResponse, Status};
pub use storage::{JsonFileStorage, Storage};
