//! The cartcast worker node.
//!
//! A worker runs three concurrent duties over one shared state (ring + list
//! cache + neighbor sets, all behind a single lock):
//! - the RPC server, dispatching client and peer requests through the
//!   [`router`]
//! - the heartbeat loop, announcing this node on the message bus and
//!   evicting peers that have gone silent ([`gossip`])
//! - the heartbeat listener, folding peer announcements into the ring
//!   ([`gossip`])
//!
//! Membership changes flow into [`replication`], which keeps every list on
//! its owner and the owner's successor neighbors, pushing and deleting
//! copies as the ring moves underneath them.

pub mod error;
pub mod gossip;
pub mod node;
pub mod replication;
pub mod router;
pub mod rpc;
pub mod state;

pub use error::{WorkerError, WorkerResult};
pub use node::Worker;
pub use rpc::PeerClient;
