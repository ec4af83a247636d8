//! In-memory cluster membership ring.
//!
//! This crate provides:
//! - A membership table sorted by node identity (identities are hex digests
//!   of node addresses, so every node derives the same total order)
//! - Successor-rule key ownership with wraparound, resolved through the
//!   sorted index rather than a scan
//! - Neighbor sets (next-N / previous-N) and the replica holder set used by
//!   rebalancing
//! - A staleness scan for heartbeat-based failure detection
//!
//! Everything here is a pure in-memory structure: no I/O, no clocks, no
//! failures beyond programmer error. The worker crate owns the loops that
//! feed it heartbeats and react to membership changes.

mod ring;

pub use ring::{Neighbors, Ring, WorkerNode};
