//! Area-of-interest replication core for a distributed MMO cell server.
//!
//! For each player entity with a connected client, a [`cell::witness::Witness`]
//! maintains the set of other entities visible to that client and encodes, once
//! per simulation tick, an incremental update frame (enter-world, leave-world,
//! position and direction deltas) into the client's outbound channel under a
//! hard per-packet size budget.

pub mod util;

pub mod net;
pub mod cell;
