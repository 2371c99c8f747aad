//! Cell simulation side: entities, per-tick scheduling and the witness that
//! replicates the area of interest of each connected client.

pub mod config;
pub mod tick;
pub mod entity;
pub mod trigger;
pub mod member;
pub mod volatile;
pub mod witness;
