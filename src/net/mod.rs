//! Client replication protocol: elements, bundles and the outbound channel.

pub mod element;
pub mod bundle;
pub mod channel;

pub mod client;
