//! Indexer boundary: snapshot reads, listener notification, id validation.

mod client;
mod ids;
mod target;

pub use client::{IndexerClient, IndexerConfig, IndexerError, ListenerNotify, SnapshotSource};
pub use ids::{parse_tx_hash, parse_uid, short, IdError};
pub use target::PollTarget;
