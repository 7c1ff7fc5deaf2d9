//! Durable checkpoint ledger for the moviesync pipeline.
//!
//! The store records one row per checkpoint write; the effective checkpoint
//! is the most recent row with `successful = 1`, defaulting to the Unix
//! epoch when no successful run exists yet.

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::CheckpointStore;
pub use error::StateError;
pub use sqlite::SqliteCheckpointStore;
