//! Incremental sync engine: extracts changed filmworks from the relational
//! source, transforms them into search documents, and bulk-loads them into
//! the search index, checkpointing each successful pass.
//!
//! The [`orchestrator`] module drives the poll loop; everything else is a
//! collaborator it wires together: [`source`] (streaming change extraction),
//! [`transform`] (row-to-document mapping), [`sink`]/[`loader`] (bulk index
//! writes), [`backoff`] (transient-failure retry), and [`lock`]
//! (single-instance guard).

pub mod backoff;
pub mod config;
pub mod errors;
pub mod loader;
pub mod lock;
pub mod orchestrator;
mod query;
pub mod sink;
pub mod source;
pub mod transform;

pub use errors::EtlError;
