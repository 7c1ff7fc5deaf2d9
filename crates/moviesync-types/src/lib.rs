//! Shared domain model for the moviesync pipeline.
//!
//! Source-side types ([`filmwork`]) describe one denormalized row as read
//! from the relational store; index-side types ([`document`]) describe the
//! document shape written to the search index.

pub mod document;
pub mod filmwork;
pub mod role;

pub use document::{MovieDoc, PersonRef};
pub use filmwork::{FilmworkRow, PersonEdge};
pub use role::Role;
