//! Runtime configuration for one pipeline process.

use std::time::Duration;

/// Relational source connection parameters.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

/// Search index endpoint.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Base URL, e.g. `http://127.0.0.1:9200`.
    pub url: String,
}

/// Full engine configuration, assembled by the CLI from flags/env.
#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub source: SourceConfig,
    pub index: IndexConfig,
    /// Minimum interval between two extraction passes.
    pub frequency: Duration,
}
