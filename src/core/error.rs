/// Dashfeed Error Module
///
/// This module defines the error taxonomy for the dashboard data pipeline.
/// Every failure that can occur between reading a credentials file and
/// handing a normalized table to the presentation layer maps onto one of
/// these variants.
use std::path::PathBuf;
use thiserror::Error;

/// Error type for the dashboard data pipeline.
///
/// The first three variants are the user-facing conditions of the pipeline:
/// - `ConfigMissing`: the per-dashboard credentials file does not exist
/// - `ConnectionUnavailable`: no usable connection could be built
/// - `QueryFailed`: executing a dashboard query failed for any reason
///
/// The rest are conversions from the libraries the pipeline sits on.
#[derive(Error, Debug)]
pub enum DashError {
    /// The dashboard's key=value credentials file was not found
    #[error("Configuration file not found: {}", .0.display())]
    ConfigMissing(PathBuf),

    /// A connection handle could not be constructed
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// Query execution failed (network, syntax, permission, missing handle)
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Column typing could not be applied to a result table
    #[error("Normalization error: {0}")]
    Normalize(String),

    /// Application settings could not be loaded
    #[error("Settings error: {0}")]
    Settings(String),

    /// Database-related errors from SQLite operations
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON export errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DashError {
    /// Message carried by the error, without the variant prefix.
    ///
    /// Used when an error is re-classified at the fetch boundary so the
    /// message does not pick up a second "Query failed:" prefix.
    pub fn detail(&self) -> String {
        match self {
            DashError::QueryFailed(msg)
            | DashError::ConnectionUnavailable(msg)
            | DashError::Normalize(msg)
            | DashError::Settings(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

/// Type alias for Result to use DashError as the error type.
pub type Result<T> = std::result::Result<T, DashError>;
