/// Core Module for Dashfeed
///
/// This module contains the shared infrastructure the dashboard pipeline
/// is built on: the error taxonomy and the database layer (connections
/// and query execution).

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{DashError, Result};
