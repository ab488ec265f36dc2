/// Database Module
///
/// This module provides the database layer for the dashboards, split into
/// two concerns:
/// - **Connection Management** (`connection.rs`): resolves connection targets
///   from configuration and owns the lifecycle of the shared handle
/// - **Query Execution** (`query.rs`): runs the fixed read-only queries and
///   returns untyped result tables
///
/// ## Error Handling
///
/// All database operations use the standardized `DashError` type.
pub mod connection;
pub mod query;

pub use connection::*;
pub use query::*;
