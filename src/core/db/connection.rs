/// Connection Management Module
///
/// This module turns a dashboard's credentials into a connection target and
/// owns the lifecycle of the handle built from it. Handles are held by an
/// explicit `ConnectionProvider` rather than process-wide state, so each
/// dashboard (or test) decides when a handle is opened, refreshed and closed.

use crate::config::{load_config, Config};
use crate::core::db::query::{Database, SqliteDatabase};
use crate::core::{DashError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_SERVER: &str = "localhost";
pub const DEFAULT_DATABASE: &str = "eoc";
/// Fixed ODBC options appended to synthesized SQL Server targets
pub const DRIVER_OPTIONS: &str =
    "driver=ODBC+Driver+17+for+SQL+Server&trusted_connection=yes&TrustServerCertificate=yes";

/// Schema name the dashboards' queries qualify their tables with
const QUERY_SCHEMA: &str = "dbo";

/// Resolves the connection target for a config.
///
/// An explicit `url` always wins; otherwise a SQL Server target is built from
/// `db_server` and `db_database` with the fixed driver options.
pub fn resolve_target(config: &Config) -> String {
    if let Some(url) = config.url() {
        return url.to_string();
    }
    format!(
        "mssql+pyodbc://{}/{}?{}",
        config.db_server().unwrap_or(DEFAULT_SERVER),
        config.db_database().unwrap_or(DEFAULT_DATABASE),
        DRIVER_OPTIONS
    )
}

/// Opens database handles for resolved connection targets
pub trait Connector: Send + Sync {
    fn connect(&self, target: &str) -> Result<Arc<dyn Database>>;
}

/// Connector for SQLite targets.
///
/// Accepts `sqlite::memory:`, `sqlite://<relative path>` and
/// `sqlite:///<absolute path>`. File databases are opened read-only and
/// attached a second time as `dbo`, so `dbo.Table` references resolve.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteConnector;

impl SqliteConnector {
    fn open_file(path: &str) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            DashError::ConnectionUnavailable(format!("cannot open '{}': {}", path, e))
        })?;
        conn.execute(&format!("ATTACH DATABASE ?1 AS {}", QUERY_SCHEMA), [path])
            .map_err(|e| {
                DashError::ConnectionUnavailable(format!(
                    "cannot attach '{}' as {}: {}",
                    path, QUERY_SCHEMA, e
                ))
            })?;
        Ok(conn)
    }
}

impl Connector for SqliteConnector {
    fn connect(&self, target: &str) -> Result<Arc<dyn Database>> {
        let conn = if target == "sqlite::memory:" || target == "sqlite://:memory:" {
            Connection::open_in_memory()?
        } else if let Some(path) = target.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path.is_empty() {
                return Err(DashError::ConnectionUnavailable(
                    "sqlite target has no database path".to_string(),
                ));
            }
            Self::open_file(path)?
        } else {
            // only the scheme is reported, targets may carry credentials
            let scheme = target.split("://").next().unwrap_or_default();
            return Err(DashError::ConnectionUnavailable(format!(
                "unsupported connection scheme '{}'",
                scheme
            )));
        };
        Ok(Arc::new(SqliteDatabase::new(conn)))
    }
}

struct OpenHandle {
    target: String,
    handle: Arc<dyn Database>,
    opened_at: Instant,
}

/// Owns the connection handle for one dashboard.
///
/// The handle is built on first use and reused until `close` is called or,
/// when a TTL is set, until it is older than the TTL. A failed construction
/// is not remembered; the next call tries again.
pub struct ConnectionProvider {
    connector: Arc<dyn Connector>,
    config_path: PathBuf,
    ttl: Option<Duration>,
    state: Mutex<Option<OpenHandle>>,
}

impl ConnectionProvider {
    pub fn new(connector: Arc<dyn Connector>, config_path: impl Into<PathBuf>) -> Self {
        ConnectionProvider {
            connector,
            config_path: config_path.into(),
            ttl: None,
            state: Mutex::new(None),
        }
    }

    /// Limits how long a handle is reused before `refresh` rebuilds it
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<OpenHandle>>> {
        self.state
            .lock()
            .map_err(|_| DashError::ConnectionUnavailable("connection state lock poisoned".to_string()))
    }

    fn build(&self) -> Result<OpenHandle> {
        let config = load_config(&self.config_path)?
            .ok_or_else(|| DashError::ConfigMissing(self.config_path.clone()))?;
        let target = resolve_target(&config);
        let handle = self.connector.connect(&target)?;
        Ok(OpenHandle {
            target,
            handle,
            opened_at: Instant::now(),
        })
    }

    /// Opens the handle, or returns the one already open
    pub fn open(&self) -> Result<Arc<dyn Database>> {
        let mut state = self.lock()?;
        if let Some(open) = state.as_ref() {
            debug!(config = %self.config_path.display(), "reusing open connection");
            return Ok(open.handle.clone());
        }
        let open = self.build().map_err(|e| {
            warn!(config = %self.config_path.display(), error = %e, "connection construction failed");
            e
        })?;
        info!(config = %self.config_path.display(), "connection opened");
        let handle = open.handle.clone();
        *state = Some(open);
        Ok(handle)
    }

    /// Rebuilds the handle if it has outlived its TTL.
    ///
    /// Returns `true` when a rebuild happened. Without a TTL, or with no open
    /// handle, this is a no-op. The config file is re-read on rebuild; when
    /// it resolves to the same target the new handle simply replaces the old.
    pub fn refresh(&self) -> Result<bool> {
        let Some(ttl) = self.ttl else {
            return Ok(false);
        };
        let mut state = self.lock()?;
        let expired = state
            .as_ref()
            .map(|open| open.opened_at.elapsed() >= ttl)
            .unwrap_or(false);
        if !expired {
            return Ok(false);
        }
        // drop the stale handle first so a failed rebuild leaves nothing behind
        let stale = state.take();
        let open = self.build()?;
        if stale.map(|s| s.target != open.target).unwrap_or(true) {
            info!(config = %self.config_path.display(), "connection target changed on refresh");
        }
        debug!(config = %self.config_path.display(), "connection refreshed");
        *state = Some(open);
        Ok(true)
    }

    /// Returns a usable handle, refreshing or opening as needed
    pub fn handle(&self) -> Result<Arc<dyn Database>> {
        self.refresh()?;
        self.open()
    }

    /// Drops the handle; the next `open` builds a new one
    pub fn close(&self) -> Result<()> {
        if self.lock()?.take().is_some() {
            info!(config = %self.config_path.display(), "connection closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .map(|s| s.is_some())
            .unwrap_or(false)
    }

    /// The resolved target of the open handle, if any
    pub fn target(&self) -> Option<String> {
        self.state.lock().ok()?.as_ref().map(|o| o.target.clone())
    }
}
