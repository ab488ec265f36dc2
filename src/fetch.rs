//! Executes a dashboard's fixed query through its connection provider,
//! memoizing the result for the dashboard's TTL
use crate::cache::QueryCache;
use crate::core::db::{ConnectionProvider, QueryDef, RawTable};
use crate::core::{DashError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

pub struct DataFetcher {
    provider: Arc<ConnectionProvider>,
    cache: QueryCache,
}

impl DataFetcher {
    pub fn new(provider: Arc<ConnectionProvider>, ttl: Duration, capacity: u64) -> Self {
        DataFetcher {
            provider,
            cache: QueryCache::new(ttl, capacity),
        }
    }

    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }

    /// Returns the rows for `query`, from cache while they are fresh.
    ///
    /// Every failure, including a connection that cannot be built, comes
    /// back as `DashError::QueryFailed`. There are no retries; the next call
    /// after a failure executes again.
    pub fn fetch(&self, query: &QueryDef) -> Result<Arc<RawTable>> {
        self.cache.get_or_fetch(query.name, || self.execute(query))
    }

    fn execute(&self, query: &QueryDef) -> Result<Arc<RawTable>> {
        let handle = self.provider.handle().map_err(|e| {
            error!(query = query.name, error = %e, "no connection, query not executed");
            DashError::QueryFailed(e.to_string())
        })?;

        let started = Instant::now();
        let table = handle.query(query.sql).map_err(|e| {
            error!(query = query.name, error = %e, "query failed");
            DashError::QueryFailed(e.detail())
        })?;
        info!(
            query = query.name,
            rows = table.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched"
        );
        Ok(Arc::new(table))
    }

    /// Drops the cached rows for `query` so the next fetch executes it
    pub fn invalidate(&self, query: &QueryDef) {
        self.cache.invalidate(query.name);
    }
}
