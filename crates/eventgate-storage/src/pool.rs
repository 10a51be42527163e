use std::time::{Duration, Instant};

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::sync::RwLock;
use tracing::{info, warn};

use eventgate_common::PoolSettings;

use crate::storage::{StorageError, StorageResult};

const MAX_CONNECT_RETRIES: u32 = 6;
const CLOSE_WAIT: Duration = Duration::from_secs(5);

struct PoolState {
    db: DatabaseConnection,
    created_at: Instant,
    generation: u64,
}

/// Owns the process's database pool. Connections are established lazily
/// on first acquire (or eagerly via `connect`), retried with exponential
/// backoff, and recycled wholesale once the pool passes its configured
/// age so connect-time credentials do not outlive their tokens.
///
/// Recycling is drain-then-swap: the replacement pool is built first,
/// swapped in under the write lock so new acquisitions route to it, and
/// only then is the old pool closed, with a bounded wait. Handles already
/// checked out keep working against the old pool until released.
pub struct PoolManager {
    dsn: String,
    settings: PoolSettings,
    state: RwLock<Option<PoolState>>,
}

impl PoolManager {
    pub fn new(dsn: impl Into<String>, settings: PoolSettings) -> Self {
        Self {
            dsn: dsn.into(),
            settings,
            state: RwLock::new(None),
        }
    }

    /// Eagerly establish the pool. Equivalent to the first `acquire`.
    pub async fn connect(&self) -> StorageResult<()> {
        self.acquire().await.map(|_| ())
    }

    /// Hand out a pooled handle, creating or recycling the pool first
    /// when needed.
    pub async fn acquire(&self) -> StorageResult<DatabaseConnection> {
        {
            let guard = self.state.read().await;
            if let Some(state) = guard.as_ref()
                && state.created_at.elapsed() < self.settings.recycle_after()
            {
                return Ok(state.db.clone());
            }
        }

        let mut guard = self.state.write().await;
        // Another acquirer may have refreshed the pool while we waited.
        if let Some(state) = guard.as_ref()
            && state.created_at.elapsed() < self.settings.recycle_after()
        {
            return Ok(state.db.clone());
        }

        let generation = guard.as_ref().map_or(1, |state| state.generation + 1);
        let db = self.establish().await?;
        let old = guard.replace(PoolState {
            db: db.clone(),
            created_at: Instant::now(),
            generation,
        });
        drop(guard);

        if let Some(old) = old {
            info!(generation = old.generation, "recycling database pool");
            tokio::spawn(close_pool(old.db, old.generation));
        }

        Ok(db)
    }

    /// Recycle now if the pool has passed its age threshold. Intended
    /// for a periodic task; `acquire` also recycles lazily.
    pub async fn recycle_if_due(&self) -> StorageResult<()> {
        let due = {
            let guard = self.state.read().await;
            guard
                .as_ref()
                .is_some_and(|state| state.created_at.elapsed() >= self.settings.recycle_after())
        };
        if due {
            self.acquire().await?;
        }
        Ok(())
    }

    /// Close the pool at shutdown, waiting a bounded time before giving
    /// up rather than hanging.
    pub async fn close(&self) {
        let state = self.state.write().await.take();
        if let Some(state) = state {
            close_pool(state.db, state.generation).await;
        }
    }

    /// Monotonic pool generation, bumped on every (re)connect.
    pub async fn generation(&self) -> u64 {
        let guard = self.state.read().await;
        guard.as_ref().map_or(0, |state| state.generation)
    }

    async fn establish(&self) -> StorageResult<DatabaseConnection> {
        let mut options = ConnectOptions::new(self.dsn.as_str());
        options
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout());

        let mut last_error = None;
        for attempt in 0..MAX_CONNECT_RETRIES {
            match Database::connect(options.clone()).await {
                Ok(db) => return Ok(db),
                Err(err) => {
                    warn!(
                        attempt = attempt + 1,
                        max = MAX_CONNECT_RETRIES,
                        error = %err,
                        "database connect failed"
                    );
                    last_error = Some(err);
                    if attempt + 1 < MAX_CONNECT_RETRIES {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(StorageError::Unavailable(
            last_error.map_or_else(|| "unknown connect error".to_string(), |err| err.to_string()),
        ))
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt)
}

async fn close_pool(db: DatabaseConnection, generation: u64) {
    match tokio::time::timeout(CLOSE_WAIT, db.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(generation, error = %err, "database pool close failed"),
        Err(_) => warn!(generation, "database pool close timed out, abandoning"),
    }
}
