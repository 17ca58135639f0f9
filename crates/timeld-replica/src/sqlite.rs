//! Single-node SQLite substrate.
//!
//! Each domain lives in `<path>/replica.db`. There are no peers: a replica
//! becomes online and current as soon as its local state has been checked.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use timeld_db::queries::{meta, subjects};
use timeld_types::{DomainConfig, Subject, Update};
use tokio::sync::{broadcast, watch, Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::{Replica, ReplicaError, ReplicaStatus, Result, Substrate, WriteTxn};

/// Default capacity of each replica's update channel.
pub const DEFAULT_UPDATE_CAPACITY: usize = 256;

/// Opens replicas as local SQLite files.
#[derive(Clone, Debug)]
pub struct SqliteSubstrate {
    catch_up: bool,
    capacity: usize,
}

impl Default for SqliteSubstrate {
    fn default() -> Self {
        Self {
            catch_up: true,
            capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

impl SqliteSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether opened replicas catch up (and so become online) by themselves.
    ///
    /// Disabled replicas stay `outdated` until [`SqliteReplica::set_status`]
    /// is called, which lets callers exercise status waits.
    pub fn with_catch_up(mut self, catch_up: bool) -> Self {
        self.catch_up = catch_up;
        self
    }

    /// Capacity of each replica's update channel.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

impl Substrate for SqliteSubstrate {
    type Replica = SqliteReplica;

    async fn open(&self, config: DomainConfig, path: &Path) -> Result<SqliteReplica> {
        std::fs::create_dir_all(path)?;
        let conn = timeld_db::open(&path.join(timeld_db::REPLICA_FILE))?;

        match meta::get_opt(&conn, meta::DOMAIN)? {
            Some(found) if found != config.domain => {
                return Err(ReplicaError::DomainMismatch {
                    expected: config.domain,
                    found,
                });
            }
            Some(_) => debug!(domain = %config.domain, "Reopening existing replica"),
            None => {
                meta::set(&conn, meta::DOMAIN, &config.domain)?;
                meta::set(
                    &conn,
                    meta::GENESIS,
                    if config.genesis { "true" } else { "false" },
                )?;
            }
        }

        let (status, _) = watch::channel(ReplicaStatus::OPENING);
        let (updates, _) = broadcast::channel(self.capacity);
        let inner = Arc::new(Inner {
            domain: config.domain,
            conn: Mutex::new(Some(conn)),
            gate: Arc::new(Mutex::new(())),
            status,
            updates,
        });

        info!(domain = %inner.domain, genesis = config.genesis, "Replica opened");

        if self.catch_up {
            let inner = inner.clone();
            tokio::spawn(async move { inner.catch_up().await });
        }

        Ok(SqliteReplica { inner })
    }
}

struct Inner {
    domain: String,
    /// `None` once closed.
    conn: Mutex<Option<Connection>>,
    /// Held for the lifetime of a write transaction.
    gate: Arc<Mutex<()>>,
    status: watch::Sender<ReplicaStatus>,
    updates: broadcast::Sender<Update>,
}

impl Inner {
    async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> timeld_db::Result<T>,
    ) -> Result<T> {
        let guard = self.conn.lock().await;
        let conn = guard
            .as_ref()
            .ok_or_else(|| ReplicaError::Closed(self.domain.clone()))?;
        Ok(f(conn)?)
    }

    async fn catch_up(&self) {
        match self.with_conn(subjects::count).await {
            Ok(count) => {
                debug!(domain = %self.domain, subjects = count, "Replica caught up");
                self.status.send_replace(ReplicaStatus::CURRENT);
            }
            Err(ReplicaError::Closed(_)) => {}
            Err(e) => warn!(domain = %self.domain, error = %e, "Replica catch-up failed"),
        }
    }
}

/// A replica backed by one SQLite file.
#[derive(Clone)]
pub struct SqliteReplica {
    inner: Arc<Inner>,
}

impl SqliteReplica {
    /// Override the replica status.
    pub fn set_status(&self, status: ReplicaStatus) {
        self.inner.status.send_replace(status);
    }

    /// Whether this replica created its domain.
    pub async fn is_genesis(&self) -> Result<bool> {
        self.inner
            .with_conn(|conn| meta::get_bool(conn, meta::GENESIS, false))
            .await
    }
}

impl std::fmt::Debug for SqliteReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteReplica")
            .field("domain", &self.inner.domain)
            .finish_non_exhaustive()
    }
}

impl Replica for SqliteReplica {
    type Txn = SqliteTxn;

    fn domain(&self) -> &str {
        &self.inner.domain
    }

    async fn get(&self, id: &str) -> Result<Option<Subject>> {
        self.inner.with_conn(|conn| subjects::get(conn, id)).await
    }

    async fn select(&self, kind: Option<&str>) -> Result<Vec<Subject>> {
        self.inner.with_conn(|conn| subjects::list(conn, kind)).await
    }

    async fn transact(&self) -> Result<SqliteTxn> {
        let gate = self.inner.gate.clone().lock_owned().await;
        if self.inner.conn.lock().await.is_none() {
            return Err(ReplicaError::Closed(self.inner.domain.clone()));
        }
        Ok(SqliteTxn {
            inner: self.inner.clone(),
            _gate: gate,
            staged: Update::default(),
        })
    }

    async fn write(&self, update: Update) -> Result<()> {
        let mut txn = self.transact().await?;
        txn.stage(update);
        txn.commit().await
    }

    fn status(&self) -> watch::Receiver<ReplicaStatus> {
        self.inner.status.subscribe()
    }

    fn follow(&self) -> broadcast::Receiver<Update> {
        self.inner.updates.subscribe()
    }

    async fn close(&self) -> Result<()> {
        let conn = self.inner.conn.lock().await.take();
        match conn {
            Some(conn) => {
                self.inner.status.send_replace(ReplicaStatus::OPENING);
                conn.close().map_err(|(_, e)| timeld_db::DbError::Sqlite(e))?;
                info!(domain = %self.inner.domain, "Replica closed");
                Ok(())
            }
            None => Err(ReplicaError::Closed(self.inner.domain.clone())),
        }
    }
}

/// A write transaction holding the replica's write gate.
pub struct SqliteTxn {
    inner: Arc<Inner>,
    _gate: OwnedMutexGuard<()>,
    staged: Update,
}

impl WriteTxn for SqliteTxn {
    async fn get(&mut self, id: &str) -> Result<Option<Subject>> {
        self.inner.with_conn(|conn| subjects::get(conn, id)).await
    }

    fn stage(&mut self, update: Update) {
        self.staged.extend(update);
    }

    async fn commit(self) -> Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        self.inner
            .with_conn(|conn| subjects::apply(conn, &self.staged))
            .await?;
        // No followers is not an error.
        let _ = self.inner.updates.send(self.staged);
        Ok(())
    }
}
