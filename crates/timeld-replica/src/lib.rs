//! # timeld-replica
//!
//! The replicated-data substrate seen by the gateway.
//!
//! A [`Substrate`] opens [`Replica`]s of named domains from a storage
//! directory. A replica is a graph of [`Subject`]s that can be read,
//! written through serialized [`WriteTxn`]s, watched for status changes
//! and followed for committed updates.
//!
//! [`sqlite::SqliteSubstrate`] is a single-node implementation: every
//! domain is one local SQLite file and catch-up is immediate.

pub mod sqlite;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use timeld_types::{DomainConfig, Subject, Update};
use tokio::sync::{broadcast, watch};

pub use sqlite::{SqliteReplica, SqliteSubstrate, SqliteTxn};

/// Replica error types.
#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("storage error: {0}")]
    Db(#[from] timeld_db::DbError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("replica of '{0}' is closed")]
    Closed(String),

    #[error("replica at this path belongs to '{found}', not '{expected}'")]
    DomainMismatch { expected: String, found: String },

    #[error("timed out waiting for replica of '{0}' to become {1}")]
    Timeout(String, &'static str),
}

pub type Result<T> = std::result::Result<T, ReplicaError>;

/// Connectivity and freshness of a replica.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReplicaStatus {
    /// Connected to the domain (or able to act alone as its genesis).
    pub online: bool,
    /// Still catching up with changes made elsewhere.
    pub outdated: bool,
}

impl ReplicaStatus {
    /// Status of a replica that has just been opened.
    pub const OPENING: Self = Self {
        online: false,
        outdated: true,
    };

    /// Status of a replica that is online and caught up.
    pub const CURRENT: Self = Self {
        online: true,
        outdated: false,
    };
}

/// Opens replicas of domains.
pub trait Substrate: Send + Sync + 'static {
    type Replica: Replica;

    /// Open (or create, if `config.genesis`) a replica stored under `path`.
    fn open(
        &self,
        config: DomainConfig,
        path: &Path,
    ) -> impl Future<Output = Result<Self::Replica>> + Send;
}

/// A live replica of one domain.
pub trait Replica: Send + Sync + 'static {
    type Txn: WriteTxn;

    /// The domain this replica belongs to.
    fn domain(&self) -> &str;

    /// Read one subject by `@id`.
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<Subject>>> + Send;

    /// Read all subjects, optionally of one `@type`, in read order.
    fn select(&self, kind: Option<&str>) -> impl Future<Output = Result<Vec<Subject>>> + Send;

    /// Begin a write transaction.
    ///
    /// Transactions on one replica are serialized: this waits until any
    /// other open transaction has committed or been dropped.
    fn transact(&self) -> impl Future<Output = Result<Self::Txn>> + Send;

    /// Apply one update in its own transaction.
    fn write(&self, update: Update) -> impl Future<Output = Result<()>> + Send;

    /// Watch the replica's status.
    fn status(&self) -> watch::Receiver<ReplicaStatus>;

    /// Subscribe to updates committed after this call.
    fn follow(&self) -> broadcast::Receiver<Update>;

    /// Close the replica. Later operations fail with [`ReplicaError::Closed`].
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// A serialized write transaction.
///
/// Reads see committed state; staged updates become visible on commit.
/// Dropping an uncommitted transaction discards what was staged.
pub trait WriteTxn: Send + 'static {
    fn get(&mut self, id: &str) -> impl Future<Output = Result<Option<Subject>>> + Send;

    /// Stage an update for commit.
    fn stage(&mut self, update: Update);

    /// Apply everything staged, atomically.
    fn commit(self) -> impl Future<Output = Result<()>> + Send;
}

/// Wait until the replica is online.
pub async fn until_online<R: Replica>(replica: &R, deadline: Option<Duration>) -> Result<()> {
    wait_for_status(replica, deadline, "online", |s| s.online).await
}

/// Wait until the replica has caught up.
pub async fn until_current<R: Replica>(replica: &R, deadline: Option<Duration>) -> Result<()> {
    wait_for_status(replica, deadline, "current", |s| !s.outdated).await
}

async fn wait_for_status<R: Replica>(
    replica: &R,
    deadline: Option<Duration>,
    what: &'static str,
    ready: impl Fn(&ReplicaStatus) -> bool,
) -> Result<()> {
    let mut status = replica.status();
    let closed = || ReplicaError::Closed(replica.domain().to_string());
    let wait = status.wait_for(|s| ready(s));
    match deadline {
        None => wait.await.map(|_| ()).map_err(|_| closed()),
        Some(limit) => match tokio::time::timeout(limit, wait).await {
            Ok(result) => result.map(|_| ()).map_err(|_| closed()),
            Err(_) => Err(ReplicaError::Timeout(replica.domain().to_string(), what)),
        },
    }
}
