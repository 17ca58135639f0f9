//! Tenant domain lifecycle.
//!
//! The [`Gateway`] owns the root replica and a table of live tenant
//! replicas keyed by domain name. Each tenant domain moves through
//! `UNKNOWN -> OPEN -> TOMBSTONED`; a tombstoned domain can never be opened
//! again from this gateway.
//!
//! Genesis decisions are taken inside a root-domain write transaction so
//! that two callers racing for the same timesheet cannot both create it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use timeld_crypto::blake3::{self, contexts};
use timeld_replica::{until_current, until_online, Replica, Substrate, WriteTxn};
use timeld_types::config::domain_context;
use timeld_types::{
    unix_now, vocab, AccountName, ClientConfig, DomainConfig, OwnedId, Subject, TransportConfig,
    Update,
};
use tokio::sync::{broadcast, Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::accounts::{read_account, AccountStore};
use crate::{watcher, GatewayError, Result};

/// Root replica directory under the data directory.
pub const ROOT_DIR: &str = "root";

/// Extension of tombstone marker files.
pub const TOMBSTONE_EXT: &str = "tombstone";

/// Static gateway settings.
#[derive(Clone, Debug)]
pub struct GatewayOptions {
    /// Gateway domain; tenant domains are `name.account.<domain>`.
    pub domain: String,
    pub data_dir: PathBuf,
    /// Identity the gateway opens replicas with. Never given to clients.
    pub identity: String,
    /// Whether the root domain is created here rather than joined.
    pub genesis: bool,
    /// Transport settings, including the gateway's own secret key.
    pub transport: TransportConfig,
    /// Outer deadline for online and caught-up waits. `None` waits forever.
    pub status_timeout: Option<Duration>,
}

/// Gateway identity derived from its secret.
pub fn gateway_identity(secret: &[u8]) -> String {
    let digest = blake3::derive_key(contexts::GATEWAY_IDENTITY, secret);
    hex::encode(&digest[..8])
}

/// Configuration returned to a client joining a tenant domain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TenantConfig {
    pub config: ClientConfig,
    /// Whether this request created the tenant domain.
    pub created: bool,
}

type TenantCell<R> = Arc<OnceCell<Arc<R>>>;

/// The domain lifecycle manager.
pub struct Gateway<S: Substrate> {
    options: GatewayOptions,
    substrate: S,
    root: Arc<S::Replica>,
    /// Live tenant replicas by domain name. A cell is initialised at most
    /// once; lookup-then-insert happens under this lock.
    tenants: Mutex<HashMap<String, TenantCell<S::Replica>>>,
    shutdown: broadcast::Sender<()>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<S: Substrate> Gateway<S> {
    /// Open the root domain, enliven known tenants and start following
    /// root-domain changes.
    pub async fn initialise(substrate: S, options: GatewayOptions) -> Result<Arc<Self>> {
        let root_config = DomainConfig {
            identity: options.identity.clone(),
            domain: options.domain.clone(),
            genesis: options.genesis,
            context: domain_context(&options.domain),
            transport: options.transport.clone(),
        };
        let root = substrate
            .open(root_config, &options.data_dir.join(ROOT_DIR))
            .await?;
        until_current(&root, options.status_timeout).await?;
        info!(domain = %options.domain, "Root domain ready");

        let (shutdown, _) = broadcast::channel(1);
        let gateway = Arc::new(Self {
            options,
            substrate,
            root: Arc::new(root),
            tenants: Mutex::new(HashMap::new()),
            shutdown,
            watcher: Mutex::new(None),
        });

        // Subscribe before scanning so no reference added meanwhile is missed.
        let updates = gateway.root.follow();
        gateway.enliven_all().await;
        let handle = watcher::spawn(
            Arc::downgrade(&gateway),
            updates,
            gateway.shutdown.subscribe(),
        );
        *gateway.watcher.lock().await = Some(handle);

        Ok(gateway)
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// The root replica.
    pub fn root(&self) -> &S::Replica {
        &self.root
    }

    pub fn accounts(&self) -> AccountStore<S::Replica> {
        AccountStore::new(self.root.clone())
    }

    /// Open every tenant referenced by an account. Failures are logged and
    /// left for lazy opening on demand.
    pub(crate) async fn enliven_all(&self) {
        let accounts = match self.root.select(Some(vocab::ACCOUNT)).await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "Failed to scan root domain for timesheets");
                return;
            }
        };
        let mut opened = 0usize;
        for account in &accounts {
            for ts_id in timesheet_refs(account) {
                match self.open_tenant(&ts_id, false).await {
                    Ok(_) => opened += 1,
                    Err(e) => warn!(timesheet = %ts_id, error = %e, "Failed to enliven tenant"),
                }
            }
        }
        info!(tenants = opened, "Enlivened tenants");
    }

    /// Apply a committed root-domain update to the tenant table.
    pub(crate) async fn on_root_update(&self, update: &Update) {
        for subject in &update.deletes {
            for ts_id in timesheet_refs(subject) {
                self.close_tenant(&ts_id).await;
            }
        }
        for subject in &update.inserts {
            for ts_id in timesheet_refs(subject) {
                if let Err(e) = self.open_tenant(&ts_id, false).await {
                    warn!(timesheet = %ts_id, error = %e, "Failed to open tenant");
                }
            }
        }
    }

    fn tenant_config(&self, ts_id: &OwnedId, genesis: bool) -> DomainConfig {
        DomainConfig {
            identity: self.options.identity.clone(),
            domain: ts_id.domain_name(&self.options.domain),
            genesis,
            context: domain_context(&self.options.domain),
            transport: self.options.transport.clone(),
        }
    }

    fn tenant_path(&self, ts_id: &OwnedId) -> PathBuf {
        ts_id.storage_path(&self.options.data_dir)
    }

    fn tombstone_path(&self, ts_id: &OwnedId) -> PathBuf {
        self.tenant_path(ts_id).with_extension(TOMBSTONE_EXT)
    }

    /// Whether the tenant has been torn down.
    pub async fn tombstone_exists(&self, ts_id: &OwnedId) -> bool {
        tokio::fs::try_exists(self.tombstone_path(ts_id))
            .await
            .unwrap_or(false)
    }

    /// The live replica of a tenant, if open.
    pub async fn live_tenant(&self, ts_id: &OwnedId) -> Option<Arc<S::Replica>> {
        let domain = ts_id.domain_name(&self.options.domain);
        self.tenants
            .lock()
            .await
            .get(&domain)
            .and_then(|cell| cell.get().cloned())
    }

    /// Domain names of all live tenants.
    pub async fn live_tenants(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .tenants
            .lock()
            .await
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(domain, _)| domain.clone())
            .collect();
        domains.sort();
        domains
    }

    /// Open a tenant replica, or return the live one.
    ///
    /// Concurrent calls for one domain share a single open. A genesis open
    /// waits until the new replica is online. Tombstoned tenants are refused
    /// with `Conflict` unless a handle is still live.
    pub async fn open_tenant(&self, ts_id: &OwnedId, genesis: bool) -> Result<Arc<S::Replica>> {
        let domain = ts_id.domain_name(&self.options.domain);
        let cell = self
            .tenants
            .lock()
            .await
            .entry(domain.clone())
            .or_default()
            .clone();

        let result = cell
            .get_or_try_init(|| async {
                if self.tombstone_exists(ts_id).await {
                    return Err(GatewayError::Conflict(format!(
                        "timesheet '{ts_id}' has been removed"
                    )));
                }
                let replica = self
                    .substrate
                    .open(self.tenant_config(ts_id, genesis), &self.tenant_path(ts_id))
                    .await?;
                if genesis {
                    if let Err(e) = until_online(&replica, self.options.status_timeout).await {
                        if let Err(close_err) = replica.close().await {
                            warn!(domain = %domain, error = %close_err, "Failed to close tenant");
                        }
                        return Err(e.into());
                    }
                }
                info!(domain = %domain, genesis, "Tenant opened");
                Ok(Arc::new(replica))
            })
            .await
            .cloned();

        if result.is_err() {
            let mut tenants = self.tenants.lock().await;
            // Table plus this call are the only holders: nobody else is
            // waiting on the empty cell.
            let unused = tenants
                .get(&domain)
                .is_some_and(|c| Arc::ptr_eq(c, &cell) && !c.initialized())
                && Arc::strong_count(&cell) <= 2;
            if unused {
                tenants.remove(&domain);
            }
        }
        result
    }

    /// Tear down a tenant: close it, delete its replica state and leave a
    /// tombstone. Every step is best effort.
    ///
    /// A tenant with neither a live handle nor replica state was never
    /// created here and is left untouched. Returns whether a tenant was torn
    /// down.
    pub async fn close_tenant(&self, ts_id: &OwnedId) -> bool {
        let domain = ts_id.domain_name(&self.options.domain);
        let cell = self.tenants.lock().await.remove(&domain);
        let live = cell.and_then(|c| c.get().cloned());
        let path = self.tenant_path(ts_id);
        let stored = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if live.is_none() && !stored {
            debug!(domain = %domain, "No tenant to remove");
            return false;
        }

        if let Some(replica) = live {
            if let Err(e) = replica.close().await {
                warn!(domain = %domain, error = %e, "Failed to close tenant");
            }
        }
        if stored {
            if let Err(e) = tokio::fs::remove_dir_all(&path).await {
                warn!(domain = %domain, path = %path.display(), error = %e, "Failed to remove tenant state");
            }
        }

        match write_tombstone(&self.tombstone_path(ts_id)).await {
            Ok(()) => info!(domain = %domain, "Tenant tombstoned"),
            Err(e) => warn!(domain = %domain, error = %e, "Failed to write tombstone"),
        }
        true
    }

    /// Resolve the configuration a client uses to join a timesheet's domain,
    /// creating the domain if the owning account does not record it yet.
    pub async fn resolve_tenant_config(&self, ts_id: &OwnedId) -> Result<TenantConfig> {
        let mut created = false;
        if self.live_tenant(ts_id).await.is_none() {
            let mut txn = self.root.transact().await?;
            let owned = read_account(&mut txn, ts_id.account())
                .await?
                .is_some_and(|account| account.owns(ts_id));
            let genesis = !owned;
            if genesis && self.tombstone_exists(ts_id).await {
                return Err(GatewayError::Conflict(format!(
                    "timesheet '{ts_id}' has been removed"
                )));
            }
            self.open_tenant(ts_id, genesis).await?;
            if genesis {
                txn.stage(ownership_update(ts_id));
                txn.commit().await?;
                created = true;
                info!(timesheet = %ts_id, "Timesheet created");
            }
        }

        debug!(timesheet = %ts_id, created, "Resolved tenant config");
        Ok(TenantConfig {
            config: self.tenant_config(ts_id, false).for_client(),
            created,
        })
    }

    /// Apply an update to the root domain.
    ///
    /// Callers outside the gateway must check it with
    /// [`crate::Guard::check_write`] first.
    pub async fn write(&self, update: Update) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        self.root.write(update).await?;
        Ok(())
    }

    /// Close the root and every tenant concurrently. Failures are logged.
    pub async fn close(&self) {
        let _ = self.shutdown.send(());
        let watcher = self.watcher.lock().await.take();
        if let Some(handle) = watcher {
            if let Err(e) = handle.await {
                warn!(error = %e, "Root watcher ended abnormally");
            }
        }

        let tenants: Vec<(String, Arc<S::Replica>)> = self
            .tenants
            .lock()
            .await
            .drain()
            .filter_map(|(domain, cell)| cell.get().cloned().map(|r| (domain, r)))
            .collect();

        let tenant_closes = tenants.iter().map(|(domain, replica)| async move {
            if let Err(e) = replica.close().await {
                warn!(domain = %domain, error = %e, "Failed to close tenant");
            }
        });
        let root_close = async {
            if let Err(e) = self.root.close().await {
                warn!(error = %e, "Failed to close root domain");
            }
        };
        futures_util::future::join(root_close, join_all(tenant_closes)).await;
        info!(tenants = tenants.len(), "Gateway closed");
    }
}

/// Valid `timesheet` references of an account subject. Other subjects
/// carry no ownership.
fn timesheet_refs(subject: &Subject) -> Vec<OwnedId> {
    if subject.id.parse::<AccountName>().is_err() {
        return Vec::new();
    }
    subject
        .refs(vocab::TIMESHEET_REF)
        .into_iter()
        .filter_map(|id| id.parse().ok())
        .collect()
}

/// The ownership fact for a new timesheet.
fn ownership_update(ts_id: &OwnedId) -> Update {
    let id = ts_id.to_string();
    Update::inserting(
        Subject::typed(ts_id.account().as_str(), vocab::ACCOUNT).with_ref(vocab::TIMESHEET_REF, &id),
    )
    .insert(Subject::typed(id, vocab::TIMESHEET))
}

async fn write_tombstone(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, unix_now().to_string()).await
}
