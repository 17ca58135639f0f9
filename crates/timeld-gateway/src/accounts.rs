//! Account records in the root domain.

use std::sync::Arc;

use timeld_crypto::ed25519::VerifyingKey;
use timeld_replica::{Replica, WriteTxn};
use timeld_types::{vocab, Account, AccountName, Subject, TransportKey, Update};
use tracing::info;

use crate::{GatewayError, Result};

/// Reads and writes account subjects in the root domain.
pub struct AccountStore<R> {
    root: Arc<R>,
}

impl<R> Clone for AccountStore<R> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<R: Replica> AccountStore<R> {
    pub fn new(root: Arc<R>) -> Self {
        Self { root }
    }

    /// Look up an account, optionally creating it if absent.
    pub async fn account(&self, name: &AccountName, or_create: bool) -> Result<Option<Account>> {
        if !or_create {
            let subject = self.root.get(name.as_str()).await?;
            return Ok(subject.as_ref().and_then(|s| account_from(name, s)));
        }
        let mut txn = self.root.transact().await?;
        if let Some(account) = read_account(&mut txn, name).await? {
            return Ok(Some(account));
        }
        let account = Account::new(name.clone());
        txn.stage(Update::inserting(account.to_subject()));
        txn.commit().await?;
        info!(account = %name, "Account created");
        Ok(Some(account))
    }

    /// Record an activated email and transport key on an account, creating
    /// the account if absent.
    pub async fn register_key(
        &self,
        name: &AccountName,
        email: &str,
        key: &TransportKey,
    ) -> Result<()> {
        let account = Subject::typed(name.as_str(), vocab::ACCOUNT)
            .with(vocab::EMAIL, serde_json::Value::from(email))
            .with_ref(vocab::KEY, &key.key_id);
        self.root
            .write(Update::inserting(account).insert(key.to_subject()))
            .await?;
        info!(account = %name, key_id = %key.key_id, "Account key registered");
        Ok(())
    }

    /// The public key of a key record, if `key_id` names one.
    pub async fn public_key(&self, key_id: &str) -> Result<Option<VerifyingKey>> {
        let Some(record) = self.root.get(key_id).await? else {
            return Ok(None);
        };
        if !record.is_type(vocab::ACCOUNT_KEY) {
            return Ok(None);
        }
        match record.strings(vocab::PUBLIC).first() {
            Some(public) => VerifyingKey::from_hex(public)
                .map(Some)
                .map_err(GatewayError::from),
            None => Ok(None),
        }
    }
}

/// Read an account inside a root-domain write transaction.
pub async fn read_account<T: WriteTxn>(txn: &mut T, name: &AccountName) -> Result<Option<Account>> {
    let subject = txn.get(name.as_str()).await?;
    Ok(subject.as_ref().and_then(|s| account_from(name, s)))
}

fn account_from(name: &AccountName, subject: &Subject) -> Option<Account> {
    subject
        .is_type(vocab::ACCOUNT)
        .then(|| Account::from_subject(name.clone(), subject))
}
