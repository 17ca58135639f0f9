//! Bearer verification and per-write access control.
//!
//! Clients authenticate with access tokens signed by a key minted at
//! activation. Claims are `{sub: account, kid: key id, exp}`; the key must
//! be registered on the account and the signature must verify against the
//! key record's public half.

use std::sync::Arc;

use timeld_crypto::ed25519::SigningKey;
use timeld_replica::Substrate;
use timeld_types::{unix_now, vocab, Account, AccountName, OwnedId, Subject, TransportKey, Update};
use tracing::debug;

use crate::token::{self, AccessClaims, Expiring};
use crate::{Gateway, GatewayError, Result};

/// Properties clients may never write on owned subjects.
const PROTECTED: &[&str] = &[vocab::TIMESHEET_REF, vocab::EMAIL, vocab::KEY, vocab::ADMIN];

/// Sign an access token with an activated transport key.
pub fn sign_access_token(key: &TransportKey, ttl_secs: u64) -> Result<String> {
    let signing_key = SigningKey::from_hex(&key.secret)?;
    let claims = AccessClaims {
        sub: key.account.clone(),
        kid: key.key_id.clone(),
        exp: unix_now() + ttl_secs,
    };
    token::sign(&claims, &signing_key)
}

/// Checks callers before they reach the gateway.
pub struct Guard<S: Substrate> {
    gateway: Arc<Gateway<S>>,
}

impl<S: Substrate> Clone for Guard<S> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
        }
    }
}

impl<S: Substrate> Guard<S> {
    pub fn new(gateway: Arc<Gateway<S>>) -> Self {
        Self { gateway }
    }

    /// Resolve the account behind a bearer token and, if a resource is
    /// given, check that the account may act for its owner.
    pub async fn verify_user(&self, bearer: &str, resource: Option<&OwnedId>) -> Result<Account> {
        let token = bearer.strip_prefix("Bearer ").unwrap_or(bearer).trim();
        let claims: AccessClaims = token::peek(token)?;
        let name = AccountName::new(claims.sub.as_str())
            .map_err(|_| unauthorized("invalid token subject"))?;

        let accounts = self.gateway.accounts();
        let account = accounts
            .account(&name, false)
            .await?
            .ok_or_else(|| unauthorized(&format!("unknown account '{name}'")))?;
        if !account.keys.contains(&claims.kid) {
            return Err(unauthorized("key is not registered for this account"));
        }
        let public = accounts
            .public_key(&claims.kid)
            .await?
            .ok_or_else(|| unauthorized("key record missing"))?;
        let verified: AccessClaims = token::verify(token, &public)?;
        verified.check_expiry(unix_now())?;

        if let Some(resource) = resource {
            self.check_acts_for(&account, resource.account()).await?;
        }
        debug!(account = %name, "Caller verified");
        Ok(account)
    }

    /// Check a client-submitted root-domain update.
    ///
    /// Owned subjects (`account/name`) may be written by anyone who may act
    /// for the owner, except for protected properties. Account subjects only
    /// accept deletion of `timesheet` references the account records, which
    /// removes those timesheets. Everything else is refused.
    pub async fn check_write(&self, account: &Account, update: &Update) -> Result<()> {
        for subject in &update.deletes {
            self.check_subject(account, subject, true).await?;
        }
        for subject in &update.inserts {
            self.check_subject(account, subject, false).await?;
        }
        Ok(())
    }

    async fn check_subject(&self, account: &Account, subject: &Subject, deleting: bool) -> Result<()> {
        if let Ok(id) = subject.id.parse::<OwnedId>() {
            if subject.is_type(vocab::ACCOUNT) || subject.is_type(vocab::ACCOUNT_KEY) {
                return Err(unauthorized(&format!("'{id}' cannot be an account or key")));
            }
            if let Some(property) = PROTECTED
                .iter()
                .find(|p| subject.properties.contains_key(**p))
            {
                return Err(unauthorized(&format!("'{property}' cannot be written on '{id}'")));
            }
            return self.check_acts_for(account, id.account()).await;
        }

        if let Ok(owner) = subject.id.parse::<AccountName>() {
            let only_timesheets = subject.kind.is_none()
                && subject
                    .properties
                    .keys()
                    .all(|p| p.as_str() == vocab::TIMESHEET_REF);
            if !deleting || !only_timesheets {
                return Err(unauthorized(&format!(
                    "account '{owner}' only accepts timesheet removal"
                )));
            }
            let recorded = self.gateway.accounts().account(&owner, false).await?;
            for value in subject.values(vocab::TIMESHEET_REF) {
                let ts_id = value
                    .get("@id")
                    .and_then(|id| id.as_str())
                    .and_then(|id| id.parse::<OwnedId>().ok());
                let owned = ts_id.is_some_and(|ts_id| {
                    recorded.as_ref().is_some_and(|record| record.owns(&ts_id))
                });
                if !owned {
                    return Err(unauthorized(&format!(
                        "'{owner}' can only remove timesheets it owns"
                    )));
                }
            }
            return self.check_acts_for(account, &owner).await;
        }

        Err(unauthorized(&format!("'{}' cannot be written", subject.id)))
    }

    async fn check_acts_for(&self, account: &Account, owner: &AccountName) -> Result<()> {
        if &account.name == owner {
            return Ok(());
        }
        match self.gateway.accounts().account(owner, false).await? {
            Some(owner_account) if account.may_act_for(&owner_account) => Ok(()),
            _ => Err(unauthorized(&format!(
                "'{}' may not act for '{owner}'",
                account.name
            ))),
        }
    }
}

fn unauthorized(reason: &str) -> GatewayError {
    GatewayError::Unauthorized(reason.to_string())
}
