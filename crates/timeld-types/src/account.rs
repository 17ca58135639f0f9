//! Account view over root-domain subjects.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::serde_as;

use crate::ids::{AccountName, OwnedId};
use crate::subject::Subject;
use crate::vocab;

/// An account as recorded in the root domain.
///
/// References that do not parse as valid identifiers are ignored when
/// reading, since the root domain may contain data written by other
/// gateway versions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub name: AccountName,
    pub emails: BTreeSet<String>,
    /// Ids of key records registered for this account.
    pub keys: BTreeSet<String>,
    pub timesheets: BTreeSet<OwnedId>,
    /// Other accounts allowed to act for this one (organisation admins).
    pub admins: BTreeSet<AccountName>,
}

impl Account {
    /// A new account with nothing registered.
    pub fn new(name: AccountName) -> Self {
        Self {
            name,
            emails: BTreeSet::new(),
            keys: BTreeSet::new(),
            timesheets: BTreeSet::new(),
            admins: BTreeSet::new(),
        }
    }

    /// Read an account from its root-domain subject.
    pub fn from_subject(name: AccountName, subject: &Subject) -> Self {
        Self {
            emails: subject
                .strings(vocab::EMAIL)
                .into_iter()
                .map(str::to_string)
                .collect(),
            keys: subject
                .refs(vocab::KEY)
                .into_iter()
                .map(str::to_string)
                .collect(),
            timesheets: subject
                .refs(vocab::TIMESHEET_REF)
                .into_iter()
                .filter_map(|id| id.parse().ok())
                .collect(),
            admins: subject
                .refs(vocab::ADMIN)
                .into_iter()
                .filter_map(|id| id.parse().ok())
                .collect(),
            name,
        }
    }

    /// Whether the account records ownership of the given timesheet.
    pub fn owns(&self, ts_id: &OwnedId) -> bool {
        self.timesheets.contains(ts_id)
    }

    /// Whether an activation may be issued for `email`.
    ///
    /// An account with no registered emails accepts any address; this is how
    /// the first email of a new account gets registered.
    pub fn accepts_email(&self, email: &str) -> bool {
        self.emails.is_empty() || self.emails.contains(email)
    }

    /// Whether this account may act on resources owned by `owner`.
    pub fn may_act_for(&self, owner: &Account) -> bool {
        self.name == owner.name || owner.admins.contains(&self.name)
    }

    /// The full root-domain subject for this account.
    pub fn to_subject(&self) -> Subject {
        let mut subject = Subject::typed(self.name.as_str(), vocab::ACCOUNT);
        for email in &self.emails {
            subject.add(vocab::EMAIL, json!(email));
        }
        for key in &self.keys {
            subject.add(vocab::KEY, crate::subject::reference(key));
        }
        for ts in &self.timesheets {
            subject.add(vocab::TIMESHEET_REF, crate::subject::reference(&ts.to_string()));
        }
        for admin in &self.admins {
            subject.add(vocab::ADMIN, crate::subject::reference(admin.as_str()));
        }
        subject
    }
}

/// A transport credential minted for an account at activation.
///
/// The secret is returned to the activating client exactly once; the gateway
/// keeps only the public half in the root domain.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct TransportKey {
    /// Key record id, `account.<fingerprint>`.
    pub key_id: String,
    pub account: String,
    #[serde_as(as = "serde_with::hex::Hex")]
    #[ts(type = "string")]
    pub public_key: [u8; 32],
    /// Hex-encoded secret key.
    pub secret: String,
    /// Transport endpoint the key is valid for.
    pub endpoint: String,
}

impl TransportKey {
    /// The root-domain key record for this credential (no secret).
    pub fn to_subject(&self) -> Subject {
        Subject::typed(self.key_id.as_str(), vocab::ACCOUNT_KEY)
            .with(vocab::PUBLIC, json!(hex::encode(self.public_key)))
            .with_ref(vocab::KEY_ACCOUNT, &self.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> AccountName {
        AccountName::new(s).expect("valid name")
    }

    #[test]
    fn test_subject_roundtrip() {
        let mut account = Account::new(name("acme"));
        account.emails.insert("a@acme.com".to_string());
        account.keys.insert("acme.0011aabb".to_string());
        account
            .timesheets
            .insert("acme/ts1".parse().expect("owned id"));
        account.admins.insert(name("fred"));

        let subject = account.to_subject();
        assert!(subject.is_type(vocab::ACCOUNT));
        assert_eq!(Account::from_subject(name("acme"), &subject), account);
    }

    #[test]
    fn test_invalid_refs_are_skipped() {
        let subject = Subject::typed("acme", vocab::ACCOUNT)
            .with_ref(vocab::TIMESHEET_REF, "not-an-owned-id")
            .with_ref(vocab::TIMESHEET_REF, "acme/ts1");
        let account = Account::from_subject(name("acme"), &subject);
        assert_eq!(account.timesheets.len(), 1);
    }

    #[test]
    fn test_accepts_email() {
        let mut account = Account::new(name("acme"));
        assert!(account.accepts_email("anyone@example.com"));
        account.emails.insert("a@acme.com".to_string());
        assert!(account.accepts_email("a@acme.com"));
        assert!(!account.accepts_email("anyone@example.com"));
    }

    #[test]
    fn test_may_act_for() {
        let mut org = Account::new(name("org"));
        let fred = Account::new(name("fred"));
        let bob = Account::new(name("bob"));
        org.admins.insert(name("fred"));

        assert!(org.may_act_for(&org));
        assert!(fred.may_act_for(&org));
        assert!(!bob.may_act_for(&org));
        assert!(!org.may_act_for(&fred));
    }

    #[test]
    fn test_key_record_has_no_secret() {
        let key = TransportKey {
            key_id: "acme.0011aabb".to_string(),
            account: "acme".to_string(),
            public_key: [0xABu8; 32],
            secret: "deadbeef".to_string(),
            endpoint: "wss://example.org".to_string(),
        };
        let subject = key.to_subject();
        assert_eq!(subject.strings(vocab::PUBLIC), vec!["ab".repeat(32).as_str()]);
        assert_eq!(subject.refs(vocab::KEY_ACCOUNT), vec!["acme"]);
        assert!(!serde_json::to_string(&subject).expect("json").contains("deadbeef"));
    }
}
