//! Account names and account-owned identifiers.
//!
//! Both are used verbatim as DNS labels in tenant domain names and as
//! directory names in storage paths, so they are restricted to lowercase
//! host-safe labels.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum length of a DNS label.
pub const MAX_LABEL_LEN: usize = 63;

/// Identifier validation errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid name '{0}': expected a lowercase host-safe label")]
    InvalidName(String),

    #[error("invalid owned id '{0}': expected 'account/name'")]
    InvalidOwnedId(String),

    #[error("invalid email '{0}'")]
    InvalidEmail(String),
}

/// Whether `s` is a lowercase DNS label: `[a-z0-9-]`, not starting or
/// ending with `-`, 1 to 63 characters.
pub fn is_host_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= MAX_LABEL_LEN
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Normalise and validate an email address.
///
/// This is a syntactic check only: one `@`, a non-empty local part and a
/// dotted domain, no whitespace. Returns the lowercased address.
pub fn validate_email(email: &str) -> Result<String, IdError> {
    let email = email.trim();
    let invalid = || IdError::InvalidEmail(email.to_string());
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(invalid());
    }
    Ok(email.to_ascii_lowercase())
}

/// An account name; the `@id` of the account subject in the root domain.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountName(String);

impl AccountName {
    pub fn new(name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if is_host_label(&name) {
            Ok(Self(name))
        } else {
            Err(IdError::InvalidName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountName {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AccountName {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountName> for String {
    fn from(value: AccountName) -> Self {
        value.0
    }
}

/// An entity owned by an account, such as a timesheet or project.
///
/// Textual form is `account/name`. A timesheet's tenant domain is
/// `name.account.<gateway domain>` and its replica lives under
/// `tenants/<account>/<name>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnedId {
    account: AccountName,
    name: String,
}

impl OwnedId {
    pub fn new(account: AccountName, name: impl Into<String>) -> Result<Self, IdError> {
        let name = name.into();
        if !is_host_label(&name) {
            return Err(IdError::InvalidName(name));
        }
        Ok(Self { account, name })
    }

    pub fn account(&self) -> &AccountName {
        &self.account
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The tenant domain name under the given gateway domain.
    pub fn domain_name(&self, gateway_domain: &str) -> String {
        format!("{}.{}.{}", self.name, self.account, gateway_domain)
    }

    /// Storage directory for this entity's replica under `root`.
    pub fn storage_path(&self, root: &Path) -> PathBuf {
        root.join("tenants")
            .join(self.account.as_str())
            .join(&self.name)
    }
}

impl fmt::Display for OwnedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.name)
    }
}

impl FromStr for OwnedId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (account, name) = s
            .split_once('/')
            .ok_or_else(|| IdError::InvalidOwnedId(s.to_string()))?;
        let account =
            AccountName::new(account).map_err(|_| IdError::InvalidOwnedId(s.to_string()))?;
        Self::new(account, name).map_err(|_| IdError::InvalidOwnedId(s.to_string()))
    }
}

impl TryFrom<String> for OwnedId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OwnedId> for String {
    fn from(value: OwnedId) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_labels() {
        assert!(is_host_label("acme"));
        assert!(is_host_label("ts-1"));
        assert!(is_host_label("0"));
        assert!(!is_host_label(""));
        assert!(!is_host_label("-acme"));
        assert!(!is_host_label("acme-"));
        assert!(!is_host_label("Acme"));
        assert!(!is_host_label("a.b"));
        assert!(!is_host_label("a/b"));
        assert!(!is_host_label(&"a".repeat(64)));
    }

    #[test]
    fn test_owned_id_parse() {
        let id: OwnedId = "acme/ts1".parse().expect("parse");
        assert_eq!(id.account().as_str(), "acme");
        assert_eq!(id.name(), "ts1");
        assert_eq!(id.to_string(), "acme/ts1");
    }

    #[test]
    fn test_owned_id_rejects_malformed() {
        for bad in ["acme", "/ts1", "acme/", "acme/ts/1", "ACME/ts1", "acme/ts.1"] {
            assert!(
                matches!(bad.parse::<OwnedId>(), Err(IdError::InvalidOwnedId(_))),
                "'{bad}' should be rejected"
            );
        }
    }

    #[test]
    fn test_domain_name_and_path() {
        let id: OwnedId = "acme/ts1".parse().expect("parse");
        assert_eq!(id.domain_name("gw.example.org"), "ts1.acme.gw.example.org");
        assert_eq!(
            id.storage_path(Path::new("/data")),
            PathBuf::from("/data/tenants/acme/ts1")
        );
    }

    #[test]
    fn test_serde_as_string() {
        let id: OwnedId = "acme/ts1".parse().expect("parse");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"acme/ts1\"");
        let back: OwnedId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
        assert!(serde_json::from_str::<AccountName>("\"Bad Name\"").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" Fred@Example.com ").expect("valid"),
            "fred@example.com"
        );
        for bad in ["fred", "@example.com", "fred@example", "fred@@example.com", "fr ed@x.com", "fred@.com"] {
            assert!(validate_email(bad).is_err(), "'{bad}' should be rejected");
        }
    }
}
