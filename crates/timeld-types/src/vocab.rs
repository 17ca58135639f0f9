//! Subject types and property names of the gateway vocabulary.

/// `@type` of account subjects in the root domain.
pub const ACCOUNT: &str = "Account";
/// `@type` of public-key records referenced by accounts.
pub const ACCOUNT_KEY: &str = "AccountKey";
/// `@type` of timesheets (root domain) and their tenant domains.
pub const TIMESHEET: &str = "Timesheet";
/// `@type` of projects.
pub const PROJECT: &str = "Project";
/// `@type` of time entries inside a tenant domain.
pub const ENTRY: &str = "Entry";

/// Account → registered email addresses.
pub const EMAIL: &str = "email";
/// Account → key record references.
pub const KEY: &str = "key";
/// Account → owned timesheet references.
pub const TIMESHEET_REF: &str = "timesheet";
/// Account → accounts allowed to act for it.
pub const ADMIN: &str = "admin";
/// Timesheet → project references.
pub const PROJECT_REF: &str = "project";
/// Key record → hex public key.
pub const PUBLIC: &str = "public";
/// Key record → owning account reference.
pub const KEY_ACCOUNT: &str = "account";
