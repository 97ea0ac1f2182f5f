//! Identity resolution: OS user name -> security identifier -> record.

use std::collections::BTreeMap;
use std::sync::Arc;

use veriprint_core::{Sid, UserRecord};
use veriprint_sensor::UserStore;

/// OS account lookup, behind a trait so tests can inject fixed uid maps.
pub trait AccountLookup: Send + Sync {
    /// Numeric uid for `user_name`, or `None` if no such account.
    fn uid_of(&self, user_name: &str) -> Option<u32>;
}

/// Account lookup against the real user database (`getpwnam`).
pub struct SystemAccounts;

impl AccountLookup for SystemAccounts {
    fn uid_of(&self, user_name: &str) -> Option<u32> {
        nix::unistd::User::from_name(user_name)
            .ok()
            .flatten()
            .map(|user| user.uid.as_raw())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("unknown user {0:?}")]
    UnknownUser(String),
}

/// Maps user names to identifiers and persisted records.
pub struct IdentityResolver {
    accounts: Box<dyn AccountLookup>,
    overrides: BTreeMap<String, Sid>,
    store: Arc<dyn UserStore>,
}

impl IdentityResolver {
    pub fn new(
        accounts: Box<dyn AccountLookup>,
        overrides: BTreeMap<String, Sid>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self { accounts, overrides, store }
    }

    /// Resolve a user name to its identifier.
    ///
    /// The account must exist even when an override is configured. A
    /// configured override wins; otherwise the identifier is synthesized
    /// from the account's uid. Deterministic for a fixed configuration.
    pub fn resolve(&self, user_name: &str) -> Result<Sid, IdentityError> {
        let uid = self
            .accounts
            .uid_of(user_name)
            .ok_or_else(|| IdentityError::UnknownUser(user_name.to_string()))?;

        if let Some(sid) = self.overrides.get(user_name) {
            return Ok(sid.clone());
        }
        Ok(Sid::from_uid(uid))
    }

    /// Resolve a user name to its enrolled record, if any.
    ///
    /// `Ok(None)` means the account exists but has no record — a
    /// legitimate outcome callers must handle, distinct from
    /// `UnknownUser`.
    pub fn resolve_record(
        &self,
        user_name: &str,
    ) -> Result<Option<(Sid, UserRecord)>, IdentityError> {
        let sid = self.resolve(user_name)?;
        Ok(self.store.lookup_user(&sid).map(|record| (sid, record)))
    }
}
