//! # Account Identity
//!
//! The [`AccountId`] domain-primitive newtype. Buyers, sellers,
//! arbitrators, and the protocol's own custody accounts are all plain
//! ledger accounts; the newtype keeps them from being confused with the
//! arena ids allocated elsewhere.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Create a new random account identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an account identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "account:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(AccountId::new(), AccountId::new());
    }

    #[test]
    fn from_uuid_roundtrip() {
        let uuid = Uuid::new_v4();
        let id = AccountId::from_uuid(uuid);
        assert_eq!(*id.as_uuid(), uuid);
    }

    #[test]
    fn display_prefix() {
        assert!(AccountId::new().to_string().starts_with("account:"));
    }
}
