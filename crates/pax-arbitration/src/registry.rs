//! # Arbitrator Registry
//!
//! Registration, stake custody, and the active-pool view that quorum
//! selection draws from. Stake moves into the registry's stake vault on
//! the shared ledger before the record commits, so a failed transfer
//! leaves no registration behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use pax_core::{AccountId, Amount, Ledger};

use crate::arbitrator::Arbitrator;
use crate::config::ArbitrationConfig;
use crate::error::ArbitrationError;

/// The registered arbitrator pool and its stake custody account.
pub struct ArbitratorRegistry {
    ledger: Arc<Ledger>,
    arbitrators: DashMap<AccountId, Arbitrator>,
    stake_vault: AccountId,
}

impl ArbitratorRegistry {
    pub(crate) fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            arbitrators: DashMap::new(),
            stake_vault: AccountId::new(),
        }
    }

    /// The custody account holding all arbitrator stakes.
    pub fn stake_vault(&self) -> AccountId {
        self.stake_vault
    }

    /// Register an account as an arbitrator, locking `stake`.
    pub(crate) fn register(
        &self,
        account: AccountId,
        stake: Amount,
        config: &ArbitrationConfig,
        now: DateTime<Utc>,
    ) -> Result<(), ArbitrationError> {
        if self.arbitrators.contains_key(&account) {
            return Err(ArbitrationError::AlreadyRegistered(account));
        }
        if stake < config.min_stake {
            return Err(ArbitrationError::InsufficientStake {
                offered: stake,
                minimum: config.min_stake,
            });
        }
        self.ledger.transfer(account, self.stake_vault, stake)?;
        self.arbitrators.insert(
            account,
            Arbitrator::new(account, stake, config.reputation_baseline, now),
        );
        Ok(())
    }

    /// Lock additional stake for an already-registered arbitrator.
    pub(crate) fn increase_stake(
        &self,
        account: AccountId,
        additional: Amount,
    ) -> Result<Amount, ArbitrationError> {
        let mut entry = self
            .arbitrators
            .get_mut(&account)
            .ok_or(ArbitrationError::ArbitratorNotFound(account))?;
        if !entry.active {
            return Err(ArbitrationError::NotActive(account));
        }
        self.ledger.transfer(account, self.stake_vault, additional)?;
        entry.stake = entry.stake.saturating_add(additional);
        Ok(entry.stake)
    }

    /// Deactivate and return the remaining stake. The engine checks the
    /// no-undecided-disputes gate before calling this.
    pub(crate) fn deactivate(&self, account: AccountId) -> Result<Amount, ArbitrationError> {
        let mut entry = self
            .arbitrators
            .get_mut(&account)
            .ok_or(ArbitrationError::ArbitratorNotFound(account))?;
        if !entry.active {
            return Err(ArbitrationError::NotActive(account));
        }
        let refund = entry.stake;
        self.ledger.transfer(self.stake_vault, account, refund)?;
        entry.stake = Amount::ZERO;
        entry.active = false;
        Ok(refund)
    }

    /// Fetch an arbitrator record.
    pub fn arbitrator(&self, account: &AccountId) -> Option<Arbitrator> {
        self.arbitrators.get(account).map(|entry| entry.value().clone())
    }

    /// All currently active arbitrators, unordered.
    pub fn active_pool(&self) -> Vec<AccountId> {
        self.arbitrators
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Registered arbitrators, active or not.
    pub fn total_arbitrators(&self) -> usize {
        self.arbitrators.len()
    }

    /// Apply a closure to an arbitrator record, if registered.
    pub(crate) fn update<F: FnOnce(&mut Arbitrator)>(&self, account: &AccountId, f: F) {
        if let Some(mut entry) = self.arbitrators.get_mut(account) {
            f(entry.value_mut());
        }
    }
}

impl std::fmt::Debug for ArbitratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitratorRegistry")
            .field("arbitrators", &self.arbitrators.len())
            .field("stake_vault", &self.stake_vault)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded_registry() -> (ArbitratorRegistry, ArbitrationConfig, AccountId) {
        let ledger = Arc::new(Ledger::new());
        let account = AccountId::new();
        ledger.deposit(account, Amount::from_units(1)).unwrap();
        (
            ArbitratorRegistry::new(ledger),
            ArbitrationConfig::default(),
            account,
        )
    }

    #[test]
    fn register_locks_stake_in_the_vault() {
        let (registry, config, account) = funded_registry();
        registry
            .register(account, Amount::from_milli_units(50), &config, Utc::now())
            .unwrap();

        let record = registry.arbitrator(&account).unwrap();
        assert!(record.active);
        assert_eq!(record.stake, Amount::from_milli_units(50));
        assert_eq!(record.reputation, config.reputation_baseline);
        assert_eq!(
            registry.ledger.balance(&registry.stake_vault()),
            Amount::from_milli_units(50)
        );
        assert_eq!(registry.active_pool(), vec![account]);
    }

    #[test]
    fn register_rejects_dust_and_duplicates() {
        let (registry, config, account) = funded_registry();
        assert!(matches!(
            registry.register(account, Amount::from_milli_units(49), &config, Utc::now()),
            Err(ArbitrationError::InsufficientStake { .. })
        ));
        registry
            .register(account, Amount::from_milli_units(50), &config, Utc::now())
            .unwrap();
        assert!(matches!(
            registry.register(account, Amount::from_milli_units(50), &config, Utc::now()),
            Err(ArbitrationError::AlreadyRegistered(_))
        ));
        assert_eq!(registry.total_arbitrators(), 1);
    }

    #[test]
    fn register_fails_cleanly_on_insufficient_balance() {
        let (registry, config, _) = funded_registry();
        let broke = AccountId::new();
        assert!(matches!(
            registry.register(broke, Amount::from_milli_units(50), &config, Utc::now()),
            Err(ArbitrationError::Ledger(_))
        ));
        assert!(registry.arbitrator(&broke).is_none());
    }

    #[test]
    fn deactivate_returns_stake_and_leaves_the_pool() {
        let (registry, config, account) = funded_registry();
        registry
            .register(account, Amount::from_milli_units(50), &config, Utc::now())
            .unwrap();
        let before = registry.ledger.balance(&account);

        let refund = registry.deactivate(account).unwrap();
        assert_eq!(refund, Amount::from_milli_units(50));
        assert_eq!(
            registry.ledger.balance(&account),
            before.checked_add(refund).unwrap()
        );
        assert!(registry.active_pool().is_empty());
        assert_eq!(registry.total_arbitrators(), 1);

        // Deactivated arbitrators cannot top up or deactivate again.
        assert!(matches!(
            registry.increase_stake(account, Amount::from_milli_units(10)),
            Err(ArbitrationError::NotActive(_))
        ));
        assert!(matches!(
            registry.deactivate(account),
            Err(ArbitrationError::NotActive(_))
        ));
    }

    #[test]
    fn increase_stake_accumulates() {
        let (registry, config, account) = funded_registry();
        registry
            .register(account, Amount::from_milli_units(50), &config, Utc::now())
            .unwrap();
        let total = registry
            .increase_stake(account, Amount::from_milli_units(25))
            .unwrap();
        assert_eq!(total, Amount::from_milli_units(75));
        assert_eq!(
            registry.ledger.balance(&registry.stake_vault()),
            Amount::from_milli_units(75)
        );
    }
}
