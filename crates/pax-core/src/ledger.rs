//! # Balance Ledger
//!
//! The single balance book behind every fund movement, plus monotonic id
//! allocation for the append-only arenas built on top of it.
//!
//! ## Atomicity
//!
//! A [`transfer`](Ledger::transfer) touches two accounts and must be a
//! single critical section, so the book lives behind one mutex rather
//! than a sharded map. An operation either fully applies or has no
//! effect: the debit is validated before either side is mutated, and no
//! partial state is ever observable from outside the lock.
//!
//! Accounts are created implicitly at first credit. There is no
//! delete — an account that reaches zero simply holds zero.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::account::AccountId;
use crate::amount::Amount;
use crate::error::LedgerError;

/// The balance book.
#[derive(Default)]
pub struct Ledger {
    balances: Mutex<HashMap<AccountId, Amount>>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an account from outside the ledger (fixture funding and
    /// incoming deposits). Creates the account if it does not exist.
    pub fn deposit(&self, account: AccountId, amount: Amount) -> Result<(), LedgerError> {
        let mut balances = self.balances.lock();
        let balance = balances.entry(account).or_insert(Amount::ZERO);
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { account })?;
        Ok(())
    }

    /// The current balance of an account. Unknown accounts hold zero.
    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances
            .lock()
            .get(account)
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Atomically move `amount` from one account to another.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientFunds`] without any state
    /// change if the source balance is short.
    pub fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let mut balances = self.balances.lock();

        let available = balances.get(&from).copied().unwrap_or(Amount::ZERO);
        let debited = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientFunds {
                account: from,
                available,
                required: amount,
            })?;
        let credited = balances
            .get(&to)
            .copied()
            .unwrap_or(Amount::ZERO)
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { account: to })?;

        if from == to {
            return Ok(());
        }
        balances.insert(from, debited);
        balances.insert(to, credited);
        Ok(())
    }

    /// Sum of all balances. Diagnostic read; conservation checks only.
    pub fn total_supply(&self) -> Amount {
        self.balances
            .lock()
            .values()
            .fold(Amount::ZERO, |acc, balance| {
                acc.checked_add(*balance).unwrap_or(acc)
            })
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("accounts", &self.balances.lock().len())
            .finish()
    }
}

/// Monotonic allocator for arena ids.
///
/// Ids start at 1 so that 0 can never collide with a live record.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn deposit_then_transfer_moves_exact_amount() {
        let ledger = Ledger::new();
        let alice = AccountId::new();
        let bob = AccountId::new();

        ledger.deposit(alice, Amount::from_units(5)).unwrap();
        ledger
            .transfer(alice, bob, Amount::from_milli_units(1_500))
            .unwrap();

        assert_eq!(ledger.balance(&alice), Amount::from_milli_units(3_500));
        assert_eq!(ledger.balance(&bob), Amount::from_milli_units(1_500));
    }

    #[test]
    fn insufficient_funds_leaves_no_partial_effect() {
        let ledger = Ledger::new();
        let alice = AccountId::new();
        let bob = AccountId::new();
        ledger.deposit(alice, Amount::from_units(1)).unwrap();

        let err = ledger
            .transfer(alice, bob, Amount::from_units(2))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(ledger.balance(&alice), Amount::from_units(1));
        assert_eq!(ledger.balance(&bob), Amount::ZERO);
    }

    #[test]
    fn transfer_from_unknown_account_fails() {
        let ledger = Ledger::new();
        let ghost = AccountId::new();
        let bob = AccountId::new();
        assert!(ledger
            .transfer(ghost, bob, Amount::from_base_units(1))
            .is_err());
    }

    #[test]
    fn self_transfer_validates_but_does_not_mutate() {
        let ledger = Ledger::new();
        let alice = AccountId::new();
        ledger.deposit(alice, Amount::from_units(1)).unwrap();

        ledger
            .transfer(alice, alice, Amount::from_units(1))
            .unwrap();
        assert_eq!(ledger.balance(&alice), Amount::from_units(1));

        assert!(ledger
            .transfer(alice, alice, Amount::from_units(2))
            .is_err());
    }

    #[test]
    fn id_allocator_is_monotonic_from_one() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.next(), 3);
    }

    proptest! {
        #[test]
        fn transfers_conserve_total_supply(
            seed_a in 0u64..=1_000_000,
            seed_b in 0u64..=1_000_000,
            moves in proptest::collection::vec((any::<bool>(), 0u64..=2_000_000), 0..32),
        ) {
            let ledger = Ledger::new();
            let a = AccountId::new();
            let b = AccountId::new();
            ledger.deposit(a, Amount::from_base_units(seed_a as u128)).unwrap();
            ledger.deposit(b, Amount::from_base_units(seed_b as u128)).unwrap();
            let supply = ledger.total_supply();

            for (a_to_b, raw) in moves {
                let amount = Amount::from_base_units(raw as u128);
                let (from, to) = if a_to_b { (a, b) } else { (b, a) };
                // May fail on insufficient funds; either way supply holds.
                let _ = ledger.transfer(from, to, amount);
                prop_assert_eq!(ledger.total_supply(), supply);
            }
        }
    }
}
