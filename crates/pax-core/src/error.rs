//! Error types for the ledger primitives.

use thiserror::Error;

use crate::account::AccountId;
use crate::amount::Amount;

/// Errors arising from balance-book operations.
///
/// Ledger failures are opaque to the layers above: they propagate
/// unchanged to the caller of whichever operation attempted the fund
/// movement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The debited account does not hold the required amount.
    #[error("insufficient funds: {account} holds {available}, transfer requires {required}")]
    InsufficientFunds {
        account: AccountId,
        available: Amount,
        required: Amount,
    },

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow crediting {account}")]
    BalanceOverflow { account: AccountId },
}
