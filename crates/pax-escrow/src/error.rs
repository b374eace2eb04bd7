//! Structured error hierarchy for the escrow state machine.
//!
//! Every validation failure surfaces before any balance or status
//! change. There is no local recovery: callers resubmit with corrected
//! inputs.

use chrono::{DateTime, Utc};
use thiserror::Error;

use pax_core::{AccountId, Amount, LedgerError};

use crate::transaction::{TransactionId, TransactionStatus};

/// Errors arising from escrow operations.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// No transaction with the given id exists.
    #[error("transaction not found: {0}")]
    NotFound(TransactionId),

    /// The caller is not permitted to perform this operation.
    #[error("unauthorized: {account} {reason}")]
    Unauthorized {
        account: AccountId,
        reason: &'static str,
    },

    /// The transaction is not in a status that allows this operation.
    #[error("invalid state: cannot {action} while {id} is {actual}")]
    InvalidState {
        id: TransactionId,
        actual: TransactionStatus,
        action: &'static str,
    },

    /// The principal is below the configured minimum (or overflows when
    /// combined with the fee).
    #[error("invalid amount: {amount} (minimum {minimum})")]
    InvalidAmount { amount: Amount, minimum: Amount },

    /// A timeout claim arrived before its deadline.
    #[error("deadline not reached: claim allowed after {deadline}")]
    DeadlineNotReached { deadline: DateTime<Utc> },

    /// The timeout this claim relies on was never armed.
    #[error("no live deadline on {0}")]
    NoLiveDeadline(TransactionId),

    /// This party has already submitted their one rating.
    #[error("already rated: {account} on {id}")]
    AlreadyRated {
        id: TransactionId,
        account: AccountId,
    },

    /// Rating score outside `1..=5`.
    #[error("invalid rating score: {score} (must be 1..=5)")]
    InvalidRating { score: u8 },

    /// No arbitration engine is linked, so disputes cannot be opened.
    #[error("arbitration unavailable: no dispute engine linked")]
    ArbitrationUnavailable,

    /// The arbitration engine refused to open the dispute.
    #[error(transparent)]
    DisputeRejected(#[from] HandoffError),

    /// No payout is parked for the given transaction.
    #[error("no pending payout for {0}")]
    NoPendingPayout(TransactionId),

    /// Fund movement failed. Propagated opaquely from the ledger.
    #[error(transparent)]
    InsufficientFunds(#[from] LedgerError),
}

/// Opaque rejection from the arbitration side of the dispute handoff.
///
/// The escrow crate cannot name arbitration error types without a
/// dependency cycle, so the handoff seam flattens them to a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dispute rejected: {0}")]
pub struct HandoffError(pub String);
