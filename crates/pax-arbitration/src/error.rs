//! Structured error hierarchy for dispute adjudication.

use chrono::{DateTime, Utc};
use thiserror::Error;

use pax_core::{AccountId, Amount, LedgerError};
use pax_escrow::EscrowError;

use crate::dispute::{DisputeId, DisputeStatus};

/// Errors arising from arbitration operations.
#[derive(Error, Debug)]
pub enum ArbitrationError {
    /// No dispute with the given id exists.
    #[error("dispute not found: {0}")]
    NotFound(DisputeId),

    /// The account is not a registered arbitrator.
    #[error("arbitrator not registered: {0}")]
    ArbitratorNotFound(AccountId),

    /// The stake (or top-up total) is below the registration minimum.
    #[error("insufficient stake: {offered} (minimum {minimum})")]
    InsufficientStake { offered: Amount, minimum: Amount },

    /// The account already holds an arbitrator registration.
    #[error("already registered as an arbitrator: {0}")]
    AlreadyRegistered(AccountId),

    /// The arbitrator has deactivated and cannot take this action.
    #[error("arbitrator not active: {0}")]
    NotActive(AccountId),

    /// Deactivation is blocked while assigned disputes are undecided.
    #[error("{account} still has {open_disputes} undecided dispute(s)")]
    PendingDisputeBlocksDeactivation {
        account: AccountId,
        open_disputes: usize,
    },

    /// Fewer active arbitrators than the quorum requires.
    #[error("not enough active arbitrators: {active} of {required} required")]
    NotEnoughArbitrators { active: usize, required: usize },

    /// The caller is not on this dispute's assigned quorum.
    #[error("{account} is not assigned to dispute {dispute}")]
    NotAssignedArbitrator {
        dispute: DisputeId,
        account: AccountId,
    },

    /// The arbitrator has already cast their one vote.
    #[error("{account} already voted on dispute {dispute}")]
    AlreadyVoted {
        dispute: DisputeId,
        account: AccountId,
    },

    /// The voting window has closed.
    #[error("voting closed on dispute {dispute} at {deadline}")]
    VotingClosed {
        dispute: DisputeId,
        deadline: DateTime<Utc>,
    },

    /// Finalization attempted while the voting window is still open.
    #[error("voting still open on dispute {dispute} until {deadline}")]
    VotingStillOpen {
        dispute: DisputeId,
        deadline: DateTime<Utc>,
    },

    /// The dispute is not in a status that allows this operation.
    #[error("invalid state: cannot {action} while dispute {id} is {actual}")]
    InvalidState {
        id: DisputeId,
        actual: DisputeStatus,
        action: &'static str,
    },

    /// The caller is not permitted to perform this operation.
    #[error("unauthorized: {account} {reason}")]
    Unauthorized {
        account: AccountId,
        reason: &'static str,
    },

    /// Fund movement failed. Propagated opaquely from the ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The escrow engine rejected a verdict commit.
    #[error(transparent)]
    Escrow(#[from] EscrowError),
}
