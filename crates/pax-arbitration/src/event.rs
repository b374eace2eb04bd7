//! Post-commit dispute lifecycle events.

use pax_core::{AccountId, Amount};
use pax_escrow::TransactionId;

use crate::dispute::{DisputeId, Vote};

/// A committed arbitration lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbitrationEvent {
    ArbitratorRegistered {
        account: AccountId,
        stake: Amount,
    },
    StakeIncreased {
        account: AccountId,
        total_stake: Amount,
    },
    ArbitratorDeactivated {
        account: AccountId,
        stake_returned: Amount,
    },
    DisputeOpened {
        id: DisputeId,
        transaction_id: TransactionId,
        arbitrators: Vec<AccountId>,
    },
    EvidenceSubmitted {
        id: DisputeId,
        party: AccountId,
    },
    VoteCast {
        id: DisputeId,
        arbitrator: AccountId,
        vote: Vote,
    },
    /// A decisive majority; the verdict has been applied to the
    /// underlying transaction and payouts drawn.
    DisputeResolved {
        id: DisputeId,
        winner: AccountId,
        winner_paid: Amount,
        reward_per_voter: Amount,
    },
    /// The window closed on a tie or with no votes. No funds moved.
    DisputeExpired {
        id: DisputeId,
    },
    ArbitratorSlashed {
        id: DisputeId,
        arbitrator: AccountId,
        amount: Amount,
    },
    /// A payout failed after the verdict committed and is parked for
    /// manual retry.
    PayoutDeferred {
        id: DisputeId,
        to: AccountId,
        amount: Amount,
    },
}

/// Receiver of post-commit arbitration events.
pub trait ArbitrationEventSink: Send + Sync {
    /// Deliver one event. Must not call back into the engine.
    fn emit(&self, event: &ArbitrationEvent);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ArbitrationEventSink for TracingSink {
    fn emit(&self, event: &ArbitrationEvent) {
        tracing::info!(?event, "arbitration event");
    }
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ArbitrationEventSink for NullSink {
    fn emit(&self, _event: &ArbitrationEvent) {}
}
