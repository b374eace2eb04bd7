//! # Escrow Lifecycle Events
//!
//! Post-commit notifications emitted once per committed transition.
//! Delivery, retries, and formatting belong to whatever sits behind the
//! [`EscrowEventSink`]; the engine only guarantees that an event is
//! emitted after — never before — its transition has committed.

use pax_core::{AccountId, Amount};

use crate::transaction::TransactionId;

/// A committed escrow lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum EscrowEvent {
    TransactionCreated {
        id: TransactionId,
        buyer: AccountId,
        seller: AccountId,
        amount: Amount,
        protocol_fee: Amount,
    },
    ShipmentConfirmed {
        id: TransactionId,
    },
    TransactionCompleted {
        id: TransactionId,
        seller_paid: Amount,
        via_timeout: bool,
    },
    TransactionCancelled {
        id: TransactionId,
        buyer_refunded: Amount,
    },
    TransactionRefunded {
        id: TransactionId,
        buyer_refunded: Amount,
    },
    DisputeInitiated {
        id: TransactionId,
        dispute_id: u64,
        initiator: AccountId,
    },
    DisputeResolved {
        id: TransactionId,
        winner: AccountId,
    },
    RatingSubmitted {
        id: TransactionId,
        rater: AccountId,
        score: u8,
    },
    /// A payout failed after its transition committed and is parked for
    /// manual retry. The transition itself is never replayed.
    PayoutDeferred {
        id: TransactionId,
        to: AccountId,
        amount: Amount,
    },
}

/// Receiver of post-commit escrow events.
pub trait EscrowEventSink: Send + Sync {
    /// Deliver one event. Must not call back into the engine.
    fn emit(&self, event: &EscrowEvent);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EscrowEventSink for TracingSink {
    fn emit(&self, event: &EscrowEvent) {
        tracing::info!(?event, "escrow event");
    }
}

/// Sink that drops every event. For fixtures that do not observe events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EscrowEventSink for NullSink {
    fn emit(&self, _event: &EscrowEvent) {}
}
