//! # Escrow Transaction Lifecycle
//!
//! The [`EscrowTransaction`] record and its status state machine:
//! `Funded → ShipmentConfirmed → Completed`, with the cancel, refund,
//! and dispute branches described on [`TransactionStatus`].
//!
//! ## Design Choice: Validated Enum over Typestate
//!
//! Status is a runtime-checked enum rather than a typestate parameter.
//! Transactions are stored in a shared arena and surfaced over a
//! fetch-by-id read API where the state is not known at compile time,
//! and several transitions (cancel, dispute, timeout claims) enter from
//! more than one calling context. Each transition is a dedicated engine
//! method that rejects wrong states with
//! [`EscrowError::InvalidState`](crate::EscrowError::InvalidState), which
//! gives the same per-call-site guarantee.
//!
//! ## Invariants
//!
//! - `amount > 0` and status transitions are monotonic: a terminal
//!   status is immutable forever.
//! - Exactly one timeout deadline is live while the transaction is in a
//!   deadline-bearing status (`Funded`: seller-ship; `ShipmentConfirmed`:
//!   buyer-confirm). `InDispute` freezes both; terminal states carry none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pax_core::{AccountId, Amount};

// ── Identifiers ────────────────────────────────────────────────────────

/// A unique identifier for an escrow transaction. Allocated
/// monotonically; the transaction arena is append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

// ── Status ─────────────────────────────────────────────────────────────

/// The lifecycle state of an escrow transaction.
///
/// ## Transition Graph
///
/// ```text
/// Funded ──confirm_shipment()──▶ ShipmentConfirmed ──confirm_receipt()──▶ Completed
///   │                                 │                                      ▲
///   ├─cancel_transaction()──▶ Cancelled│                                     │
///   │                                 ├─claim_after_buyer_timeout()──────────┘
///   └─claim_after_seller_timeout()    │
///               │                     └─initiate_dispute()──▶ InDispute
///               ▼                                                │
///           Refunded                              resolve_dispute()
///                                                                │
///                                                                ▼
///                                                        DisputeResolved
/// ```
///
/// Terminal: `Completed`, `Cancelled`, `Refunded`, `DisputeResolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Buyer's funds are in custody; waiting on the seller to ship.
    Funded,
    /// Seller declared shipment; waiting on the buyer to confirm receipt.
    ShipmentConfirmed,
    /// Funds released to the seller. Terminal state.
    Completed,
    /// A dispute is open with the arbitration engine; timeouts frozen.
    InDispute,
    /// Cancelled while still Funded; principal returned to the buyer.
    /// Terminal state.
    Cancelled,
    /// Seller-ship timeout claimed; principal returned to the buyer.
    /// Terminal state.
    Refunded,
    /// An arbitration verdict settled the transaction. Terminal state.
    DisputeResolved,
}

impl TransactionStatus {
    /// The canonical string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funded => "FUNDED",
            Self::ShipmentConfirmed => "SHIPMENT_CONFIRMED",
            Self::Completed => "COMPLETED",
            Self::InDispute => "IN_DISPUTE",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
            Self::DisputeResolved => "DISPUTE_RESOLVED",
        }
    }

    /// Whether this status is terminal (no further transitions allowed).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Cancelled | Self::Refunded | Self::DisputeResolved
        )
    }

    /// Valid target statuses from this status.
    pub fn valid_transitions(&self) -> &'static [TransactionStatus] {
        match self {
            Self::Funded => &[Self::ShipmentConfirmed, Self::Cancelled, Self::Refunded],
            Self::ShipmentConfirmed => &[Self::Completed, Self::InDispute],
            Self::InDispute => &[Self::DisputeResolved],
            Self::Completed | Self::Cancelled | Self::Refunded | Self::DisputeResolved => &[],
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Category ───────────────────────────────────────────────────────────

/// Marketplace category of the traded good or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    SecondHand,
    Freelancing,
    Services,
    Digital,
    Other,
}

impl Category {
    /// The canonical string identifier for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecondHand => "second_hand",
            Self::Freelancing => "freelancing",
            Self::Services => "services",
            Self::Digital => "digital",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── The Transaction ────────────────────────────────────────────────────

/// A custodial escrow transaction between a buyer and a seller.
///
/// Born `Funded` — creation and funding are one atomic operation, so no
/// unfunded transaction ever exists in the arena. Archived in place on
/// reaching a terminal status, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowTransaction {
    /// Arena id.
    pub id: TransactionId,
    /// The paying party.
    pub buyer: AccountId,
    /// The delivering party.
    pub seller: AccountId,
    /// Principal held in custody. Always positive.
    pub amount: Amount,
    /// Protocol fee collected at funding time, retained on every outcome.
    pub protocol_fee: Amount,
    /// Free-text description of the traded good or service.
    pub description: String,
    /// Marketplace category.
    pub category: Category,
    /// Current lifecycle status.
    pub status: TransactionStatus,
    /// When the transaction was created and funded (one instant).
    pub created_at: DateTime<Utc>,
    pub funded_at: DateTime<Utc>,
    /// When the seller confirmed shipment, if they have.
    pub shipment_confirmed_at: Option<DateTime<Utc>>,
    /// When the transaction reached a terminal status, if it has.
    pub completed_at: Option<DateTime<Utc>>,
    /// Deadline for the seller to confirm shipment. Live only in `Funded`.
    pub seller_ship_deadline: Option<DateTime<Utc>>,
    /// Deadline for the buyer to confirm receipt. Live only in
    /// `ShipmentConfirmed`.
    pub buyer_confirm_deadline: Option<DateTime<Utc>>,
    /// Whether the buyer has submitted their one rating.
    pub buyer_rated: bool,
    /// Whether the seller has submitted their one rating.
    pub seller_rated: bool,
}

impl EscrowTransaction {
    /// Whether the given account is the buyer or the seller.
    pub fn is_party(&self, account: &AccountId) -> bool {
        self.buyer == *account || self.seller == *account
    }

    /// The counter-party of the given party, if the account is a party.
    pub fn counterparty(&self, account: &AccountId) -> Option<AccountId> {
        if self.buyer == *account {
            Some(self.seller)
        } else if self.seller == *account {
            Some(self.buyer)
        } else {
            None
        }
    }
}
