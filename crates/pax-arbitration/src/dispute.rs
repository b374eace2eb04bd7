//! # Disputes
//!
//! A dispute freezes a snapshot of the contested transaction, carries
//! the parties' evidence, and tallies the assigned quorum's votes until
//! the window closes.
//!
//! ## Status Graph
//!
//! ```text
//!   Pending ──► Voting ──► Resolved
//!                  │
//!                  └──────► Expired
//! ```
//!
//! `Pending` exists only inside dispute opening: a dispute is created
//! `Pending` and moves to `Voting` in the same call once its quorum is
//! assigned, so observers never see one without a deadline. `Resolved`
//! means a decisive majority; `Expired` means a tie or no votes at all,
//! in which case no funds move and the underlying transaction stays in
//! dispute.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pax_core::{AccountId, Amount};
use pax_escrow::TransactionId;

/// Monotonic dispute identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DisputeId(pub u64);

impl fmt::Display for DisputeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dispute:{}", self.0)
    }
}

/// Where a dispute sits in its adjudication lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Created but quorum not yet assigned. Transient within opening.
    Pending,
    /// Quorum assigned, voting window open.
    Voting,
    /// Decisive majority reached; verdict applied.
    Resolved,
    /// Window closed on a tie or with no votes. No funds moved.
    Expired,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Voting => "VOTING",
            Self::Resolved => "RESOLVED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Expired)
    }

    /// The statuses this one may legally move to.
    pub fn valid_transitions(&self) -> &'static [DisputeStatus] {
        match self {
            Self::Pending => &[Self::Voting],
            Self::Voting => &[Self::Resolved, Self::Expired],
            Self::Resolved | Self::Expired => &[],
        }
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An arbitrator's verdict on a dispute.
///
/// Abstention is not a variant: an arbitrator who never votes simply
/// has no entry in the vote map, which is what the slashing pass keys
/// off at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vote {
    Buyer,
    Seller,
}

/// A dispute over one escrow transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub transaction_id: TransactionId,
    pub buyer: AccountId,
    pub seller: AccountId,
    /// Principal in custody, snapshotted at dispute time.
    pub amount: Amount,
    /// Evidence statements, append-only, in submission order.
    pub buyer_evidence: Vec<String>,
    pub seller_evidence: Vec<String>,
    pub status: DisputeStatus,
    pub buyer_votes: u32,
    pub seller_votes: u32,
    /// Votes rejected strictly after this instant.
    pub voting_deadline: DateTime<Utc>,
    /// Winning party once resolved; `None` while open or expired.
    pub winner: Option<AccountId>,
    /// The assigned quorum, in selection order.
    pub arbitrators: Vec<AccountId>,
    /// Cast votes by arbitrator. Absence means abstention.
    pub votes: HashMap<AccountId, Vote>,
    pub opened_at: DateTime<Utc>,
}

impl Dispute {
    /// Whether the account sits on this dispute's quorum.
    pub fn is_assigned(&self, account: &AccountId) -> bool {
        self.arbitrators.contains(account)
    }

    /// The party a vote names.
    pub fn party_for(&self, vote: Vote) -> AccountId {
        match vote {
            Vote::Buyer => self.buyer,
            Vote::Seller => self.seller,
        }
    }

    /// The decisive majority, or `None` on a tie or zero votes.
    pub fn majority(&self) -> Option<Vote> {
        match self.buyer_votes.cmp(&self.seller_votes) {
            std::cmp::Ordering::Greater => Some(Vote::Buyer),
            std::cmp::Ordering::Less => Some(Vote::Seller),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_have_no_transitions() {
        assert!(DisputeStatus::Resolved.is_terminal());
        assert!(DisputeStatus::Expired.is_terminal());
        assert!(DisputeStatus::Resolved.valid_transitions().is_empty());
        assert!(!DisputeStatus::Voting.is_terminal());
        assert_eq!(
            DisputeStatus::Voting.valid_transitions(),
            &[DisputeStatus::Resolved, DisputeStatus::Expired]
        );
    }

    #[test]
    fn status_serializes_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&DisputeStatus::Voting).unwrap(),
            "\"VOTING\""
        );
        assert_eq!(DisputeStatus::Expired.as_str(), "EXPIRED");
    }
}
