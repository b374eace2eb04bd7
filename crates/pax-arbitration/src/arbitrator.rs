//! # Arbitrator Records
//!
//! A registered arbitrator: their locked stake, reputation score, and
//! service history. Stake lives in the registry's stake vault on the
//! shared ledger; this record tracks the attributed amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pax_core::{AccountId, Amount};

/// A registered dispute arbitrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arbitrator {
    pub account: AccountId,
    /// Stake currently attributed to this arbitrator in the stake vault.
    pub stake: Amount,
    /// Behavioral score, clamped to `0..=reputation_max`.
    pub reputation: u32,
    /// Inactive arbitrators are skipped by quorum selection and may
    /// withdraw their stake.
    pub active: bool,
    pub registered_at: DateTime<Utc>,
    /// Last vote or stake action.
    pub last_active_at: DateTime<Utc>,
    /// Disputes this arbitrator has been assigned to, ever.
    pub disputes_assigned: u64,
    /// Votes actually cast across those disputes.
    pub votes_cast: u64,
    /// Votes that landed with the eventual majority.
    pub correct_votes: u64,
}

impl Arbitrator {
    pub(crate) fn new(
        account: AccountId,
        stake: Amount,
        reputation: u32,
        registered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            account,
            stake,
            reputation,
            active: true,
            registered_at,
            last_active_at: registered_at,
            disputes_assigned: 0,
            votes_cast: 0,
            correct_votes: 0,
        }
    }

    /// Participation rate over all assigned disputes, if any.
    pub fn participation(&self) -> Option<f64> {
        if self.disputes_assigned == 0 {
            None
        } else {
            Some(self.votes_cast as f64 / self.disputes_assigned as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participation_is_none_until_assigned() {
        let mut arbitrator =
            Arbitrator::new(AccountId::new(), Amount::from_milli_units(50), 100, Utc::now());
        assert_eq!(arbitrator.participation(), None);

        arbitrator.disputes_assigned = 4;
        arbitrator.votes_cast = 3;
        assert_eq!(arbitrator.participation(), Some(0.75));
    }
}
