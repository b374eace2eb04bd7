//! # Ratings and User Profiles
//!
//! Post-settlement peer ratings (1–5) and the per-account aggregate
//! profile maintained across transactions. Each party to a settled
//! transaction may rate the counter-party exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transaction::TransactionId;

/// Lowest accepted rating score.
pub const MIN_RATING: u8 = 1;
/// Highest accepted rating score.
pub const MAX_RATING: u8 = 5;

/// A single rating left by one party about the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// Score in `1..=5`.
    pub score: u8,
    /// Free-text comment.
    pub comment: String,
    /// When the rating was submitted.
    pub timestamp: DateTime<Utc>,
    /// The settled transaction this rating refers to.
    pub transaction_id: TransactionId,
}

/// Aggregate marketplace history of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub total_transactions_as_buyer: u64,
    pub total_transactions_as_seller: u64,
    pub completed_transactions: u64,
    pub disputed_transactions: u64,
    pub total_ratings_received: u64,
    pub rating_sum: u64,
}

impl UserProfile {
    /// Record a received rating.
    pub(crate) fn record_rating(&mut self, score: u8) {
        self.total_ratings_received += 1;
        self.rating_sum += score as u64;
    }

    /// Mean received rating, or `None` before the first rating.
    pub fn average_rating(&self) -> Option<f64> {
        if self.total_ratings_received == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.total_ratings_received as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_none_until_rated() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.average_rating(), None);

        profile.record_rating(5);
        profile.record_rating(4);
        assert_eq!(profile.average_rating(), Some(4.5));
        assert_eq!(profile.total_ratings_received, 2);
        assert_eq!(profile.rating_sum, 9);
    }
}
