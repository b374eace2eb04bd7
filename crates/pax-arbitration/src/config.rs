//! Arbitration engine configuration.
//!
//! Quorum size and voting period are protocol parameters a deployment
//! may tune; the defaults match the production values.

use chrono::Duration;

use pax_core::Amount;

/// Tunable parameters of the dispute engine.
#[derive(Debug, Clone)]
pub struct ArbitrationConfig {
    /// Minimum stake to register as an arbitrator. Default 0.05 unit.
    pub min_stake: Amount,
    /// Arbitrators assigned per dispute. Default 5.
    pub quorum_size: usize,
    /// Length of the voting window. Default 3 days.
    pub voting_period: Duration,
    /// Share of the disputed principal carved out as the voter reward
    /// pool, in basis points. Default 50 (0.5%).
    pub reward_pool_bps: u32,
    /// Share of a non-voter's stake slashed at finalization, in basis
    /// points. Default 500 (5%).
    pub slash_bps: u32,
    /// Reputation score assigned at registration.
    pub reputation_baseline: u32,
    /// Reputation ceiling.
    pub reputation_max: u32,
    /// Reputation gained by voting with the majority.
    pub reputation_reward: u32,
    /// Reputation lost by failing to vote.
    pub reputation_penalty: u32,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            min_stake: Amount::from_milli_units(50),
            quorum_size: 5,
            voting_period: Duration::days(3),
            reward_pool_bps: 50,
            slash_bps: 500,
            reputation_baseline: 100,
            reputation_max: 200,
            reputation_reward: 5,
            reputation_penalty: 10,
        }
    }
}

impl ArbitrationConfig {
    /// The voter reward pool carved from a disputed principal.
    pub fn reward_pool(&self, amount: Amount) -> Amount {
        amount.bps(self.reward_pool_bps)
    }

    /// The slash taken from a non-voter's stake.
    pub fn slash(&self, stake: Amount) -> Amount {
        stake.bps(self.slash_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reward_pool_is_half_a_percent() {
        let config = ArbitrationConfig::default();
        assert_eq!(
            config.reward_pool(Amount::from_units(1)),
            Amount::from_milli_units(5)
        );
    }

    #[test]
    fn default_slash_is_five_percent_of_stake() {
        let config = ArbitrationConfig::default();
        assert_eq!(
            config.slash(Amount::from_milli_units(100)),
            Amount::from_milli_units(5)
        );
    }
}
