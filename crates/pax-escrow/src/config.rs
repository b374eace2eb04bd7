//! Escrow engine configuration.
//!
//! The timeout windows are deployment policy, not protocol constants, so
//! they live here rather than in code.

use chrono::Duration;

use pax_core::Amount;

/// Tunable parameters of the escrow state machine.
#[derive(Debug, Clone)]
pub struct EscrowConfig {
    /// Protocol fee in basis points, collected on top of the principal at
    /// funding time. Default 150 (1.5%).
    pub protocol_fee_bps: u32,
    /// Smallest accepted principal. Default 0.001 unit.
    pub min_amount: Amount,
    /// How long the seller has to confirm shipment before the buyer may
    /// claim a refund.
    pub seller_ship_window: Duration,
    /// How long the buyer has to confirm receipt before the seller may
    /// claim the funds.
    pub buyer_confirm_window: Duration,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            protocol_fee_bps: 150,
            min_amount: Amount::from_milli_units(1),
            seller_ship_window: Duration::days(7),
            buyer_confirm_window: Duration::days(14),
        }
    }
}

impl EscrowConfig {
    /// The protocol fee for a given principal.
    pub fn protocol_fee(&self, amount: Amount) -> Amount {
        amount.bps(self.protocol_fee_bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_fee_is_one_and_a_half_percent() {
        let config = EscrowConfig::default();
        assert_eq!(
            config.protocol_fee(Amount::from_units(1)),
            Amount::from_milli_units(15)
        );
    }

    #[test]
    fn default_minimum_is_one_milli_unit() {
        assert_eq!(
            EscrowConfig::default().min_amount,
            Amount::from_milli_units(1)
        );
    }
}
