//! # Escrow Engine
//!
//! Owns the transaction arena and drives every lifecycle transition.
//! Funds live in two internal ledger accounts: the **vault** (custodied
//! principals) and the **treasury** (protocol fees, collected at funding
//! time and retained on every outcome).
//!
//! ## Two-Phase Discipline
//!
//! Every mutating operation runs as: validate → commit the status
//! transition → move funds. Validation failures abort before any state
//! change. A fund movement that fails *after* the commit point does not
//! roll the transition back — the payout is parked in the pending-payout
//! ledger and must be retried with [`EscrowEngine::retry_payout`], never
//! by replaying the transition. This is what makes retried calls unable
//! to pay twice: the transition is the once-only gate, and the payout
//! step is idempotent against it.
//!
//! ## Locking
//!
//! The arena is a `DashMap` keyed by [`TransactionId`]; an operation
//! validates and commits under its entry's own write guard, so
//! independent transactions never contend and no partial application is
//! observable. `initiate_dispute` is the one operation that calls out
//! (to the arbitration handoff) while holding its entry; the arbitration
//! engine upholds the reverse discipline by releasing its dispute entry
//! before calling back into this arena, so the two arenas are never
//! locked in opposite orders.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;

use pax_core::{AccountId, Amount, Clock, IdAllocator, Ledger};

use crate::config::EscrowConfig;
use crate::error::{EscrowError, HandoffError};
use crate::event::{EscrowEvent, EscrowEventSink};
use crate::rating::{Rating, UserProfile, MAX_RATING, MIN_RATING};
use crate::transaction::{Category, EscrowTransaction, TransactionId, TransactionStatus};

// ── Dispute handoff seam ───────────────────────────────────────────────

/// The transaction data frozen into a dispute at the moment it opens.
#[derive(Debug, Clone, PartialEq)]
pub struct DisputeSnapshot {
    pub transaction_id: TransactionId,
    pub buyer: AccountId,
    pub seller: AccountId,
    /// Principal in custody, captured at dispute time.
    pub amount: Amount,
    /// The party who initiated the dispute.
    pub initiator: AccountId,
    /// The initiator's stated reason; becomes their opening evidence.
    pub reason: String,
}

/// The escrow side of the escrow ↔ arbitration link.
///
/// Mirrors the deployment-time contract linking of the two engines: the
/// arbitration engine implements this trait and registers itself via
/// [`EscrowEngine::set_arbitration`]. Implementations must not call back
/// into the escrow engine during `open_dispute` — the calling
/// transaction's entry is held across the call.
pub trait ArbitrationHandoff: Send + Sync {
    /// Open a dispute for the snapshotted transaction, assigning a
    /// quorum and starting the voting window. Returns the dispute id.
    fn open_dispute(&self, snapshot: DisputeSnapshot) -> Result<u64, HandoffError>;
}

/// A payout that failed after its transition committed.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingPayout {
    to: AccountId,
    amount: Amount,
}

// ── The engine ─────────────────────────────────────────────────────────

/// The escrow state machine over the transaction arena.
pub struct EscrowEngine {
    config: EscrowConfig,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EscrowEventSink>,
    ids: IdAllocator,
    transactions: DashMap<TransactionId, EscrowTransaction>,
    user_transactions: DashMap<AccountId, Vec<TransactionId>>,
    profiles: DashMap<AccountId, UserProfile>,
    ratings: DashMap<AccountId, Vec<Rating>>,
    pending_payouts: DashMap<TransactionId, PendingPayout>,
    arbitration: RwLock<Option<Weak<dyn ArbitrationHandoff>>>,
    vault: AccountId,
    treasury: AccountId,
}

impl EscrowEngine {
    /// Create an engine over the given ledger with fresh custody accounts.
    pub fn new(
        config: EscrowConfig,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EscrowEventSink>,
    ) -> Self {
        Self {
            config,
            ledger,
            clock,
            sink,
            ids: IdAllocator::new(),
            transactions: DashMap::new(),
            user_transactions: DashMap::new(),
            profiles: DashMap::new(),
            ratings: DashMap::new(),
            pending_payouts: DashMap::new(),
            arbitration: RwLock::new(None),
            vault: AccountId::new(),
            treasury: AccountId::new(),
        }
    }

    /// Link the arbitration engine. Held weakly; the arbitration engine
    /// owns the strong reference to this engine, not the other way round.
    pub fn set_arbitration(&self, handoff: Weak<dyn ArbitrationHandoff>) {
        *self.arbitration.write() = Some(handoff);
    }

    /// The custody account holding escrowed principals.
    pub fn vault_account(&self) -> AccountId {
        self.vault
    }

    /// The protocol fee account.
    pub fn treasury_account(&self) -> AccountId {
        self.treasury
    }

    /// The engine configuration.
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    // ── Write operations ───────────────────────────────────────────

    /// Atomically create a transaction and take `amount + fee` from the
    /// buyer into custody. The transaction is born `Funded` with the
    /// seller-ship deadline armed.
    pub fn create_and_fund(
        &self,
        buyer: AccountId,
        seller: AccountId,
        amount: Amount,
        description: impl Into<String>,
        category: Category,
    ) -> Result<TransactionId, EscrowError> {
        if buyer == seller {
            return Err(EscrowError::Unauthorized {
                account: buyer,
                reason: "cannot trade with themselves",
            });
        }
        if amount < self.config.min_amount {
            return Err(EscrowError::InvalidAmount {
                amount,
                minimum: self.config.min_amount,
            });
        }
        let fee = self.config.protocol_fee(amount);
        let total = amount
            .checked_add(fee)
            .ok_or(EscrowError::InvalidAmount {
                amount,
                minimum: self.config.min_amount,
            })?;

        // Custody first: a funding failure must leave no record behind.
        self.ledger.transfer(buyer, self.vault, total)?;
        // The fee is the protocol's on every outcome, so it moves to the
        // treasury immediately; only the principal stays in the vault.
        self.ledger.transfer(self.vault, self.treasury, fee)?;

        let now = self.clock.now();
        let id = TransactionId(self.ids.next());
        let transaction = EscrowTransaction {
            id,
            buyer,
            seller,
            amount,
            protocol_fee: fee,
            description: description.into(),
            category,
            status: TransactionStatus::Funded,
            created_at: now,
            funded_at: now,
            shipment_confirmed_at: None,
            completed_at: None,
            seller_ship_deadline: Some(now + self.config.seller_ship_window),
            buyer_confirm_deadline: None,
            buyer_rated: false,
            seller_rated: false,
        };
        self.transactions.insert(id, transaction);

        for account in [buyer, seller] {
            self.user_transactions.entry(account).or_default().push(id);
        }
        self.profiles
            .entry(buyer)
            .or_default()
            .total_transactions_as_buyer += 1;
        self.profiles
            .entry(seller)
            .or_default()
            .total_transactions_as_seller += 1;

        self.sink.emit(&EscrowEvent::TransactionCreated {
            id,
            buyer,
            seller,
            amount,
            protocol_fee: fee,
        });
        Ok(id)
    }

    /// Seller declares shipment: `Funded → ShipmentConfirmed`. Swaps the
    /// live deadline from seller-ship to buyer-confirm.
    pub fn confirm_shipment(
        &self,
        caller: AccountId,
        id: TransactionId,
    ) -> Result<(), EscrowError> {
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if caller != tx.seller {
            return Err(EscrowError::Unauthorized {
                account: caller,
                reason: "only the seller confirms shipment",
            });
        }
        require_status(tx, TransactionStatus::Funded, "confirm shipment")?;

        tx.status = TransactionStatus::ShipmentConfirmed;
        tx.shipment_confirmed_at = Some(now);
        tx.seller_ship_deadline = None;
        tx.buyer_confirm_deadline = Some(now + self.config.buyer_confirm_window);
        drop(entry);

        self.sink.emit(&EscrowEvent::ShipmentConfirmed { id });
        Ok(())
    }

    /// Buyer confirms receipt: `ShipmentConfirmed → Completed`. The
    /// seller is credited the principal; the fee stays with the treasury.
    pub fn confirm_receipt(
        &self,
        caller: AccountId,
        id: TransactionId,
    ) -> Result<(), EscrowError> {
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if caller != tx.buyer {
            return Err(EscrowError::Unauthorized {
                account: caller,
                reason: "only the buyer confirms receipt",
            });
        }
        require_status(tx, TransactionStatus::ShipmentConfirmed, "confirm receipt")?;

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(now);
        tx.buyer_confirm_deadline = None;
        let (seller, amount) = (tx.seller, tx.amount);
        self.settle(id, seller, amount);
        drop(entry);

        self.record_completion(id);
        self.sink.emit(&EscrowEvent::TransactionCompleted {
            id,
            seller_paid: amount,
            via_timeout: false,
        });
        Ok(())
    }

    /// Either party cancels a still-`Funded` transaction. The buyer is
    /// refunded exactly the principal; the fee is not returned.
    pub fn cancel_transaction(
        &self,
        caller: AccountId,
        id: TransactionId,
    ) -> Result<(), EscrowError> {
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if !tx.is_party(&caller) {
            return Err(EscrowError::Unauthorized {
                account: caller,
                reason: "is not a party to this transaction",
            });
        }
        require_status(tx, TransactionStatus::Funded, "cancel")?;

        tx.status = TransactionStatus::Cancelled;
        tx.completed_at = Some(now);
        tx.seller_ship_deadline = None;
        let (buyer, amount) = (tx.buyer, tx.amount);
        self.settle(id, buyer, amount);
        drop(entry);

        self.sink.emit(&EscrowEvent::TransactionCancelled {
            id,
            buyer_refunded: amount,
        });
        Ok(())
    }

    /// Either party opens a dispute on a `ShipmentConfirmed`
    /// transaction. Both deadlines freeze; the arbitration engine
    /// receives a snapshot and returns the dispute id. A rejected
    /// handoff (for example, too few active arbitrators) aborts the call
    /// with no state change.
    pub fn initiate_dispute(
        &self,
        caller: AccountId,
        id: TransactionId,
        reason: &str,
    ) -> Result<u64, EscrowError> {
        let handoff = self
            .arbitration
            .read()
            .clone()
            .and_then(|weak| weak.upgrade())
            .ok_or(EscrowError::ArbitrationUnavailable)?;

        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if !tx.is_party(&caller) {
            return Err(EscrowError::Unauthorized {
                account: caller,
                reason: "is not a party to this transaction",
            });
        }
        require_status(tx, TransactionStatus::ShipmentConfirmed, "initiate a dispute")?;

        let snapshot = DisputeSnapshot {
            transaction_id: id,
            buyer: tx.buyer,
            seller: tx.seller,
            amount: tx.amount,
            initiator: caller,
            reason: reason.to_string(),
        };
        let dispute_id = handoff.open_dispute(snapshot)?;

        tx.status = TransactionStatus::InDispute;
        tx.seller_ship_deadline = None;
        tx.buyer_confirm_deadline = None;
        let (buyer, seller) = (tx.buyer, tx.seller);
        drop(entry);

        for account in [buyer, seller] {
            self.profiles.entry(account).or_default().disputed_transactions += 1;
        }
        self.sink.emit(&EscrowEvent::DisputeInitiated {
            id,
            dispute_id,
            initiator: caller,
        });
        Ok(dispute_id)
    }

    /// Buyer claims back the principal after the seller missed the ship
    /// deadline: `Funded → Refunded`.
    pub fn claim_after_seller_timeout(
        &self,
        caller: AccountId,
        id: TransactionId,
    ) -> Result<(), EscrowError> {
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if caller != tx.buyer {
            return Err(EscrowError::Unauthorized {
                account: caller,
                reason: "only the buyer claims a seller timeout",
            });
        }
        require_status(tx, TransactionStatus::Funded, "claim a seller timeout")?;
        let deadline = tx
            .seller_ship_deadline
            .ok_or(EscrowError::NoLiveDeadline(id))?;
        if now <= deadline {
            return Err(EscrowError::DeadlineNotReached { deadline });
        }

        tx.status = TransactionStatus::Refunded;
        tx.completed_at = Some(now);
        tx.seller_ship_deadline = None;
        let (buyer, amount) = (tx.buyer, tx.amount);
        self.settle(id, buyer, amount);
        drop(entry);

        self.sink.emit(&EscrowEvent::TransactionRefunded {
            id,
            buyer_refunded: amount,
        });
        Ok(())
    }

    /// Seller claims the principal after the buyer missed the confirm
    /// deadline: `ShipmentConfirmed → Completed`.
    pub fn claim_after_buyer_timeout(
        &self,
        caller: AccountId,
        id: TransactionId,
    ) -> Result<(), EscrowError> {
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if caller != tx.seller {
            return Err(EscrowError::Unauthorized {
                account: caller,
                reason: "only the seller claims a buyer timeout",
            });
        }
        require_status(tx, TransactionStatus::ShipmentConfirmed, "claim a buyer timeout")?;
        let deadline = tx
            .buyer_confirm_deadline
            .ok_or(EscrowError::NoLiveDeadline(id))?;
        if now <= deadline {
            return Err(EscrowError::DeadlineNotReached { deadline });
        }

        tx.status = TransactionStatus::Completed;
        tx.completed_at = Some(now);
        tx.buyer_confirm_deadline = None;
        let (seller, amount) = (tx.seller, tx.amount);
        self.settle(id, seller, amount);
        drop(entry);

        self.record_completion(id);
        self.sink.emit(&EscrowEvent::TransactionCompleted {
            id,
            seller_paid: amount,
            via_timeout: true,
        });
        Ok(())
    }

    /// Apply an arbitration verdict: `InDispute → DisputeResolved`.
    ///
    /// Called by the dispute engine after a decisive tally. Commits the
    /// terminal status only — the dispute engine owns the winner payout,
    /// reward split, and slashing, all drawn against the vault via the
    /// ledger primitives.
    pub fn resolve_dispute(
        &self,
        id: TransactionId,
        winner: AccountId,
    ) -> Result<(), EscrowError> {
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if !tx.is_party(&winner) {
            return Err(EscrowError::Unauthorized {
                account: winner,
                reason: "verdict winner must be a transaction party",
            });
        }
        require_status(tx, TransactionStatus::InDispute, "resolve a dispute")?;

        tx.status = TransactionStatus::DisputeResolved;
        tx.completed_at = Some(now);
        drop(entry);

        self.sink.emit(&EscrowEvent::DisputeResolved { id, winner });
        Ok(())
    }

    /// Rate the counter-party of a settled transaction. Once per party.
    pub fn submit_rating(
        &self,
        caller: AccountId,
        id: TransactionId,
        score: u8,
        comment: impl Into<String>,
    ) -> Result<(), EscrowError> {
        if !(MIN_RATING..=MAX_RATING).contains(&score) {
            return Err(EscrowError::InvalidRating { score });
        }
        let now = self.clock.now();
        let mut entry = self.transactions.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let tx = entry.value_mut();

        if !matches!(
            tx.status,
            TransactionStatus::Completed | TransactionStatus::DisputeResolved
        ) {
            return Err(EscrowError::InvalidState {
                id,
                actual: tx.status,
                action: "rate",
            });
        }
        let counterparty = tx
            .counterparty(&caller)
            .ok_or(EscrowError::Unauthorized {
                account: caller,
                reason: "is not a party to this transaction",
            })?;
        let rated_flag = if caller == tx.buyer {
            &mut tx.buyer_rated
        } else {
            &mut tx.seller_rated
        };
        if *rated_flag {
            return Err(EscrowError::AlreadyRated { id, account: caller });
        }
        *rated_flag = true;
        drop(entry);

        self.ratings.entry(counterparty).or_default().push(Rating {
            score,
            comment: comment.into(),
            timestamp: now,
            transaction_id: id,
        });
        self.profiles
            .entry(counterparty)
            .or_default()
            .record_rating(score);

        self.sink.emit(&EscrowEvent::RatingSubmitted {
            id,
            rater: caller,
            score,
        });
        Ok(())
    }

    /// Retry a payout that failed after its transition committed. Only
    /// the payout step re-runs; the transition is never replayed.
    pub fn retry_payout(&self, id: TransactionId) -> Result<(), EscrowError> {
        let (_, payout) = self
            .pending_payouts
            .remove(&id)
            .ok_or(EscrowError::NoPendingPayout(id))?;
        if let Err(err) = self.ledger.transfer(self.vault, payout.to, payout.amount) {
            self.pending_payouts.insert(id, payout);
            return Err(err.into());
        }
        Ok(())
    }

    // ── Read surface ───────────────────────────────────────────────

    /// Fetch a transaction by id.
    pub fn transaction(&self, id: TransactionId) -> Option<EscrowTransaction> {
        self.transactions.get(&id).map(|entry| entry.value().clone())
    }

    /// All transaction ids the account participates in, oldest first.
    pub fn user_transactions(&self, account: &AccountId) -> Vec<TransactionId> {
        self.user_transactions
            .get(account)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// The account's aggregate marketplace profile.
    pub fn user_profile(&self, account: &AccountId) -> UserProfile {
        self.profiles
            .get(account)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Ratings received by the account, oldest first.
    pub fn user_ratings(&self, account: &AccountId) -> Vec<Rating> {
        self.ratings
            .get(account)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Mean rating received by the account, if any.
    pub fn average_rating(&self, account: &AccountId) -> Option<f64> {
        self.user_profile(account).average_rating()
    }

    /// Number of transactions ever created.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// The protocol fee that `create_and_fund` would collect on top of
    /// the given principal.
    pub fn calculate_protocol_fee(&self, amount: Amount) -> Amount {
        self.config.protocol_fee(amount)
    }

    /// The parked payout for a transaction, if one is pending.
    pub fn pending_payout(&self, id: TransactionId) -> Option<(AccountId, Amount)> {
        self.pending_payouts
            .get(&id)
            .map(|entry| (entry.to, entry.amount))
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Move a committed payout out of the vault. On failure the payout
    /// is parked; the already-committed transition stands.
    fn settle(&self, id: TransactionId, to: AccountId, amount: Amount) {
        if let Err(err) = self.ledger.transfer(self.vault, to, amount) {
            tracing::error!(%id, %to, %amount, %err, "payout failed after commit; parked for retry");
            self.pending_payouts.insert(id, PendingPayout { to, amount });
            self.sink.emit(&EscrowEvent::PayoutDeferred { id, to, amount });
        }
    }

    fn record_completion(&self, id: TransactionId) {
        if let Some(tx) = self.transaction(id) {
            for account in [tx.buyer, tx.seller] {
                self.profiles.entry(account).or_default().completed_transactions += 1;
            }
        }
    }
}

impl std::fmt::Debug for EscrowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowEngine")
            .field("transactions", &self.transactions.len())
            .field("pending_payouts", &self.pending_payouts.len())
            .finish()
    }
}

/// Check the status precondition of a transition.
fn require_status(
    tx: &EscrowTransaction,
    required: TransactionStatus,
    action: &'static str,
) -> Result<(), EscrowError> {
    if tx.status != required {
        return Err(EscrowError::InvalidState {
            id: tx.id,
            actual: tx.status,
            action,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pax_core::ManualClock;

    use crate::event::NullSink;

    struct Fixture {
        ledger: Arc<Ledger>,
        clock: Arc<ManualClock>,
        engine: EscrowEngine,
        buyer: AccountId,
        seller: AccountId,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(Ledger::new());
        let clock = Arc::new(ManualClock::default());
        let engine = EscrowEngine::new(
            EscrowConfig::default(),
            Arc::clone(&ledger),
            Arc::clone(&clock) as Arc<dyn Clock>,
            Arc::new(NullSink),
        );
        let buyer = AccountId::new();
        let seller = AccountId::new();
        ledger.deposit(buyer, Amount::from_units(10)).unwrap();
        Fixture {
            ledger,
            clock,
            engine,
            buyer,
            seller,
        }
    }

    fn funded_transaction(fx: &Fixture) -> TransactionId {
        fx.engine
            .create_and_fund(
                fx.buyer,
                fx.seller,
                Amount::from_units(1),
                "vintage synth",
                Category::SecondHand,
            )
            .unwrap()
    }

    #[test]
    fn create_and_fund_takes_amount_plus_fee_into_custody() {
        let fx = fixture();
        let id = funded_transaction(&fx);

        // 1 unit principal + 1.5% fee = 1.015 debited from the buyer.
        assert_eq!(
            fx.ledger.balance(&fx.buyer),
            Amount::from_units(10)
                .checked_sub(Amount::from_milli_units(1_015))
                .unwrap()
        );
        assert_eq!(
            fx.ledger.balance(&fx.engine.vault_account()),
            Amount::from_units(1)
        );
        assert_eq!(
            fx.ledger.balance(&fx.engine.treasury_account()),
            Amount::from_milli_units(15)
        );

        let tx = fx.engine.transaction(id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Funded);
        assert!(tx.seller_ship_deadline.is_some());
        assert!(tx.buyer_confirm_deadline.is_none());
    }

    #[test]
    fn create_rejects_self_dealing_and_dust() {
        let fx = fixture();
        assert!(matches!(
            fx.engine.create_and_fund(
                fx.buyer,
                fx.buyer,
                Amount::from_units(1),
                "",
                Category::Other
            ),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert!(matches!(
            fx.engine.create_and_fund(
                fx.buyer,
                fx.seller,
                Amount::from_base_units(1),
                "",
                Category::Other
            ),
            Err(EscrowError::InvalidAmount { .. })
        ));
        assert_eq!(fx.engine.transaction_count(), 0);
        assert_eq!(fx.ledger.balance(&fx.buyer), Amount::from_units(10));
    }

    #[test]
    fn create_fails_cleanly_when_buyer_cannot_cover_fee() {
        let fx = fixture();
        let poor = AccountId::new();
        fx.ledger.deposit(poor, Amount::from_units(1)).unwrap();

        // Can cover the principal but not principal + fee.
        let err = fx
            .engine
            .create_and_fund(poor, fx.seller, Amount::from_units(1), "", Category::Other)
            .unwrap_err();
        assert!(matches!(err, EscrowError::InsufficientFunds(_)));
        assert_eq!(fx.ledger.balance(&poor), Amount::from_units(1));
        assert_eq!(fx.engine.transaction_count(), 0);
    }

    #[test]
    fn happy_path_releases_principal_and_keeps_fee() {
        let fx = fixture();
        let id = funded_transaction(&fx);

        fx.engine.confirm_shipment(fx.seller, id).unwrap();
        let tx = fx.engine.transaction(id).unwrap();
        assert_eq!(tx.status, TransactionStatus::ShipmentConfirmed);
        assert!(tx.seller_ship_deadline.is_none());
        assert!(tx.buyer_confirm_deadline.is_some());

        fx.engine.confirm_receipt(fx.buyer, id).unwrap();
        let tx = fx.engine.transaction(id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(fx.ledger.balance(&fx.seller), Amount::from_units(1));
        assert_eq!(
            fx.ledger.balance(&fx.engine.treasury_account()),
            Amount::from_milli_units(15)
        );
        assert_eq!(fx.ledger.balance(&fx.engine.vault_account()), Amount::ZERO);

        let profile = fx.engine.user_profile(&fx.buyer);
        assert_eq!(profile.completed_transactions, 1);
    }

    #[test]
    fn wrong_caller_and_wrong_status_are_rejected() {
        let fx = fixture();
        let id = funded_transaction(&fx);

        // Buyer cannot confirm shipment; seller cannot confirm receipt.
        assert!(matches!(
            fx.engine.confirm_shipment(fx.buyer, id),
            Err(EscrowError::Unauthorized { .. })
        ));
        assert!(matches!(
            fx.engine.confirm_receipt(fx.buyer, id),
            Err(EscrowError::InvalidState { .. })
        ));

        fx.engine.confirm_shipment(fx.seller, id).unwrap();
        assert!(matches!(
            fx.engine.confirm_receipt(fx.seller, id),
            Err(EscrowError::Unauthorized { .. })
        ));
        // Cancel is Funded-only.
        assert!(matches!(
            fx.engine.cancel_transaction(fx.buyer, id),
            Err(EscrowError::InvalidState { .. })
        ));
    }

    #[test]
    fn cancel_refunds_exactly_the_principal() {
        let fx = fixture();
        let id = funded_transaction(&fx);
        let before = fx.ledger.balance(&fx.buyer);

        fx.engine.cancel_transaction(fx.seller, id).unwrap();

        // The refund is the principal only; the 0.015 fee stays with the
        // treasury.
        assert_eq!(
            fx.ledger.balance(&fx.buyer),
            before.checked_add(Amount::from_units(1)).unwrap()
        );
        assert_eq!(
            fx.ledger.balance(&fx.engine.treasury_account()),
            Amount::from_milli_units(15)
        );
        let tx = fx.engine.transaction(id).unwrap();
        assert_eq!(tx.status, TransactionStatus::Cancelled);
        assert!(tx.status.is_terminal());
    }

    #[test]
    fn seller_timeout_claim_pays_once_then_rejects() {
        let fx = fixture();
        let id = funded_transaction(&fx);

        // Too early.
        assert!(matches!(
            fx.engine.claim_after_seller_timeout(fx.buyer, id),
            Err(EscrowError::DeadlineNotReached { .. })
        ));

        fx.clock.advance(Duration::days(8));
        let before = fx.ledger.balance(&fx.buyer);
        fx.engine.claim_after_seller_timeout(fx.buyer, id).unwrap();
        assert_eq!(
            fx.engine.transaction(id).unwrap().status,
            TransactionStatus::Refunded
        );
        assert_eq!(
            fx.ledger.balance(&fx.buyer),
            before.checked_add(Amount::from_units(1)).unwrap()
        );

        // Second claim: InvalidState, no balance change.
        let after = fx.ledger.balance(&fx.buyer);
        assert!(matches!(
            fx.engine.claim_after_seller_timeout(fx.buyer, id),
            Err(EscrowError::InvalidState { .. })
        ));
        assert_eq!(fx.ledger.balance(&fx.buyer), after);
    }

    #[test]
    fn buyer_timeout_claim_completes_for_the_seller() {
        let fx = fixture();
        let id = funded_transaction(&fx);
        fx.engine.confirm_shipment(fx.seller, id).unwrap();

        assert!(matches!(
            fx.engine.claim_after_buyer_timeout(fx.seller, id),
            Err(EscrowError::DeadlineNotReached { .. })
        ));
        // Only the seller may claim.
        fx.clock.advance(Duration::days(15));
        assert!(matches!(
            fx.engine.claim_after_buyer_timeout(fx.buyer, id),
            Err(EscrowError::Unauthorized { .. })
        ));

        fx.engine.claim_after_buyer_timeout(fx.seller, id).unwrap();
        assert_eq!(
            fx.engine.transaction(id).unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(fx.ledger.balance(&fx.seller), Amount::from_units(1));
    }

    #[test]
    fn rating_is_once_per_party_and_feeds_the_average() {
        let fx = fixture();
        let id = funded_transaction(&fx);
        fx.engine.confirm_shipment(fx.seller, id).unwrap();

        // Not ratable before settlement.
        assert!(matches!(
            fx.engine.submit_rating(fx.buyer, id, 5, "great"),
            Err(EscrowError::InvalidState { .. })
        ));

        fx.engine.confirm_receipt(fx.buyer, id).unwrap();
        fx.engine.submit_rating(fx.buyer, id, 5, "fast shipping").unwrap();
        fx.engine.submit_rating(fx.seller, id, 3, "slow to confirm").unwrap();

        assert!(matches!(
            fx.engine.submit_rating(fx.buyer, id, 1, "changed my mind"),
            Err(EscrowError::AlreadyRated { .. })
        ));
        assert!(matches!(
            fx.engine.submit_rating(fx.buyer, id, 0, ""),
            Err(EscrowError::InvalidRating { .. })
        ));

        assert_eq!(fx.engine.average_rating(&fx.seller), Some(5.0));
        assert_eq!(fx.engine.average_rating(&fx.buyer), Some(3.0));
        assert_eq!(fx.engine.user_ratings(&fx.seller).len(), 1);
    }

    #[test]
    fn initiate_dispute_without_linked_arbitration_fails_closed() {
        let fx = fixture();
        let id = funded_transaction(&fx);
        fx.engine.confirm_shipment(fx.seller, id).unwrap();

        let err = fx
            .engine
            .initiate_dispute(fx.buyer, id, "never arrived")
            .unwrap_err();
        assert!(matches!(err, EscrowError::ArbitrationUnavailable));
        assert_eq!(
            fx.engine.transaction(id).unwrap().status,
            TransactionStatus::ShipmentConfirmed
        );
    }

    #[test]
    fn payout_failure_after_commit_parks_and_retries() {
        let fx = fixture();
        let id = funded_transaction(&fx);
        fx.engine.confirm_shipment(fx.seller, id).unwrap();

        // Simulate an operational fault: the vault is drained out from
        // under the engine before the payout runs.
        let drain = AccountId::new();
        fx.ledger
            .transfer(fx.engine.vault_account(), drain, Amount::from_units(1))
            .unwrap();

        // The transition still commits; the payout parks.
        fx.engine.confirm_receipt(fx.buyer, id).unwrap();
        assert_eq!(
            fx.engine.transaction(id).unwrap().status,
            TransactionStatus::Completed
        );
        assert_eq!(fx.ledger.balance(&fx.seller), Amount::ZERO);
        assert_eq!(
            fx.engine.pending_payout(id),
            Some((fx.seller, Amount::from_units(1)))
        );

        // Retry still fails while the vault is short, and the payout
        // stays parked.
        assert!(fx.engine.retry_payout(id).is_err());
        assert!(fx.engine.pending_payout(id).is_some());

        // Restore the vault; the retry pays exactly once.
        fx.ledger
            .transfer(drain, fx.engine.vault_account(), Amount::from_units(1))
            .unwrap();
        fx.engine.retry_payout(id).unwrap();
        assert_eq!(fx.ledger.balance(&fx.seller), Amount::from_units(1));
        assert!(fx.engine.pending_payout(id).is_none());
        assert!(matches!(
            fx.engine.retry_payout(id),
            Err(EscrowError::NoPendingPayout(_))
        ));
    }

    #[test]
    fn user_transactions_index_tracks_both_parties() {
        let fx = fixture();
        let a = funded_transaction(&fx);
        let b = funded_transaction(&fx);
        assert_eq!(fx.engine.user_transactions(&fx.buyer), vec![a, b]);
        assert_eq!(fx.engine.user_transactions(&fx.seller), vec![a, b]);
        assert_eq!(fx.engine.transaction_count(), 2);

        let profile = fx.engine.user_profile(&fx.buyer);
        assert_eq!(profile.total_transactions_as_buyer, 2);
        assert_eq!(profile.total_transactions_as_seller, 0);
    }
}
