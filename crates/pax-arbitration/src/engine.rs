//! # Arbitration Engine
//!
//! Drives disputes from opening through voting to finalization, and
//! owns every fund movement a verdict entails: the winner payout, the
//! voter reward split, and non-voter slashing. The escrow engine only
//! ever commits the `DisputeResolved` status; money moves here.
//!
//! ## Linking
//!
//! [`ArbitrationEngine::new`] returns the engine behind an `Arc` and
//! registers a weak handle with the escrow engine, which calls back
//! through [`ArbitrationHandoff`] when a party opens a dispute. The
//! arbitration engine holds the strong reference to the escrow engine,
//! never the reverse.
//!
//! ## Locking
//!
//! [`ArbitrationHandoff::open_dispute`] runs while the escrow engine
//! holds the contested transaction's entry, so it must not touch the
//! escrow arena. Finalization goes the other way: the verdict is
//! committed and the dispute entry released *before* the escrow commit
//! and the payouts run, so the two arenas are never locked in opposite
//! orders and a second finalize call observes a terminal status instead
//! of paying twice.

use std::sync::Arc;

use dashmap::DashMap;

use pax_core::{AccountId, Amount, Clock, IdAllocator, Ledger};
use pax_escrow::{
    ArbitrationHandoff, DisputeSnapshot, EscrowEngine, HandoffError, TransactionId,
};

use crate::arbitrator::Arbitrator;
use crate::config::ArbitrationConfig;
use crate::dispute::{Dispute, DisputeId, DisputeStatus, Vote};
use crate::error::ArbitrationError;
use crate::event::{ArbitrationEvent, ArbitrationEventSink};
use crate::registry::ArbitratorRegistry;
use crate::selection::{select_quorum, RandomnessProvider};

/// The dispute adjudication engine.
pub struct ArbitrationEngine {
    config: ArbitrationConfig,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomnessProvider>,
    sink: Arc<dyn ArbitrationEventSink>,
    escrow: Arc<EscrowEngine>,
    registry: ArbitratorRegistry,
    ids: IdAllocator,
    disputes: DashMap<DisputeId, Dispute>,
    tx_to_dispute: DashMap<TransactionId, DisputeId>,
    /// Undecided disputes per arbitrator. Gates deactivation.
    undecided: DashMap<AccountId, Vec<DisputeId>>,
    /// Verdict payouts that failed after the verdict committed.
    pending_payouts: DashMap<DisputeId, Vec<(AccountId, Amount)>>,
}

impl ArbitrationEngine {
    /// Build the engine and link it to the escrow engine.
    pub fn new(
        config: ArbitrationConfig,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomnessProvider>,
        sink: Arc<dyn ArbitrationEventSink>,
        escrow: Arc<EscrowEngine>,
    ) -> Arc<Self> {
        let registry = ArbitratorRegistry::new(Arc::clone(&ledger));
        let engine = Arc::new(Self {
            config,
            ledger,
            clock,
            rng,
            sink,
            escrow: Arc::clone(&escrow),
            registry,
            ids: IdAllocator::new(),
            disputes: DashMap::new(),
            tx_to_dispute: DashMap::new(),
            undecided: DashMap::new(),
            pending_payouts: DashMap::new(),
        });
        let handoff: std::sync::Weak<dyn ArbitrationHandoff> =
            Arc::downgrade(&(Arc::clone(&engine) as Arc<dyn ArbitrationHandoff>));
        escrow.set_arbitration(handoff);
        engine
    }

    /// The engine configuration.
    pub fn config(&self) -> &ArbitrationConfig {
        &self.config
    }

    /// The arbitrator registry.
    pub fn registry(&self) -> &ArbitratorRegistry {
        &self.registry
    }

    // ── Arbitrator lifecycle ───────────────────────────────────────

    /// Register the caller as an arbitrator, locking `stake`.
    pub fn register_arbitrator(
        &self,
        account: AccountId,
        stake: Amount,
    ) -> Result<(), ArbitrationError> {
        let now = self.clock.now();
        self.registry.register(account, stake, &self.config, now)?;
        self.sink
            .emit(&ArbitrationEvent::ArbitratorRegistered { account, stake });
        Ok(())
    }

    /// Lock additional stake for a registered arbitrator.
    pub fn increase_stake(
        &self,
        account: AccountId,
        additional: Amount,
    ) -> Result<(), ArbitrationError> {
        let now = self.clock.now();
        let total_stake = self.registry.increase_stake(account, additional)?;
        self.registry.update(&account, |record| record.last_active_at = now);
        self.sink.emit(&ArbitrationEvent::StakeIncreased {
            account,
            total_stake,
        });
        Ok(())
    }

    /// Deactivate an arbitrator and return their remaining stake.
    /// Blocked while the arbitrator sits on any undecided dispute.
    pub fn deactivate_arbitrator(&self, account: AccountId) -> Result<(), ArbitrationError> {
        let open_disputes = self
            .undecided
            .get(&account)
            .map(|entry| entry.len())
            .unwrap_or(0);
        if open_disputes > 0 {
            return Err(ArbitrationError::PendingDisputeBlocksDeactivation {
                account,
                open_disputes,
            });
        }
        let stake_returned = self.registry.deactivate(account)?;
        self.sink.emit(&ArbitrationEvent::ArbitratorDeactivated {
            account,
            stake_returned,
        });
        Ok(())
    }

    // ── Dispute lifecycle ──────────────────────────────────────────

    /// Append an evidence statement for one party. Accepted until the
    /// dispute is finalized, even past the voting deadline.
    pub fn submit_evidence(
        &self,
        caller: AccountId,
        id: DisputeId,
        statement: impl Into<String>,
    ) -> Result<(), ArbitrationError> {
        let mut entry = self.disputes.get_mut(&id).ok_or(ArbitrationError::NotFound(id))?;
        let dispute = entry.value_mut();

        if dispute.status != DisputeStatus::Voting {
            return Err(ArbitrationError::InvalidState {
                id,
                actual: dispute.status,
                action: "submit evidence",
            });
        }
        let statements = if caller == dispute.buyer {
            &mut dispute.buyer_evidence
        } else if caller == dispute.seller {
            &mut dispute.seller_evidence
        } else {
            return Err(ArbitrationError::Unauthorized {
                account: caller,
                reason: "is not a party to this dispute",
            });
        };
        statements.push(statement.into());
        drop(entry);

        self.sink
            .emit(&ArbitrationEvent::EvidenceSubmitted { id, party: caller });
        Ok(())
    }

    /// Cast an assigned arbitrator's one vote.
    pub fn cast_vote(
        &self,
        caller: AccountId,
        id: DisputeId,
        vote: Vote,
    ) -> Result<(), ArbitrationError> {
        let now = self.clock.now();
        let mut entry = self.disputes.get_mut(&id).ok_or(ArbitrationError::NotFound(id))?;
        let dispute = entry.value_mut();

        if dispute.status != DisputeStatus::Voting {
            return Err(ArbitrationError::InvalidState {
                id,
                actual: dispute.status,
                action: "vote",
            });
        }
        if now > dispute.voting_deadline {
            return Err(ArbitrationError::VotingClosed {
                dispute: id,
                deadline: dispute.voting_deadline,
            });
        }
        if !dispute.is_assigned(&caller) {
            return Err(ArbitrationError::NotAssignedArbitrator {
                dispute: id,
                account: caller,
            });
        }
        if dispute.votes.contains_key(&caller) {
            return Err(ArbitrationError::AlreadyVoted {
                dispute: id,
                account: caller,
            });
        }
        dispute.votes.insert(caller, vote);
        match vote {
            Vote::Buyer => dispute.buyer_votes += 1,
            Vote::Seller => dispute.seller_votes += 1,
        }
        drop(entry);

        self.registry.update(&caller, |record| {
            record.votes_cast += 1;
            record.last_active_at = now;
        });
        self.sink.emit(&ArbitrationEvent::VoteCast {
            id,
            arbitrator: caller,
            vote,
        });
        Ok(())
    }

    /// Close a dispute whose voting window has passed.
    ///
    /// A strict majority resolves the dispute: the verdict is committed
    /// on the underlying transaction, the winner is paid the principal
    /// minus the reward pool, the pool is split among majority voters
    /// (remainder to the treasury), non-voters are slashed, and
    /// reputations adjust. A tie or zero votes expires the dispute with
    /// no fund movement of any kind; the transaction stays in dispute.
    ///
    /// Anyone may call this once the deadline has passed.
    pub fn finalize(&self, id: DisputeId) -> Result<DisputeStatus, ArbitrationError> {
        let now = self.clock.now();

        // Phase 1: commit the outcome under the dispute entry, then
        // release it. Fund movement never runs under this guard.
        let decided = {
            let mut entry = self.disputes.get_mut(&id).ok_or(ArbitrationError::NotFound(id))?;
            let dispute = entry.value_mut();

            if dispute.status != DisputeStatus::Voting {
                return Err(ArbitrationError::InvalidState {
                    id,
                    actual: dispute.status,
                    action: "finalize",
                });
            }
            if now <= dispute.voting_deadline {
                return Err(ArbitrationError::VotingStillOpen {
                    dispute: id,
                    deadline: dispute.voting_deadline,
                });
            }
            if let Some(majority) = dispute.majority() {
                dispute.status = DisputeStatus::Resolved;
                dispute.winner = Some(dispute.party_for(majority));
            } else {
                dispute.status = DisputeStatus::Expired;
            }
            dispute.clone()
        };

        for arbitrator in &decided.arbitrators {
            if let Some(mut entry) = self.undecided.get_mut(arbitrator) {
                entry.retain(|open| *open != id);
            }
        }

        match decided.status {
            DisputeStatus::Resolved => {
                self.apply_verdict(&decided)?;
                Ok(DisputeStatus::Resolved)
            }
            DisputeStatus::Expired => {
                self.sink.emit(&ArbitrationEvent::DisputeExpired { id });
                Ok(DisputeStatus::Expired)
            }
            // Phase 1 only produces the two terminal statuses.
            other => Ok(other),
        }
    }

    /// Retry this dispute's parked verdict payouts.
    pub fn retry_payouts(&self, id: DisputeId) -> Result<(), ArbitrationError> {
        let (_, parked) = self
            .pending_payouts
            .remove(&id)
            .ok_or(ArbitrationError::NotFound(id))?;
        let vault = self.escrow.vault_account();
        let mut still_parked = Vec::new();
        for (to, amount) in parked {
            if self.ledger.transfer(vault, to, amount).is_err() {
                still_parked.push((to, amount));
            }
        }
        if !still_parked.is_empty() {
            let remaining = still_parked.len();
            self.pending_payouts.insert(id, still_parked);
            tracing::warn!(%id, remaining, "verdict payouts still parked after retry");
        }
        Ok(())
    }

    // ── Read surface ───────────────────────────────────────────────

    /// Fetch a dispute by id.
    pub fn dispute(&self, id: DisputeId) -> Option<Dispute> {
        self.disputes.get(&id).map(|entry| entry.value().clone())
    }

    /// The dispute opened for a transaction, if any.
    pub fn transaction_dispute(&self, transaction_id: TransactionId) -> Option<DisputeId> {
        self.tx_to_dispute.get(&transaction_id).map(|entry| *entry.value())
    }

    /// The quorum assigned to a dispute, in selection order.
    pub fn dispute_arbitrators(&self, id: DisputeId) -> Vec<AccountId> {
        self.dispute(id)
            .map(|dispute| dispute.arbitrators)
            .unwrap_or_default()
    }

    /// An assigned arbitrator's cast vote, if any.
    pub fn arbitrator_vote(&self, id: DisputeId, account: &AccountId) -> Option<Vote> {
        self.disputes
            .get(&id)
            .and_then(|entry| entry.votes.get(account).copied())
    }

    /// Whether the account sits on the dispute's quorum.
    pub fn is_assigned_arbitrator(&self, id: DisputeId, account: &AccountId) -> bool {
        self.disputes
            .get(&id)
            .map(|entry| entry.is_assigned(account))
            .unwrap_or(false)
    }

    /// An arbitrator's registry record.
    pub fn arbitrator(&self, account: &AccountId) -> Option<Arbitrator> {
        self.registry.arbitrator(account)
    }

    /// The arbitrator's still-undecided assignments.
    pub fn arbitrator_disputes(&self, account: &AccountId) -> Vec<DisputeId> {
        self.undecided
            .get(account)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Number of disputes ever opened.
    pub fn dispute_count(&self) -> usize {
        self.disputes.len()
    }

    /// Number of registered arbitrators, active or not.
    pub fn total_arbitrators(&self) -> usize {
        self.registry.total_arbitrators()
    }

    /// The parked verdict payouts for a dispute, if any.
    pub fn pending_payouts(&self, id: DisputeId) -> Vec<(AccountId, Amount)> {
        self.pending_payouts
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Apply a committed verdict: escrow status, payouts, rewards,
    /// slashing, reputation. Runs with no dispute entry held.
    fn apply_verdict(&self, dispute: &Dispute) -> Result<(), ArbitrationError> {
        let id = dispute.id;
        let winner = match dispute.winner {
            Some(winner) => winner,
            // Unreachable for Resolved disputes; fail loudly over paying
            // the wrong party.
            None => {
                return Err(ArbitrationError::InvalidState {
                    id,
                    actual: dispute.status,
                    action: "apply a verdict without a winner on",
                })
            }
        };
        let majority = match dispute.majority() {
            Some(majority) => majority,
            None => {
                return Err(ArbitrationError::InvalidState {
                    id,
                    actual: dispute.status,
                    action: "apply a verdict without a majority on",
                })
            }
        };

        self.escrow.resolve_dispute(dispute.transaction_id, winner)?;

        let pool = self.config.reward_pool(dispute.amount);
        let winner_paid = dispute.amount.saturating_sub(pool);
        let majority_voters: Vec<AccountId> = dispute
            .arbitrators
            .iter()
            .filter(|arbitrator| dispute.votes.get(*arbitrator) == Some(&majority))
            .copied()
            .collect();
        let (reward_per_voter, remainder) = pool.split(majority_voters.len() as u64);

        let vault = self.escrow.vault_account();
        let treasury = self.escrow.treasury_account();

        self.settle(id, vault, winner, winner_paid);
        for voter in &majority_voters {
            self.settle(id, vault, *voter, reward_per_voter);
        }
        if !remainder.is_zero() {
            self.settle(id, vault, treasury, remainder);
        }

        // Slash and demote non-voters; reward majority voters.
        for arbitrator in &dispute.arbitrators {
            if !dispute.votes.contains_key(arbitrator) {
                self.slash(id, *arbitrator, treasury);
            }
        }
        for voter in &majority_voters {
            self.registry.update(voter, |record| {
                record.correct_votes += 1;
                record.reputation =
                    (record.reputation + self.config.reputation_reward).min(self.config.reputation_max);
            });
        }

        self.sink.emit(&ArbitrationEvent::DisputeResolved {
            id,
            winner,
            winner_paid,
            reward_per_voter,
        });
        Ok(())
    }

    /// Take the configured slash from a non-voter's stake and demote
    /// their reputation. The stake record only drops once the transfer
    /// out of the stake vault has gone through.
    fn slash(&self, id: DisputeId, arbitrator: AccountId, treasury: AccountId) {
        let Some(record) = self.registry.arbitrator(&arbitrator) else {
            return;
        };
        let amount = self.config.slash(record.stake);
        if !amount.is_zero() {
            if let Err(err) =
                self.ledger
                    .transfer(self.registry.stake_vault(), treasury, amount)
            {
                tracing::error!(%id, %arbitrator, %err, "slash transfer failed; stake left intact");
                return;
            }
        }
        let penalty = self.config.reputation_penalty;
        self.registry.update(&arbitrator, |record| {
            record.stake = record.stake.saturating_sub(amount);
            record.reputation = record.reputation.saturating_sub(penalty);
        });
        self.sink.emit(&ArbitrationEvent::ArbitratorSlashed {
            id,
            arbitrator,
            amount,
        });
    }

    /// Move a committed verdict payout out of the vault. On failure the
    /// payout is parked for [`ArbitrationEngine::retry_payouts`].
    fn settle(&self, id: DisputeId, vault: AccountId, to: AccountId, amount: Amount) {
        if amount.is_zero() {
            return;
        }
        if let Err(err) = self.ledger.transfer(vault, to, amount) {
            tracing::error!(%id, %to, %amount, %err, "verdict payout failed; parked for retry");
            self.pending_payouts.entry(id).or_default().push((to, amount));
            self.sink
                .emit(&ArbitrationEvent::PayoutDeferred { id, to, amount });
        }
    }
}

impl ArbitrationHandoff for ArbitrationEngine {
    fn open_dispute(&self, snapshot: DisputeSnapshot) -> Result<u64, HandoffError> {
        // Called with the contested transaction's escrow entry held;
        // nothing here may touch the escrow arena.
        let now = self.clock.now();
        let pool = self.registry.active_pool();
        if pool.len() < self.config.quorum_size {
            return Err(HandoffError(
                ArbitrationError::NotEnoughArbitrators {
                    active: pool.len(),
                    required: self.config.quorum_size,
                }
                .to_string(),
            ));
        }
        let arbitrators = select_quorum(&pool, self.config.quorum_size, self.rng.as_ref());

        let id = DisputeId(self.ids.next());
        let mut dispute = Dispute {
            id,
            transaction_id: snapshot.transaction_id,
            buyer: snapshot.buyer,
            seller: snapshot.seller,
            amount: snapshot.amount,
            buyer_evidence: Vec::new(),
            seller_evidence: Vec::new(),
            status: DisputeStatus::Pending,
            buyer_votes: 0,
            seller_votes: 0,
            voting_deadline: now + self.config.voting_period,
            winner: None,
            arbitrators: arbitrators.clone(),
            votes: std::collections::HashMap::new(),
            opened_at: now,
        };
        // The initiator's stated reason is their opening evidence.
        if snapshot.initiator == snapshot.buyer {
            dispute.buyer_evidence.push(snapshot.reason);
        } else {
            dispute.seller_evidence.push(snapshot.reason);
        }
        dispute.status = DisputeStatus::Voting;

        self.disputes.insert(id, dispute);
        self.tx_to_dispute.insert(snapshot.transaction_id, id);
        for arbitrator in &arbitrators {
            self.undecided.entry(*arbitrator).or_default().push(id);
            self.registry
                .update(arbitrator, |record| record.disputes_assigned += 1);
        }

        self.sink.emit(&ArbitrationEvent::DisputeOpened {
            id,
            transaction_id: snapshot.transaction_id,
            arbitrators,
        });
        Ok(id.0)
    }
}

impl std::fmt::Debug for ArbitrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrationEngine")
            .field("disputes", &self.disputes.len())
            .field("arbitrators", &self.registry.total_arbitrators())
            .finish()
    }
}
