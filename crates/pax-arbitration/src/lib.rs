//! # pax-arbitration
//!
//! Staked quorum arbitration over escrow disputes: an arbitrator
//! registry with locked stakes, uniform random quorum selection, an
//! evidence and voting window per dispute, and finalization that pays
//! the winner, rewards majority voters, and slashes non-voters.
//!
//! The [`ArbitrationEngine`] links itself to a
//! [`pax_escrow::EscrowEngine`] at construction and receives dispute
//! snapshots through the [`pax_escrow::ArbitrationHandoff`] seam.
//!
//! ## Modules
//!
//! - [`arbitrator`]: registered arbitrator records
//! - [`registry`]: registration, stake custody, the active pool
//! - [`selection`]: randomness seam and quorum draw
//! - [`dispute`]: dispute record, status graph, votes
//! - [`config`]: stake minimum, quorum size, windows, rates
//! - [`engine`]: the adjudication engine
//! - [`event`]: post-commit lifecycle events
//! - [`error`]: structured failure taxonomy

pub mod arbitrator;
pub mod config;
pub mod dispute;
pub mod engine;
pub mod error;
pub mod event;
pub mod registry;
pub mod selection;

pub use arbitrator::Arbitrator;
pub use config::ArbitrationConfig;
pub use dispute::{Dispute, DisputeId, DisputeStatus, Vote};
pub use engine::ArbitrationEngine;
pub use error::ArbitrationError;
pub use event::{ArbitrationEvent, ArbitrationEventSink, NullSink, TracingSink};
pub use registry::ArbitratorRegistry;
pub use selection::{OsRandomness, RandomnessProvider, SeededRandomness};
