//! # pax-escrow
//!
//! The escrow state machine: buyer-funded transactions held in custody
//! until receipt is confirmed, with cancellation, timeout claims,
//! dispute handoff, and post-settlement peer ratings.
//!
//! The [`EscrowEngine`] owns the transaction arena and the two custody
//! accounts (vault and treasury) on a shared [`pax_core::Ledger`].
//! Dispute adjudication lives in a sibling crate and is linked at
//! runtime through the [`ArbitrationHandoff`] trait, mirroring how the
//! two halves are deployed and wired together in production.
//!
//! ## Modules
//!
//! - [`transaction`]: transaction record, id, status graph, categories
//! - [`config`]: fee, minimum amount, timeout windows
//! - [`engine`]: the state machine over the arena
//! - [`rating`]: peer ratings and aggregate profiles
//! - [`event`]: post-commit lifecycle events
//! - [`error`]: structured failure taxonomy

pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod rating;
pub mod transaction;

pub use config::EscrowConfig;
pub use engine::{ArbitrationHandoff, DisputeSnapshot, EscrowEngine};
pub use error::{EscrowError, HandoffError};
pub use event::{EscrowEvent, EscrowEventSink, NullSink, TracingSink};
pub use rating::{Rating, UserProfile, MAX_RATING, MIN_RATING};
pub use transaction::{Category, EscrowTransaction, TransactionId, TransactionStatus};
