//! # pax-core — Ledger Primitives
//!
//! Foundational types for the Pax escrow marketplace. Everything that
//! custodies or moves funds builds on this crate:
//!
//! - **Amount** ([`amount`]): base-unit monetary values with checked
//!   arithmetic and basis-point math. Never floating point.
//!
//! - **Accounts** ([`account`]): the [`AccountId`] identity newtype.
//!
//! - **Ledger** ([`ledger`]): the single balance book. Atomic two-party
//!   transfers with no partial effect, plus monotonic id allocation for
//!   the append-only arenas above this crate.
//!
//! - **Clock** ([`clock`]): the time seam. Deadline-driven transitions
//!   take their notion of "now" from a [`Clock`] so tests can drive
//!   timeouts deterministically.

pub mod account;
pub mod amount;
pub mod clock;
pub mod error;
pub mod ledger;

// Re-export primary types for ergonomic imports.

pub use account::AccountId;
pub use amount::Amount;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LedgerError;
pub use ledger::{IdAllocator, Ledger};
