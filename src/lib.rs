//! # MinePoints
//!
//! Points and rewards ledger for a gamified mining app, with idempotent
//! reconciliation of payment and partner webhooks.
//!
//! ## Architecture
//!
//! Every balance change is an award applied inside one store transaction
//! together with the record that justifies it:
//! - **Claim gate**: a 4-hour mining cycle paying base points × booster multiplier
//! - **Tasks**: one-time and daily tasks, plus a one-shot all-tasks bonus
//! - **Referrals**: one edge per referred user, both sides paid atomically
//! - **Webhooks**: booster, presale, wallet and partner-task events,
//!   deduplicated on their natural keys
//! - **Conversion**: a scheduled batch exchanging points for tokens
//!
//! ## Trust boundaries
//!
//! - User actions carry an HMAC-signed bearer session token
//! - Webhooks carry an HMAC-SHA256 signature over the raw body
//! - Eligibility and amounts are always recomputed from stored records

#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms
)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod scheduler;
pub mod state;
pub mod types;

pub use ledger::{Ledger, LedgerConfig, LedgerError, Outcome, Rejection};
pub use state::{StateError, Store};
pub use types::{Lamports, Profile, TokenAmount, UserId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
