//! Back-office daily ledger core for multi-site betting operations.
//!
//! The pieces, from the bottom up:
//!
//! - [`codec`] turns the compact annotation shorthand into structured
//!   adjustments and back, and extracts the charge/withdraw totals the
//!   cascade consumes
//! - [`ledger`] derives each row's carried amount, total charge and
//!   margin from the previous row, strictly left-to-right
//! - [`attendance`] keeps the per-(site, identity) attendance log and
//!   derives consecutive-day streaks under the month-boundary and
//!   rollover policies
//! - [`sync`] reconciles the optimistic local store with the
//!   authoritative remote: in-flight de-duplication, revision-stale
//!   discarding and bounded-retry attendance polling
//! - [`commands`] is the edit surface the application shell calls;
//!   everything above it stays UI-free

pub mod api;
pub mod attendance;
pub mod cache;
pub mod codec;
pub mod commands;
pub mod db;
pub mod error;
pub mod ledger;
pub mod models;
pub mod sync;
pub mod time;

pub use commands::LedgerContext;
pub use error::LedgerError;
