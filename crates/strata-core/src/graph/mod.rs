//! Entry graph of a sort.
//!
//! ## Pipeline
//!
//! ```text
//! seed items + discoverers
//!        ↓  register::Registerer::register()
//! Registration (EntryGraph + issues)
//!        ↓  rank::RankComputer::process()
//! ranks per entry, or the first cycle
//! ```
//!
//! Ordering the ranked entries is the sorter's job.

pub mod entry;
pub mod rank;
pub mod register;
