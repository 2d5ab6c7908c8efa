//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod entry;
pub mod balance;
pub mod result;

pub use balance::BalanceRecord;
pub use entry::{EntryKind, EntryMatch, LedgerEntry};
