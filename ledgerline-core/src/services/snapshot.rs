//! Ledger snapshots - point-in-time copies of full ledger state
//!
//! A snapshot owns a deep copy of the entries and the starting balance at
//! one instant. Fields are private and there are no mutators, so a snapshot
//! can sit on both history stacks behind the same Arc without any defensive
//! re-copying.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::adapters::duckdb::DuckDbLedgerStore;
use crate::domain::result::Result;
use crate::domain::LedgerEntry;

/// Immutable capture of `{entries, starting balance}` at one instant
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    entries: Vec<LedgerEntry>,
    starting_balance: Decimal,
    captured_at: DateTime<Utc>,
}

impl LedgerSnapshot {
    /// Build a snapshot from already-copied state
    ///
    /// Entries are plain values, so taking ownership of the Vec is the whole
    /// deep copy.
    pub fn new(entries: Vec<LedgerEntry>, starting_balance: Decimal) -> Self {
        Self {
            entries,
            starting_balance,
            captured_at: Utc::now(),
        }
    }

    /// Capture the store's current entries and starting balance
    pub fn capture(store: &DuckDbLedgerStore) -> Result<Self> {
        let entries = store.entries()?;
        let starting_balance = store.balance_record()?.starting_balance;
        Ok(Self::new(entries, starting_balance))
    }

    /// Write this snapshot's state back into the store
    ///
    /// Always replaces the full state through one atomic transaction; there
    /// is no partial restore. Returns the recomputed current balance.
    pub fn restore(&self, store: &DuckDbLedgerStore) -> Result<Decimal> {
        store.atomic_replace(&self.entries, self.starting_balance)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn starting_balance(&self) -> Decimal {
        self.starting_balance
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }
}
