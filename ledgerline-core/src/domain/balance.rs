//! Balance domain model
//!
//! The current balance is never stored authoritatively on its own: it is
//! always derived as starting balance plus income minus expenses. The
//! persisted copy exists for quick reads and must be recomputed inside the
//! same transaction as any write that could change it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::LedgerEntry;

/// The persisted balance pair for one ledger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// User-declared opening balance, independent of entry history
    pub starting_balance: Decimal,
    /// Derived: starting balance + income - expenses
    pub current_balance: Decimal,
}

impl BalanceRecord {
    pub fn new(starting_balance: Decimal, current_balance: Decimal) -> Self {
        Self {
            starting_balance,
            current_balance,
        }
    }

    /// True when the persisted pair satisfies the balance equation for
    /// the given entries
    pub fn is_consistent_with(&self, entries: &[LedgerEntry]) -> bool {
        self.current_balance == derive_current(self.starting_balance, entries)
    }
}

/// The balance equation, in one place
pub fn derive_current(starting_balance: Decimal, entries: &[LedgerEntry]) -> Decimal {
    starting_balance + entries.iter().map(LedgerEntry::signed_amount).sum::<Decimal>()
}
