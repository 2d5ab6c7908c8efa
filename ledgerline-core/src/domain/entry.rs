//! Ledger entry domain model

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};

/// Whether an entry adds to or subtracts from the balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    /// Storage representation, also used in SQL literals
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Income => "income",
            EntryKind::Expense => "expense",
        }
    }

    /// Parse the storage representation back into the enum
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(EntryKind::Income),
            "expense" => Some(EntryKind::Expense),
            _ => None,
        }
    }
}

/// A single income or expense record
///
/// Entries are plain values: two entries with the same fields are the same
/// entry. There is no id, so copies are cheap and comparison is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub kind: EntryKind,
    pub date: NaiveDate,
    pub category: String,
    /// Always non-negative; the sign is carried by `kind`
    pub amount: Decimal,
    pub note: Option<String>,
}

impl LedgerEntry {
    /// Create a new entry with required fields
    pub fn new(kind: EntryKind, date: NaiveDate, category: impl Into<String>, amount: Decimal) -> Self {
        Self {
            kind,
            date,
            category: category.into(),
            amount,
            note: None,
        }
    }

    /// Attach a free-form note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Check the entry is storable: non-negative amount, non-empty category
    pub fn validate(&self) -> Result<()> {
        if self.amount < Decimal::ZERO {
            return Err(Error::validation(format!(
                "entry amount must be non-negative, got {}",
                self.amount
            )));
        }
        if self.category.trim().is_empty() {
            return Err(Error::validation("entry category must not be empty"));
        }
        Ok(())
    }

    /// Signed contribution of this entry to the current balance
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Income => self.amount,
            EntryKind::Expense => -self.amount,
        }
    }
}

/// Identifies a stored entry by value, the way a user points at a row
///
/// Entries have no ids, so mutations address the first row (in insertion
/// order) whose date, category and amount all match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMatch {
    pub date: NaiveDate,
    pub category: String,
    pub amount: Decimal,
}

impl EntryMatch {
    pub fn new(date: NaiveDate, category: impl Into<String>, amount: Decimal) -> Self {
        Self {
            date,
            category: category.into(),
            amount,
        }
    }

    /// Match key of an existing entry
    pub fn for_entry(entry: &LedgerEntry) -> Self {
        Self {
            date: entry.date,
            category: entry.category.clone(),
            amount: entry.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_entries_compare_by_value() {
        let a = LedgerEntry::new(EntryKind::Income, date(2024, 1, 1), "Paycheck", Decimal::new(50000, 2));
        let b = a.clone();
        assert_eq!(a, b);

        let c = LedgerEntry::new(EntryKind::Expense, date(2024, 1, 1), "Paycheck", Decimal::new(50000, 2));
        assert_ne!(a, c);
    }

    #[test]
    fn test_validate_rejects_negative_amount() {
        let entry = LedgerEntry::new(EntryKind::Expense, date(2024, 1, 2), "Food", Decimal::new(-100, 2));
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_category() {
        let entry = LedgerEntry::new(EntryKind::Income, date(2024, 1, 2), "   ", Decimal::new(100, 2));
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_zero_amount() {
        let entry = LedgerEntry::new(EntryKind::Income, date(2024, 1, 2), "Other", Decimal::ZERO);
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn test_signed_amount() {
        let income = LedgerEntry::new(EntryKind::Income, date(2024, 1, 1), "Gift", Decimal::new(2500, 2));
        let expense = LedgerEntry::new(EntryKind::Expense, date(2024, 1, 1), "Food", Decimal::new(2500, 2));
        assert_eq!(income.signed_amount(), Decimal::new(2500, 2));
        assert_eq!(expense.signed_amount(), Decimal::new(-2500, 2));
    }

    #[test]
    fn test_kind_round_trips_through_storage_form() {
        assert_eq!(EntryKind::parse(EntryKind::Income.as_str()), Some(EntryKind::Income));
        assert_eq!(EntryKind::parse(EntryKind::Expense.as_str()), Some(EntryKind::Expense));
        assert_eq!(EntryKind::parse("transfer"), None);
    }

    #[test]
    fn test_match_key_from_entry() {
        let entry = LedgerEntry::new(EntryKind::Expense, date(2024, 3, 9), "Groceries", Decimal::new(4250, 2))
            .with_note("weekly run");
        let key = EntryMatch::for_entry(&entry);
        assert_eq!(key.date, entry.date);
        assert_eq!(key.category, entry.category);
        assert_eq!(key.amount, entry.amount);
    }
}
