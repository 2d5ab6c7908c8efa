//! History service - bounded two-stack undo/redo over ledger snapshots
//!
//! Classic linear history with branch invalidation. Callers save a snapshot
//! before each mutation; undo and redo swap the live state with the top of
//! the matching stack. Every public operation runs under one lock scoped to
//! this instance, so concurrent callers serialize instead of interleaving.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::adapters::duckdb::DuckDbLedgerStore;
use crate::domain::result::{Error, Result};
use crate::services::snapshot::LedgerSnapshot;

/// Default undo depth when the config does not override it
pub const DEFAULT_MAX_HISTORY: usize = 20;

struct Stacks {
    /// Bounded LIFO; front is oldest (first evicted), back is newest
    undo: VecDeque<Arc<LedgerSnapshot>>,
    redo: Vec<Arc<LedgerSnapshot>>,
}

/// Undo/redo controller for one ledger store
pub struct HistoryService {
    store: Arc<DuckDbLedgerStore>,
    max_history: usize,
    stacks: Mutex<Stacks>,
}

impl HistoryService {
    pub fn new(store: Arc<DuckDbLedgerStore>, max_history: usize) -> Self {
        Self {
            store,
            max_history: max_history.max(1),
            stacks: Mutex::new(Stacks {
                undo: VecDeque::new(),
                redo: Vec::new(),
            }),
        }
    }

    /// Capture the current state onto the undo stack
    ///
    /// Must be called before the mutation it protects. A new action
    /// invalidates any forward history, so the redo stack is cleared
    /// unconditionally; the oldest snapshot is evicted once the undo stack
    /// exceeds capacity.
    pub fn save_state(&self) -> Result<()> {
        let mut stacks = self.lock_stacks()?;

        let snapshot = LedgerSnapshot::capture(&self.store)?;
        tracing::debug!(entries = snapshot.entry_count(), "state saved to history");
        stacks.undo.push_back(Arc::new(snapshot));

        while stacks.undo.len() > self.max_history {
            stacks.undo.pop_front();
            tracing::debug!("evicted oldest history state");
        }

        if !stacks.redo.is_empty() {
            tracing::debug!(cleared = stacks.redo.len(), "redo history invalidated");
            stacks.redo.clear();
        }
        Ok(())
    }

    /// Restore the most recently saved state
    ///
    /// Returns Ok(false) when there is nothing to undo. The ordering is
    /// load-bearing: the live state must be captured for redo BEFORE the
    /// target is restored, or the redo stack would silently receive the
    /// already-restored state.
    pub fn undo(&self) -> Result<bool> {
        let mut stacks = self.lock_stacks()?;

        let Some(target) = stacks.undo.pop_back() else {
            tracing::debug!("undo requested with empty history");
            return Ok(false);
        };

        // Capture current live state before restoration, for redo.
        let current = match LedgerSnapshot::capture(&self.store) {
            Ok(c) => c,
            Err(e) => {
                stacks.undo.push_back(target);
                return Err(e);
            }
        };

        if let Err(e) = target.restore(&self.store) {
            // The failed replace rolled back, so the live state still
            // matches this snapshot's stack position. Requeue it rather
            // than silently shortening history.
            stacks.undo.push_back(target);
            return Err(e);
        }

        stacks.redo.push(Arc::new(current));
        tracing::debug!(
            undo_depth = stacks.undo.len(),
            redo_depth = stacks.redo.len(),
            "undo completed"
        );
        Ok(true)
    }

    /// Re-apply the most recently undone state
    ///
    /// Symmetric to `undo`: pop the target, capture the live state for the
    /// undo stack, restore, then push the capture.
    pub fn redo(&self) -> Result<bool> {
        let mut stacks = self.lock_stacks()?;

        let Some(target) = stacks.redo.pop() else {
            tracing::debug!("redo requested with empty redo history");
            return Ok(false);
        };

        let current = match LedgerSnapshot::capture(&self.store) {
            Ok(c) => c,
            Err(e) => {
                stacks.redo.push(target);
                return Err(e);
            }
        };

        if let Err(e) = target.restore(&self.store) {
            stacks.redo.push(target);
            return Err(e);
        }

        stacks.undo.push_back(Arc::new(current));
        tracing::debug!(
            undo_depth = stacks.undo.len(),
            redo_depth = stacks.redo.len(),
            "redo completed"
        );
        Ok(true)
    }

    /// Drop all saved history
    pub fn clear(&self) -> Result<()> {
        let mut stacks = self.lock_stacks()?;
        stacks.undo.clear();
        stacks.redo.clear();
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.stacks.lock().map(|s| !s.undo.is_empty()).unwrap_or(false)
    }

    pub fn can_redo(&self) -> bool {
        self.stacks.lock().map(|s| !s.redo.is_empty()).unwrap_or(false)
    }

    pub fn undo_count(&self) -> usize {
        self.stacks.lock().map(|s| s.undo.len()).unwrap_or(0)
    }

    pub fn redo_count(&self) -> usize {
        self.stacks.lock().map(|s| s.redo.len()).unwrap_or(0)
    }

    pub fn is_history_full(&self) -> bool {
        self.undo_count() >= self.max_history
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn lock_stacks(&self) -> Result<std::sync::MutexGuard<'_, Stacks>> {
        self.stacks
            .lock()
            .map_err(|_| Error::database("history lock poisoned by a panicked operation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryKind, LedgerEntry};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_store(temp_dir: &TempDir) -> Arc<DuckDbLedgerStore> {
        let store = DuckDbLedgerStore::new(&temp_dir.path().join("history.duckdb")).unwrap();
        store.ensure_schema().unwrap();
        Arc::new(store)
    }

    fn entry(cents: i64) -> LedgerEntry {
        LedgerEntry::new(
            EntryKind::Income,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            "Paycheck",
            Decimal::new(cents, 2),
        )
    }

    #[test]
    fn test_undo_on_empty_history_is_a_noop() {
        let temp_dir = TempDir::new().unwrap();
        let history = HistoryService::new(test_store(&temp_dir), DEFAULT_MAX_HISTORY);

        assert!(!history.can_undo());
        assert_eq!(history.undo().unwrap(), false);
        assert_eq!(history.redo().unwrap(), false);
    }

    #[test]
    fn test_save_state_clears_redo() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let history = HistoryService::new(Arc::clone(&store), DEFAULT_MAX_HISTORY);

        history.save_state().unwrap();
        store.create_entry(&entry(1000)).unwrap();
        assert!(history.undo().unwrap());
        assert_eq!(history.redo_count(), 1);

        history.save_state().unwrap();
        assert_eq!(history.redo_count(), 0, "new action must invalidate redo");
        assert_eq!(history.redo().unwrap(), false);
    }

    #[test]
    fn test_bounded_history_evicts_oldest() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let history = HistoryService::new(Arc::clone(&store), 3);

        for i in 0..4 {
            history.save_state().unwrap();
            store.create_entry(&entry(1000 + i)).unwrap();
        }

        assert_eq!(history.undo_count(), 3);
        assert!(history.is_history_full());

        // The retained snapshots are the three newest: 1, 2 and 3 entries.
        for expected_entries in (1..=3).rev() {
            assert!(history.undo().unwrap());
            assert_eq!(store.entry_count().unwrap(), expected_entries);
        }
        assert_eq!(history.undo().unwrap(), false, "oldest state was evicted");
    }

    #[test]
    fn test_failed_restore_requeues_popped_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let history = HistoryService::new(Arc::clone(&store), DEFAULT_MAX_HISTORY);

        store.create_entry(&entry(5000)).unwrap();

        // A snapshot the storage layer will reject: the amount CHECK
        // constraint fails mid-replace and the transaction rolls back.
        let poisoned = LedgerSnapshot::new(
            vec![LedgerEntry {
                amount: Decimal::new(-100, 2),
                ..entry(0)
            }],
            Decimal::ZERO,
        );
        history.stacks.lock().unwrap().undo.push_back(Arc::new(poisoned));

        let before = (store.entries().unwrap(), store.balance_record().unwrap());
        assert!(history.undo().is_err());

        // Policy: the popped snapshot goes back on the undo stack, the redo
        // stack stays empty, durable state is untouched.
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.redo_count(), 0);
        let after = (store.entries().unwrap(), store.balance_record().unwrap());
        assert_eq!(before, after);
    }

    #[test]
    fn test_clear_drops_both_stacks() {
        let temp_dir = TempDir::new().unwrap();
        let store = test_store(&temp_dir);
        let history = HistoryService::new(Arc::clone(&store), DEFAULT_MAX_HISTORY);

        history.save_state().unwrap();
        store.create_entry(&entry(1000)).unwrap();
        history.save_state().unwrap();
        history.undo().unwrap();

        history.clear().unwrap();
        assert_eq!(history.undo_count(), 0);
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn test_capacity_floor_is_one() {
        let temp_dir = TempDir::new().unwrap();
        let history = HistoryService::new(test_store(&temp_dir), 0);
        assert_eq!(history.max_history(), 1);
    }
}
