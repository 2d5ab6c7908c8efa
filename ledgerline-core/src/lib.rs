//! Ledgerline Core - transactional ledger state with undo/redo
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (LedgerEntry, BalanceRecord, etc.)
//! - **services**: Business logic orchestration (snapshots, history, events)
//! - **adapters**: Concrete implementations (DuckDB store)
//!
//! The invariant the whole crate is built around: after every successful
//! operation, the persisted current balance equals the starting balance plus
//! income minus expenses, and no partially applied mutation is ever durable.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbLedgerStore;
use config::Config;
use services::HistoryService;

// Re-export commonly used types at crate root
pub use adapters::duckdb::DuckDbLedgerStore as LedgerStore;
pub use domain::result::Error;
pub use domain::{BalanceRecord, EntryKind, EntryMatch, LedgerEntry};
pub use services::{EventBus, LedgerEvent, LedgerSnapshot};

/// Main context for Ledgerline operations
///
/// This is the primary entry point: it owns the store handle and the
/// history controller for one ledger. Independent ledgers are independent
/// contexts; nothing here is process-global.
pub struct LedgerlineContext {
    pub config: Config,
    pub store: Arc<DuckDbLedgerStore>,
    pub history: HistoryService,
}

impl LedgerlineContext {
    /// Create a new Ledgerline context rooted at the given directory
    pub fn new(ledger_dir: &Path) -> Result<Self> {
        let config = Config::load(ledger_dir)?;

        let db_path = ledger_dir.join("ledgerline.duckdb");
        let store = Arc::new(DuckDbLedgerStore::new(&db_path)?);

        // Initialize schema
        store.ensure_schema()?;

        let history = HistoryService::new(Arc::clone(&store), config.max_history);

        Ok(Self {
            config,
            store,
            history,
        })
    }
}
