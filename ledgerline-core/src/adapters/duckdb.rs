//! DuckDB ledger store implementation

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use duckdb::{params, Connection};
use rust_decimal::Decimal;

use crate::domain::result::{Error, Result};
use crate::domain::{BalanceRecord, EntryKind, EntryMatch, LedgerEntry};
use crate::services::events::{EventBus, LedgerEvent};
use crate::services::MigrationService;

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed ledger store
///
/// Sole owner of the connection and the only type that reads or writes
/// storage. Every mutation runs in exactly one transaction scope and leaves
/// the persisted current balance consistent with the entries; on any error
/// the transaction rolls back and durable state is untouched.
pub struct DuckDbLedgerStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
    events: EventBus,
}

impl DuckDbLedgerStore {
    /// Open (or create) a ledger database at the given path
    ///
    /// Includes retry logic with exponential backoff for file locking
    /// errors, which can occur when another process briefly holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: db_path.to_path_buf(),
                        events: EventBus::new(),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Disable extension autoloading: cached extensions can break opening
        // on macOS due to code signing Team ID mismatches.
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        MigrationService::new(&conn).run_pending()?;
        Ok(())
    }

    /// Path of the backing database file
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Mutation event registry; subscribers fire after successful commits
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // === Bulk replace ===

    /// Replace the full ledger state in one transaction
    ///
    /// Deletes every entry, inserts the given entries in order, persists the
    /// starting balance, then recomputes and persists the current balance by
    /// querying the just-written rows. All of it commits or none of it does:
    /// no caller ever observes a partially replaced ledger.
    ///
    /// Returns the newly persisted current balance.
    pub fn atomic_replace(
        &self,
        entries: &[LedgerEntry],
        starting_balance: Decimal,
    ) -> Result<Decimal> {
        let current = {
            let mut conn = self.conn.lock().unwrap();
            // Dropping the transaction without commit rolls everything back.
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM ledger_entries", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO ledger_entries (kind, entry_date, category, amount, note)
                     VALUES (?, ?, ?, ?, ?)",
                )?;
                for entry in entries {
                    stmt.execute(params![
                        entry.kind.as_str(),
                        entry.date.to_string(),
                        entry.category,
                        decimal_to_sql(entry.amount),
                        entry.note,
                    ])?;
                }
            }

            tx.execute(
                "UPDATE ledger_balance
                 SET starting_balance = ?, updated_at = current_timestamp
                 WHERE balance_id = 0",
                params![decimal_to_sql(starting_balance)],
            )?;

            // The recompute must run on this same transaction connection:
            // a second connection would not see the uncommitted inserts and
            // would persist a stale balance.
            let current = recompute_balance(&tx)?;
            tx.commit()?;
            current
        };

        tracing::debug!(entry_count = entries.len(), %current, "ledger state replaced");
        self.events.publish(&LedgerEvent::EntriesReplaced {
            entry_count: entries.len(),
            current_balance: current,
        });
        Ok(current)
    }

    /// Clear the ledger: no entries, zero starting balance
    pub fn reset(&self) -> Result<()> {
        self.atomic_replace(&[], Decimal::ZERO)?;
        Ok(())
    }

    // === Balance operations ===

    /// Derive the current balance from independent reads
    ///
    /// Fine as a standalone query; never used inside a mutation, where the
    /// recompute has to share the writing transaction instead.
    pub fn current_balance(&self) -> Result<Decimal> {
        let conn = self.conn.lock().unwrap();
        let starting = query_decimal(
            &conn,
            "SELECT starting_balance::VARCHAR FROM ledger_balance WHERE balance_id = 0",
        )?;
        let income = query_decimal(
            &conn,
            "SELECT COALESCE(SUM(amount), 0)::VARCHAR FROM ledger_entries WHERE kind = 'income'",
        )?;
        let expense = query_decimal(
            &conn,
            "SELECT COALESCE(SUM(amount), 0)::VARCHAR FROM ledger_entries WHERE kind = 'expense'",
        )?;
        Ok(starting + income - expense)
    }

    /// Read the persisted balance pair
    pub fn balance_record(&self) -> Result<BalanceRecord> {
        let conn = self.conn.lock().unwrap();
        let (starting, current): (String, String) = conn.query_row(
            "SELECT starting_balance::VARCHAR, current_balance::VARCHAR
             FROM ledger_balance WHERE balance_id = 0",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(BalanceRecord::new(read_decimal(&starting)?, read_decimal(&current)?))
    }

    /// Set the starting balance and recompute the current balance, atomically
    pub fn set_starting_balance(&self, value: Decimal) -> Result<Decimal> {
        let current = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE ledger_balance
                 SET starting_balance = ?, updated_at = current_timestamp
                 WHERE balance_id = 0",
                params![decimal_to_sql(value)],
            )?;
            let current = recompute_balance(&tx)?;
            tx.commit()?;
            current
        };

        tracing::debug!(starting = %value, %current, "starting balance changed");
        self.events
            .publish(&LedgerEvent::StartingBalanceChanged { current_balance: current });
        Ok(current)
    }

    // === Entry operations ===

    /// Insert one entry and recompute the balance in the same transaction
    pub fn create_entry(&self, entry: &LedgerEntry) -> Result<Decimal> {
        entry.validate()?;

        let current = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO ledger_entries (kind, entry_date, category, amount, note)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    entry.kind.as_str(),
                    entry.date.to_string(),
                    entry.category,
                    decimal_to_sql(entry.amount),
                    entry.note,
                ],
            )?;
            let current = recompute_balance(&tx)?;
            tx.commit()?;
            current
        };

        self.events
            .publish(&LedgerEvent::EntryCreated { current_balance: current });
        Ok(current)
    }

    /// Rewrite the first entry matching the key, in insertion order
    ///
    /// Returns Ok(false) when no row matched; nothing is written in that case.
    pub fn update_entry(&self, key: &EntryMatch, entry: &LedgerEntry) -> Result<bool> {
        entry.validate()?;

        let outcome = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE ledger_entries
                 SET kind = ?, entry_date = ?, category = ?, amount = ?, note = ?
                 WHERE entry_id = (
                     SELECT entry_id FROM ledger_entries
                     WHERE entry_date = ? AND category = ? AND amount = ?
                     ORDER BY entry_id LIMIT 1
                 )",
                params![
                    entry.kind.as_str(),
                    entry.date.to_string(),
                    entry.category,
                    decimal_to_sql(entry.amount),
                    entry.note,
                    key.date.to_string(),
                    key.category,
                    decimal_to_sql(key.amount),
                ],
            )?;

            if changed == 0 {
                None
            } else {
                let current = recompute_balance(&tx)?;
                tx.commit()?;
                Some(current)
            }
        };

        match outcome {
            Some(current) => {
                self.events
                    .publish(&LedgerEvent::EntryUpdated { current_balance: current });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Delete the first entry matching the key, in insertion order
    ///
    /// Returns Ok(false) when no row matched.
    pub fn delete_entry(&self, key: &EntryMatch) -> Result<bool> {
        let outcome = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "DELETE FROM ledger_entries
                 WHERE entry_id = (
                     SELECT entry_id FROM ledger_entries
                     WHERE entry_date = ? AND category = ? AND amount = ?
                     ORDER BY entry_id LIMIT 1
                 )",
                params![key.date.to_string(), key.category, decimal_to_sql(key.amount)],
            )?;

            if changed == 0 {
                None
            } else {
                let current = recompute_balance(&tx)?;
                tx.commit()?;
                Some(current)
            }
        };

        match outcome {
            Some(current) => {
                self.events
                    .publish(&LedgerEvent::EntryDeleted { current_balance: current });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// All entries, in insertion order
    pub fn entries(&self) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT kind, entry_date::VARCHAR, category, amount::VARCHAR, note
             FROM ledger_entries ORDER BY entry_id",
        )?;
        collect_entries(&mut stmt, [])
    }

    /// Entries of one kind, in insertion order
    pub fn entries_by_kind(&self, kind: EntryKind) -> Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT kind, entry_date::VARCHAR, category, amount::VARCHAR, note
             FROM ledger_entries WHERE kind = ? ORDER BY entry_id",
        )?;
        collect_entries(&mut stmt, [kind.as_str()])
    }

    pub fn entry_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Recompute and persist the current balance on the given connection
///
/// Callers inside a mutation MUST pass the transaction, so the sums see the
/// uncommitted writes and the whole update shares one commit/rollback
/// boundary.
fn recompute_balance(conn: &Connection) -> Result<Decimal> {
    let starting = query_decimal(
        conn,
        "SELECT starting_balance::VARCHAR FROM ledger_balance WHERE balance_id = 0",
    )?;
    let income = query_decimal(
        conn,
        "SELECT COALESCE(SUM(amount), 0)::VARCHAR FROM ledger_entries WHERE kind = 'income'",
    )?;
    let expense = query_decimal(
        conn,
        "SELECT COALESCE(SUM(amount), 0)::VARCHAR FROM ledger_entries WHERE kind = 'expense'",
    )?;

    let current = starting + income - expense;
    conn.execute(
        "UPDATE ledger_balance SET current_balance = ?, updated_at = current_timestamp
         WHERE balance_id = 0",
        params![decimal_to_sql(current)],
    )?;
    Ok(current)
}

fn collect_entries<P: duckdb::Params>(stmt: &mut duckdb::Statement<'_>, params: P) -> Result<Vec<LedgerEntry>> {
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (kind, date, category, amount, note) = row?;
        entries.push(row_to_entry(&kind, &date, &category, &amount, note)?);
    }
    Ok(entries)
}

fn row_to_entry(
    kind: &str,
    date: &str,
    category: &str,
    amount: &str,
    note: Option<String>,
) -> Result<LedgerEntry> {
    let kind = EntryKind::parse(kind)
        .ok_or_else(|| Error::database(format!("unknown entry kind in storage: {}", kind)))?;
    let date = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("malformed entry date in storage: {}", e)))?;
    let mut entry = LedgerEntry::new(kind, date, category, read_decimal(amount)?);
    entry.note = note;
    Ok(entry)
}

/// Read a single DECIMAL value cast to VARCHAR, preserving exactness
fn query_decimal(conn: &Connection, sql: &str) -> Result<Decimal> {
    let raw: String = conn.query_row(sql, [], |row| row.get(0))?;
    read_decimal(&raw)
}

fn read_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str_exact(raw)
        .map_err(|e| Error::database(format!("malformed decimal in storage ({}): {}", raw, e)))
}

/// DuckDB's Rust binding has no Decimal parameter type; amounts are written
/// through f64 and clamped to two fractional digits by the DECIMAL(15, 2)
/// columns.
fn decimal_to_sql(value: Decimal) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(0.0)
}
