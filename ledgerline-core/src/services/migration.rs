//! Migration service - manages database schema migrations
//!
//! Migrations are SQL files embedded at compile time. Each applied migration
//! is recorded in sys_migrations so repeated runs are idempotent.

use duckdb::Connection;

use crate::domain::result::Result;
use crate::migrations::MIGRATIONS;

/// Result of running migrations
#[derive(Debug)]
pub struct MigrationResult {
    /// Names of newly applied migrations
    pub applied: Vec<String>,
    /// Count of migrations that were already applied
    pub already_applied: usize,
}

/// Service for managing database migrations
pub struct MigrationService<'a> {
    conn: &'a Connection,
}

impl<'a> MigrationService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Run all pending migrations in order
    ///
    /// The first migration creates the sys_migrations table itself, so a
    /// fresh database bootstraps by running it unconditionally.
    pub fn run_pending(&self) -> Result<MigrationResult> {
        if !self.migrations_table_exists()? {
            let (name, sql) = MIGRATIONS[0];
            self.conn.execute_batch(sql)?;
            self.record(name)?;
        }

        let applied_before = self.applied()?;
        let mut newly_applied = Vec::new();

        for (name, sql) in MIGRATIONS.iter() {
            if applied_before.iter().any(|a| a == name) {
                continue;
            }
            self.conn.execute_batch(sql)?;
            self.record(name)?;
            newly_applied.push(name.to_string());
        }

        Ok(MigrationResult {
            already_applied: applied_before.len(),
            applied: newly_applied,
        })
    }

    /// Names of migrations not yet applied
    pub fn pending(&self) -> Result<Vec<String>> {
        let applied = if self.migrations_table_exists()? {
            self.applied()?
        } else {
            Vec::new()
        };
        Ok(MIGRATIONS
            .iter()
            .filter(|(name, _)| !applied.iter().any(|a| a == name))
            .map(|(name, _)| name.to_string())
            .collect())
    }

    fn migrations_table_exists(&self) -> Result<bool> {
        let count: std::result::Result<i64, _> = self.conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'sys_migrations'",
            [],
            |row| row.get(0),
        );
        Ok(count.map(|c| c > 0).unwrap_or(false))
    }

    fn applied(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT migration_name FROM sys_migrations ORDER BY migration_name")?;
        let names = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut result = Vec::new();
        for name in names {
            result.push(name?);
        }
        Ok(result)
    }

    fn record(&self, name: &str) -> Result<()> {
        self.conn
            .execute("INSERT INTO sys_migrations (migration_name) VALUES (?)", [name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duckdb::Connection;

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);

        let result = service.run_pending().unwrap();
        // Bootstrap runs before the loop, so it shows up in already_applied
        assert_eq!(result.applied.len(), MIGRATIONS.len() - 1);

        // Running again should apply nothing
        let result2 = service.run_pending().unwrap();
        assert_eq!(result2.applied.len(), 0);
        assert_eq!(result2.already_applied, MIGRATIONS.len());
    }

    #[test]
    fn test_pending_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        let service = MigrationService::new(&conn);

        let pending = service.pending().unwrap();
        assert_eq!(pending.len(), MIGRATIONS.len());

        service.run_pending().unwrap();
        assert!(service.pending().unwrap().is_empty());
    }

    #[test]
    fn test_initial_schema_seeds_balance_row() {
        let conn = Connection::open_in_memory().unwrap();
        MigrationService::new(&conn).run_pending().unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ledger_balance WHERE balance_id = 0", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);
    }
}
