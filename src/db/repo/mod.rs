//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `members.rs` - Tree store, sessions, and team queries
//! - `carry.rs` - Plans, PV accumulation, carry balances, and matching payouts
//! - `wallet.rs` - Wallet balances, wallet ledger, and withdrawals
//! - `review.rs` - KYC records and top-up requests
//!
//! Every write transaction issues a write statement first so that SQLite takes
//! the writer lock up front; reads that follow inside the transaction observe a
//! stable snapshot.

mod carry;
mod members;
mod review;
mod wallet;

pub use carry::ActivationOutcome;
pub use members::InsertMemberError;

use crate::domain::Decimal;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

/// Result of an admin-driven status transition guarded by `WHERE status = 'pending'`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewTransition<T> {
    Applied(T),
    NotFound,
    AlreadyProcessed,
    /// The stored data violates a ledger invariant; nothing was written.
    Inconsistent(String),
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Read a money column. A stored value that does not parse is a decode error.
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str_canonical(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// SQLite reports unique violations as "UNIQUE constraint failed: table.col, ...".
fn unique_violation_columns(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.message().to_string())
        }
        _ => None,
    }
}

/// `?, ?, ?` for an IN clause of `n` binds.
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
