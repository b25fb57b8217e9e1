//! # Document Counters
//!
//! Monotonic business numbering for purchases (`PC-000123`) and sales
//! (`SA-000123`).
//!
//! ## Why Not Read-Then-Write?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ❌ WRONG: read the last number, add one, write it back                │
//! │     Two concurrent requests read the same "last" value and both        │
//! │     mint PC-000124. The loser retries after a failed insert, maybe.    │
//! │                                                                         │
//! │  ✅ CORRECT: one atomic statement inside the creating transaction      │
//! │     UPDATE document_counters SET value = value + 1 WHERE name = ?      │
//! │     SELECT value ...                                                    │
//! │     The increment commits or rolls back together with the document     │
//! │     that consumed the number.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A bounded retry (3 attempts) still wraps the consuming insert: an
//! externally seeded row can collide with a minted number exactly once per
//! seeded value, after which the counter has moved past it.

use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;

/// Number of draws attempted before a unique-collision fails hard.
pub const MAX_NUMBER_ATTEMPTS: u32 = 3;

/// Counter kinds, matching rows in `document_counters`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    Purchase,
    Sale,
}

impl CounterKind {
    const fn row_name(&self) -> &'static str {
        match self {
            CounterKind::Purchase => "purchase",
            CounterKind::Sale => "sale",
        }
    }

    const fn prefix(&self) -> &'static str {
        match self {
            CounterKind::Purchase => "PC",
            CounterKind::Sale => "SA",
        }
    }
}

/// Repository for document numbering.
#[derive(Debug, Clone)]
pub struct DocumentCounters {
    pool: SqlitePool,
}

impl DocumentCounters {
    /// Creates a new DocumentCounters.
    pub fn new(pool: SqlitePool) -> Self {
        DocumentCounters { pool }
    }

    /// Draws the next number on the caller's transaction connection.
    ///
    /// The increment is part of the enclosing transaction: if the document
    /// insert fails, the number is returned to the sequence on rollback.
    pub async fn next_number(
        &self,
        conn: &mut SqliteConnection,
        kind: CounterKind,
    ) -> DbResult<String> {
        sqlx::query("UPDATE document_counters SET value = value + 1 WHERE name = ?1")
            .bind(kind.row_name())
            .execute(&mut *conn)
            .await?;

        let value: i64 =
            sqlx::query_scalar("SELECT value FROM document_counters WHERE name = ?1")
                .bind(kind.row_name())
                .fetch_one(&mut *conn)
                .await?;

        Ok(format!("{}-{:06}", kind.prefix(), value))
    }

    /// Reads the current counter value without consuming a number.
    pub async fn current(&self, kind: CounterKind) -> DbResult<i64> {
        let value: i64 =
            sqlx::query_scalar("SELECT value FROM document_counters WHERE name = ?1")
                .bind(kind.row_name())
                .fetch_one(&self.pool)
                .await?;

        Ok(value)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_numbers_are_monotonic_and_formatted() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counters = db.counters();

        let mut tx = db.pool().begin().await.unwrap();
        let first = counters
            .next_number(&mut tx, CounterKind::Purchase)
            .await
            .unwrap();
        let second = counters
            .next_number(&mut tx, CounterKind::Purchase)
            .await
            .unwrap();
        let sale = counters
            .next_number(&mut tx, CounterKind::Sale)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, "PC-000001");
        assert_eq!(second, "PC-000002");
        assert_eq!(sale, "SA-000001");
        assert_eq!(counters.current(CounterKind::Purchase).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rollback_returns_the_number() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let counters = db.counters();

        let mut tx = db.pool().begin().await.unwrap();
        let drawn = counters
            .next_number(&mut tx, CounterKind::Sale)
            .await
            .unwrap();
        assert_eq!(drawn, "SA-000001");
        tx.rollback().await.unwrap();

        // the failed operation never consumed the number
        assert_eq!(counters.current(CounterKind::Sale).await.unwrap(), 0);

        let mut tx = db.pool().begin().await.unwrap();
        let redrawn = counters
            .next_number(&mut tx, CounterKind::Sale)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert_eq!(redrawn, "SA-000001");
    }
}
