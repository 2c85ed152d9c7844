//! SQLite profile store.
//!
//! RULE: Only the store talks to the database.
//! Components call store methods and never execute SQL directly.

use crate::{
    error::ConsoleResult,
    event::{ConsoleEvent, EventLogEntry},
    profile::RiskProfile,
    query::{QueryBuilder, QueryCriteria},
    types::ProfileKind,
};
use rusqlite::{params, params_from_iter, Connection, Row};

mod customer;
mod transaction;

pub use customer::NewCustomerProfile;
pub use transaction::NewTransactionProfile;

/// A profile type that can be read back from its table.
pub trait StoredProfile: RiskProfile + Sized {
    const KIND: ProfileKind;

    /// Map a `SELECT *` row. Columns are read by name.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

pub struct ProfileStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl ProfileStore {
    pub fn open(path: &str) -> ConsoleResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        log::info!("Profile store opened at {path}");
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ConsoleResult<Self> {
        let conn = Connection::open(":memory:")?;
        Ok(Self { conn, path: None })
    }

    /// Path the store was opened with, if file-backed.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ConsoleResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_profiles.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_event_log.sql"))?;
        Ok(())
    }

    // ── Profiles ──────────────────────────────────────────────

    /// One page of profiles matching `criteria`, in builder order.
    pub fn query_profiles<P: StoredProfile>(&self, criteria: &QueryCriteria) -> ConsoleResult<Vec<P>> {
        let built = QueryBuilder::build(criteria, P::KIND, false);
        log::debug!("{} query: {}", P::KIND, built.sql);
        let mut stmt = self.conn.prepare(&built.sql)?;
        let rows = stmt.query_map(params_from_iter(built.params.iter()), P::from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Row count matching `criteria`. Limit and offset are ignored.
    pub fn count_profiles(&self, kind: ProfileKind, criteria: &QueryCriteria) -> ConsoleResult<u64> {
        let built = QueryBuilder::build(criteria, kind, true);
        log::debug!("{kind} count: {}", built.sql);
        let count: i64 = self.conn.query_row(
            &built.sql,
            params_from_iter(built.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    // ── Event log ─────────────────────────────────────────────

    pub fn append_event(&self, event: &ConsoleEvent) -> ConsoleResult<()> {
        let entry = EventLogEntry::from_event(event, chrono::Utc::now().to_rfc3339())?;
        self.conn.execute(
            "INSERT INTO event_log (source, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.source, entry.event_type, entry.payload, entry.created_at],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> ConsoleResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source, event_type, payload, created_at
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![event_type], |row| {
            Ok(EventLogEntry {
                id:         Some(row.get(0)?),
                source:     row.get(1)?,
                event_type: row.get(2)?,
                payload:    row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn event_count(&self) -> ConsoleResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(count)
    }
}
