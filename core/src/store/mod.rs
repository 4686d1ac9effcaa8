//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! The engine reaches it through the collaborator traits; nothing else
//! executes SQL. The connection sits behind a mutex so one store can be
//! shared by concurrent gate calls.

use crate::{
    collaborator::AuditTrail,
    error::RiskResult,
    event::{EventLogEntry, RiskEvent},
};
use chrono::NaiveDateTime;
use rusqlite::{params, types::Type, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard, PoisonError};

mod account;
mod ledger;
mod report;
mod transaction;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub(crate) fn to_sql_time(t: NaiveDateTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub(crate) fn from_sql_time(idx: usize, s: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read column `idx` as a timestamp.
pub(crate) fn time_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    from_sql_time(idx, &raw)
}

pub struct RiskStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl RiskStore {
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode: better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        self.conn()
            .execute_batch(include_str!("../../../migrations/001_risk_core.sql"))?;
        Ok(())
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_entry(&self, entry: &EventLogEntry) -> RiskResult<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO event_log (source, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.source,
                entry.event_type,
                entry.payload,
                to_sql_time(entry.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn events_of_type(&self, event_type: &str) -> RiskResult<Vec<EventLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, source, event_type, payload, created_at
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    source:     row.get(1)?,
                    event_type: row.get(2)?,
                    payload:    row.get(3)?,
                    created_at: time_col(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: Option<&str>) -> RiskResult<u64> {
        let conn = self.conn();
        let count: i64 = match event_type {
            Some(t) => conn.query_row(
                "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
                params![t],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    pub fn last_event(&self) -> RiskResult<Option<EventLogEntry>> {
        let conn = self.conn();
        let entry = conn
            .query_row(
                "SELECT id, source, event_type, payload, created_at
                 FROM event_log ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(EventLogEntry {
                        id:         Some(row.get(0)?),
                        source:     row.get(1)?,
                        event_type: row.get(2)?,
                        payload:    row.get(3)?,
                        created_at: time_col(row, 4)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }
}

impl AuditTrail for RiskStore {
    fn append_event(&self, at: NaiveDateTime, event: &RiskEvent) -> RiskResult<()> {
        let entry = EventLogEntry::new(event, at)?;
        self.append_entry(&entry)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn time_text_round_trips_and_sorts() {
        let a = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap().and_hms_milli_opt(9, 5, 7, 40).unwrap();
        let b = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(from_sql_time(0, &to_sql_time(a)).unwrap(), a);
        assert!(to_sql_time(a) < to_sql_time(b));
    }

    #[test]
    fn events_append_and_count() {
        let store = RiskStore::in_memory().unwrap();
        store.migrate().unwrap();
        let at = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap().and_hms_opt(9, 0, 0).unwrap();
        store
            .append_event(at, &RiskEvent::LedgerCheckpointed { records: 3 })
            .unwrap();
        store
            .append_event(at, &RiskEvent::ScoresRecalculated { customers: 2 })
            .unwrap();
        assert_eq!(store.event_count(None).unwrap(), 2);
        assert_eq!(store.event_count(Some("ledger_checkpointed")).unwrap(), 1);
        let last = store.last_event().unwrap().unwrap();
        assert_eq!(last.decode().unwrap(), RiskEvent::ScoresRecalculated { customers: 2 });
    }

    #[test]
    fn migrate_is_repeatable() {
        let store = RiskStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.migrate().unwrap();
    }
}
