//! SQLite-backed live table mirror and append-only attendance history.
//!
//! The live table is a read model for dashboards: it is rewritten from the
//! in-memory presence store and emptied at every period boundary. History rows
//! are only ever inserted.

use crate::error::LedgerError;
use crate::models::{
    AttendanceStatus, HistoryFilter, HistoryRecord, DATETIME_FORMAT, DATE_FORMAT,
};
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_presence::LiveRecord;
use rusqlite::{params, Connection, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

const CURRENT_SCHEMA_VERSION: i32 = 2;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS attendance_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL,
    date TEXT NOT NULL,
    label TEXT NOT NULL,
    status TEXT NOT NULL,
    location TEXT NOT NULL,
    generated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_date_label ON attendance_history(date, label);
";

const SCHEMA_V2: &str = "
CREATE TABLE IF NOT EXISTS live_presence (
    entity_id INTEGER PRIMARY KEY,
    label TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    rssi INTEGER NOT NULL,
    agent_addr TEXT
);
";

#[derive(Clone)]
pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!("Failed to enable WAL mode: {}", err);
        }
        let ledger = Self::init(conn)?;
        tracing::info!("Ledger opened at {}", path.display());
        Ok(ledger)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, LedgerError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Append one snapshot batch atomically.
    pub fn append_history(&self, records: &[HistoryRecord]) -> Result<usize, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO attendance_history
                    (entity_id, date, label, status, location, generated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.entity_id,
                    record.date.format(DATE_FORMAT).to_string(),
                    record.label,
                    record.status.as_str(),
                    record.location,
                    record.generated_at.format(DATETIME_FORMAT).to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Read history rows back, newest batch first, roster order within a batch.
    pub fn query_history(&self, filter: &HistoryFilter) -> Result<Vec<HistoryRecord>, LedgerError> {
        let conn = self.lock()?;
        let date = filter.date.map(|d| d.format(DATE_FORMAT).to_string());
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(
            "SELECT entity_id, date, label, status, location, generated_at
             FROM attendance_history
             WHERE (?1 IS NULL OR date = ?1) AND (?2 IS NULL OR label = ?2)
             ORDER BY generated_at DESC, id ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![date, filter.label, limit], read_history_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(decode_history_row(row?)?);
        }
        Ok(records)
    }

    /// Replace the live table with the given records.
    pub fn replace_live(&self, records: &[LiveRecord]) -> Result<(), LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM live_presence", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO live_presence (entity_id, label, last_seen, rssi, agent_addr)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.entity_id,
                    record.observed_label,
                    record.last_seen.format(DATETIME_FORMAT).to_string(),
                    record.rssi,
                    record.agent_addr,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn clear_live(&self) -> Result<usize, LedgerError> {
        let conn = self.lock()?;
        Ok(conn.execute("DELETE FROM live_presence", [])?)
    }

    pub fn list_live(&self) -> Result<Vec<LiveRecord>, LedgerError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entity_id, label, last_seen, rssi, agent_addr
             FROM live_presence ORDER BY entity_id",
        )?;
        let rows = stmt.query_map([], |row| {
            let last_seen: String = row.get(2)?;
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                last_seen,
                row.get::<_, i32>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (entity_id, observed_label, last_seen, rssi, agent_addr) = row?;
            records.push(LiveRecord {
                entity_id,
                observed_label,
                last_seen: parse_datetime(&last_seen)?,
                rssi,
                agent_addr,
            });
        }
        Ok(records)
    }
}

type RawHistoryRow = (u32, String, String, String, String, String);

fn read_history_row(row: &Row<'_>) -> rusqlite::Result<RawHistoryRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_history_row(raw: RawHistoryRow) -> Result<HistoryRecord, LedgerError> {
    let (entity_id, date, label, status, location, generated_at) = raw;
    Ok(HistoryRecord {
        entity_id,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| LedgerError::InvalidRow(format!("date '{}': {}", date, e)))?,
        label,
        status: status
            .parse::<AttendanceStatus>()
            .map_err(LedgerError::InvalidRow)?,
        location,
        generated_at: parse_datetime(&generated_at)?,
    })
}

fn parse_datetime(value: &str) -> Result<NaiveDateTime, LedgerError> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|e| LedgerError::InvalidRow(format!("datetime '{}': {}", value, e)))
}

fn run_migrations(conn: &mut Connection) -> Result<(), LedgerError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(LedgerError::Schema(format!(
            "database version ({}) is newer than supported schema ({})",
            version, CURRENT_SCHEMA_VERSION
        )));
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        version += 1;
        apply_migration(&tx, version)?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    tracing::debug!("Ledger schema migrated to version {}", CURRENT_SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), LedgerError> {
    match version {
        1 => tx.execute_batch(SCHEMA_V1)?,
        2 => tx.execute_batch(SCHEMA_V2)?,
        other => {
            return Err(LedgerError::Schema(format!("no migration for version {}", other)));
        }
    }
    Ok(())
}
