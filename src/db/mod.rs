//! Database module - SQLite storage for sessions, sets and personal records

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::records::{
    LockMode, LoggedSet, Metric, PersonalRecord, PersonalRecordWrite, RecordError, RecordStore, SessionHistory,
    validate_set,
};

const DATE_FORMAT: &str = "%Y-%m-%d";

const RECORD_COLUMNS: &str =
    "id, client_id, exercise_id, metric, weight, reps, set_number, date, session_id, total_volume, recorded_at";

/// Workout session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub client_id: String,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub client_id: String,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSet {
    pub client_id: String,
    pub session_id: i64,
    pub exercise_id: String,
    /// Canonical unit (kg)
    pub weight: f64,
    pub reps: u32,
    /// Next free number in the session when `None`
    pub set_number: Option<u32>,
}

/// Database wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("opening database {}", path))?;
        // journal_mode answers with the new mode
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL,
                date TEXT,
                notes TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_client ON sessions (client_id, date);

            CREATE TABLE IF NOT EXISTS workout_sets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES sessions (id) ON DELETE CASCADE,
                exercise_id TEXT NOT NULL,
                weight REAL NOT NULL,
                reps INTEGER NOT NULL,
                set_number INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sets_session ON workout_sets (session_id);

            CREATE TABLE IF NOT EXISTS personal_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL,
                exercise_id TEXT NOT NULL,
                metric TEXT NOT NULL,
                weight REAL NOT NULL,
                reps INTEGER NOT NULL,
                set_number INTEGER NOT NULL,
                date TEXT NOT NULL,
                session_id INTEGER,
                total_volume REAL,
                recorded_at TEXT NOT NULL,
                UNIQUE (client_id, exercise_id, metric)
            );

            CREATE TABLE IF NOT EXISTS client_claims (
                client_id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                holders INTEGER NOT NULL,
                claimed_at TEXT NOT NULL
            );",
        )?;

        Ok(())
    }

    /// Add new workout session
    pub fn add_session(&self, session: &NewSession) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sessions (client_id, date, notes, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.client_id,
                session.date.map(|d| d.format(DATE_FORMAT).to_string()),
                session.notes,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT id, client_id, date, notes FROM sessions WHERE id = ?1",
                params![id],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Sessions of a client, newest first
    pub fn list_sessions(&self, client_id: &str) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, client_id, date, notes FROM sessions WHERE client_id = ?1 ORDER BY date DESC, id DESC",
        )?;
        let sessions = stmt
            .query_map(params![client_id], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Add a set to one of the client's sessions
    pub fn add_set(&self, set: &NewSet) -> Result<LoggedSet> {
        validate_set(&set.exercise_id, set.weight, set.reps, set.set_number)?;

        match self.get_session(set.session_id)? {
            Some(session) if session.client_id == set.client_id => {}
            _ => {
                return Err(RecordError::UnknownSession {
                    session_id: set.session_id,
                }
                .into());
            }
        }

        let set_number = match set.set_number {
            Some(n) => n,
            None => self.conn.query_row(
                "SELECT COALESCE(MAX(set_number), 0) + 1 FROM workout_sets WHERE session_id = ?1",
                params![set.session_id],
                |row| row.get(0),
            )?,
        };

        self.conn.execute(
            "INSERT INTO workout_sets (session_id, exercise_id, weight, reps, set_number) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![set.session_id, set.exercise_id, set.weight, set.reps, set_number],
        )?;

        Ok(LoggedSet {
            id: self.conn.last_insert_rowid(),
            exercise_id: set.exercise_id.clone(),
            weight: set.weight,
            reps: set.reps,
            set_number,
        })
    }

    /// Drop every claim on a client, for claims left by a crashed process.
    /// Returns whether a claim existed.
    pub fn release_all_claims(&self, client_id: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM client_claims WHERE client_id = ?1", params![client_id])?;
        if removed > 0 {
            warn!("Force-released claim on {}", client_id);
        }
        Ok(removed > 0)
    }
}

impl RecordStore for Database {
    fn fetch_records(&self, client_id: &str, exercise_id: Option<&str>) -> Result<Vec<PersonalRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM personal_records
             WHERE client_id = ?1 AND (?2 IS NULL OR exercise_id = ?2)
             ORDER BY exercise_id, metric",
            RECORD_COLUMNS
        ))?;
        let records = stmt
            .query_map(params![client_id, exercise_id], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn fetch_record(&self, client_id: &str, exercise_id: &str, metric: Metric) -> Result<Option<PersonalRecord>> {
        let record = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM personal_records WHERE client_id = ?1 AND exercise_id = ?2 AND metric = ?3",
                    RECORD_COLUMNS
                ),
                params![client_id, exercise_id, metric.as_str()],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn upsert_record(&self, record: &PersonalRecordWrite) -> Result<PersonalRecord> {
        // single statement: the unique key resolves concurrent writers
        let stored = self.conn.query_row(
            &format!(
                "INSERT INTO personal_records
                    (client_id, exercise_id, metric, weight, reps, set_number, date, session_id, total_volume, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (client_id, exercise_id, metric) DO UPDATE SET
                    weight = excluded.weight,
                    reps = excluded.reps,
                    set_number = excluded.set_number,
                    date = excluded.date,
                    session_id = excluded.session_id,
                    total_volume = excluded.total_volume,
                    recorded_at = excluded.recorded_at
                 RETURNING {}",
                RECORD_COLUMNS
            ),
            params![
                record.client_id,
                record.exercise_id,
                record.metric.as_str(),
                record.weight,
                record.reps,
                record.set_number,
                record.date.format(DATE_FORMAT).to_string(),
                record.session_id,
                record.total_volume,
                Utc::now().to_rfc3339(),
            ],
            row_to_record,
        )?;
        debug!("Stored {} record {} for {}/{}", stored.metric, stored.id, stored.client_id, stored.exercise_id);
        Ok(stored)
    }

    fn delete_all_records_for_client(&self, client_id: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM personal_records WHERE client_id = ?1", params![client_id])?;
        debug!("Deleted {} record(s) of {}", deleted, client_id);
        Ok(())
    }

    fn fetch_workout_history(&self, client_id: &str) -> Result<Vec<SessionHistory>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.date, w.id, w.exercise_id, w.weight, w.reps, w.set_number
             FROM sessions s
             JOIN workout_sets w ON w.session_id = s.id
             WHERE s.client_id = ?1
             ORDER BY s.date, s.id, w.set_number, w.id",
        )?;

        let mut rows = stmt.query(params![client_id])?;
        let mut history: Vec<SessionHistory> = Vec::new();

        while let Some(row) = rows.next()? {
            let session_id: i64 = row.get(0)?;
            let set = LoggedSet {
                id: row.get(2)?,
                exercise_id: row.get(3)?,
                weight: row.get(4)?,
                reps: row.get(5)?,
                set_number: row.get(6)?,
            };

            match history.last_mut() {
                Some(last) if last.session_id == session_id => last.sets.push(set),
                _ => {
                    let raw: Option<String> = row.get(1)?;
                    let session_date = raw.as_deref().and_then(|s| match parse_date(s) {
                        Some(d) => Some(d),
                        None => {
                            warn!("Session {} has unreadable date {:?}", session_id, s);
                            None
                        }
                    });
                    history.push(SessionHistory {
                        session_id,
                        session_date,
                        sets: vec![set],
                    });
                }
            }
        }

        Ok(history)
    }

    fn acquire_client(&self, client_id: &str, mode: LockMode) -> Result<()> {
        // one statement each, so the check and the claim are atomic across connections
        let claimed = match mode {
            LockMode::Exclusive => self.conn.execute(
                "INSERT INTO client_claims (client_id, mode, holders, claimed_at) VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (client_id) DO NOTHING",
                params![client_id, mode.as_str(), Utc::now().to_rfc3339()],
            )?,
            LockMode::Shared => self.conn.execute(
                "INSERT INTO client_claims (client_id, mode, holders, claimed_at) VALUES (?1, ?2, 1, ?3)
                 ON CONFLICT (client_id) DO UPDATE SET holders = holders + 1
                 WHERE mode = excluded.mode",
                params![client_id, mode.as_str(), Utc::now().to_rfc3339()],
            )?,
        };

        if claimed == 0 {
            return Err(RecordError::ClientBusy {
                client_id: client_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn release_client(&self, client_id: &str, mode: LockMode) -> Result<()> {
        match mode {
            LockMode::Exclusive => {
                self.conn.execute(
                    "DELETE FROM client_claims WHERE client_id = ?1 AND mode = ?2",
                    params![client_id, mode.as_str()],
                )?;
            }
            LockMode::Shared => {
                self.conn.execute(
                    "UPDATE client_claims SET holders = holders - 1 WHERE client_id = ?1 AND mode = ?2",
                    params![client_id, mode.as_str()],
                )?;
                self.conn.execute(
                    "DELETE FROM client_claims WHERE client_id = ?1 AND mode = ?2 AND holders <= 0",
                    params![client_id, mode.as_str()],
                )?;
            }
        }
        Ok(())
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let date: Option<String> = row.get(2)?;
    Ok(Session {
        id: row.get(0)?,
        client_id: row.get(1)?,
        date: date.as_deref().and_then(parse_date),
        notes: row.get(3)?,
    })
}

fn row_to_record(row: &Row) -> rusqlite::Result<PersonalRecord> {
    let metric: String = row.get(3)?;
    let date: String = row.get(7)?;
    let recorded_at: String = row.get(10)?;

    Ok(PersonalRecord {
        id: row.get(0)?,
        client_id: row.get(1)?,
        exercise_id: row.get(2)?,
        metric: metric
            .parse()
            .map_err(|e: anyhow::Error| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, e.into()))?,
        weight: row.get(4)?,
        reps: row.get(5)?,
        set_number: row.get(6)?,
        date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        session_id: row.get(8)?,
        total_volume: row.get(9)?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
