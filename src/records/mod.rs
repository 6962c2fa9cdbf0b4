//! Personal records - detection, storage contract and recalculation
//!
//! Two metrics are tracked per (client, exercise):
//! - max weight: heaviest single set
//! - max volume: single set with the biggest weight x reps

pub mod check;
pub mod compare;
pub mod lock;
pub mod recalc;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub use check::{CheckOutcome, RecordSnapshot};
pub use lock::{ClientGuard, LockMode};
pub use recalc::{RecalcReport, WriteFailure};

/// Record metric
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    MaxWeight,
    MaxVolume,
}

impl Metric {
    pub fn all() -> &'static [Metric] {
        &[Metric::MaxWeight, Metric::MaxVolume]
    }

    /// Column value used by the store
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::MaxWeight => "max_weight",
            Metric::MaxVolume => "max_volume",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::MaxWeight => "max weight",
            Metric::MaxVolume => "max volume",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "max_weight" => Ok(Metric::MaxWeight),
            "max_volume" => Ok(Metric::MaxVolume),
            other => anyhow::bail!("unknown record metric: {}", other),
        }
    }
}

/// A set as it is logged: the candidate for an incremental check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub exercise_id: String,
    /// Canonical unit (kg)
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
    pub date: NaiveDate,
    pub session_id: Option<i64>,
}

impl SetEntry {
    pub fn volume(&self) -> f64 {
        self.weight * self.reps as f64
    }

    /// Reject values the comparison rules are not defined for
    pub fn validate(&self) -> Result<(), RecordError> {
        validate_set(&self.exercise_id, self.weight, self.reps, Some(self.set_number))
    }
}

/// Checks shared by the engine and the set log. `set_number` is `None`
/// when the store assigns it.
pub fn validate_set(exercise_id: &str, weight: f64, reps: u32, set_number: Option<u32>) -> Result<(), RecordError> {
    if exercise_id.trim().is_empty() {
        return Err(RecordError::invalid("exercise id is empty"));
    }
    if !weight.is_finite() || weight <= 0.0 {
        return Err(RecordError::invalid(format!("weight must be positive, got {}", weight)));
    }
    if reps == 0 {
        return Err(RecordError::invalid("reps must be at least 1"));
    }
    if set_number == Some(0) {
        return Err(RecordError::invalid("set number must be at least 1"));
    }
    Ok(())
}

/// A set from the history log. It has no date of its own,
/// it inherits the date of its session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedSet {
    pub id: i64,
    pub exercise_id: String,
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
}

/// One session of the history log with its date joined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub session_id: i64,
    /// `None` when the store could not resolve a date
    pub session_date: Option<NaiveDate>,
    pub sets: Vec<LoggedSet>,
}

/// Record write request, keyed by (client_id, exercise_id, metric)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecordWrite {
    pub client_id: String,
    pub exercise_id: String,
    pub metric: Metric,
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
    pub date: NaiveDate,
    pub session_id: Option<i64>,
    /// Only for `Metric::MaxVolume`
    pub total_volume: Option<f64>,
}

/// Persisted personal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalRecord {
    pub id: i64,
    pub client_id: String,
    pub exercise_id: String,
    pub metric: Metric,
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
    pub date: NaiveDate,
    pub session_id: Option<i64>,
    pub total_volume: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl PersonalRecord {
    pub fn value(&self) -> f64 {
        match self.metric {
            Metric::MaxWeight => self.weight,
            Metric::MaxVolume => self.total_volume.unwrap_or(self.weight * self.reps as f64),
        }
    }

    /// Same record without the store-assigned fields
    pub fn to_write(&self) -> PersonalRecordWrite {
        PersonalRecordWrite {
            client_id: self.client_id.clone(),
            exercise_id: self.exercise_id.clone(),
            metric: self.metric,
            weight: self.weight,
            reps: self.reps,
            set_number: self.set_number,
            date: self.date,
            session_id: self.session_id,
            total_volume: self.total_volume,
        }
    }
}

/// Failures callers need to tell apart
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid set: {reason}")]
    InvalidSet { reason: String },

    #[error("client {client_id} is busy: a record recalculation or check is in progress")]
    ClientBusy { client_id: String },

    #[error("could not clear records of client {client_id}")]
    ClearFailed {
        client_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("session {session_id} does not exist for this client")]
    UnknownSession { session_id: i64 },
}

impl RecordError {
    fn invalid(reason: impl Into<String>) -> Self {
        RecordError::InvalidSet { reason: reason.into() }
    }
}

/// Persistence adapter for personal records and workout history.
///
/// `upsert_record` must be atomic and keyed by (client_id, exercise_id, metric):
/// concurrent writers for one triple are resolved by the store, last write wins.
pub trait RecordStore {
    /// Current records, optionally for one exercise
    fn fetch_records(&self, client_id: &str, exercise_id: Option<&str>) -> Result<Vec<PersonalRecord>>;

    /// The record for one triple, if any
    fn fetch_record(&self, client_id: &str, exercise_id: &str, metric: Metric) -> Result<Option<PersonalRecord>>;

    /// Insert or replace the record for the write's triple
    fn upsert_record(&self, record: &PersonalRecordWrite) -> Result<PersonalRecord>;

    fn delete_all_records_for_client(&self, client_id: &str) -> Result<()>;

    /// Full set log of the client, session dates joined
    fn fetch_workout_history(&self, client_id: &str) -> Result<Vec<SessionHistory>>;

    /// Claim a client. Must be atomic across every user of the store and
    /// fail with `RecordError::ClientBusy` when the claim conflicts.
    fn acquire_client(&self, client_id: &str, mode: LockMode) -> Result<()>;

    fn release_client(&self, client_id: &str, mode: LockMode) -> Result<()>;
}

/// Entry points used by callers: live set logging and maintenance recalculation
pub struct PrEngine<S> {
    store: S,
}

impl<S: RecordStore> PrEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Shared claim for work that belongs with a check, such as storing
    /// the set before checking it. Checks nest inside it.
    pub fn share_client(&self, client_id: &str) -> Result<ClientGuard<'_, S>> {
        ClientGuard::acquire(&self.store, client_id, LockMode::Shared)
    }

    /// Check one freshly logged set against the client's current records
    /// and persist every metric it beats.
    pub fn check_and_record_prs(&self, client_id: &str, set: &SetEntry) -> Result<CheckOutcome> {
        set.validate()?;
        let _guard = self.share_client(client_id)?;

        let mut existing = Vec::with_capacity(2);
        for metric in Metric::all() {
            existing.extend(self.store.fetch_record(client_id, &set.exercise_id, *metric)?);
        }
        let snapshot = RecordSnapshot::new(existing);
        let outcome = check::check_set(&self.store, &snapshot, client_id, set)?;

        if outcome.is_new_record() {
            info!(
                "New personal record for {} on {}: {} metric(s)",
                client_id,
                set.exercise_id,
                outcome.len()
            );
        }
        Ok(outcome)
    }

    /// Rebuild all records of a client from the complete history log
    pub fn recalculate_all_records(&self, client_id: &str) -> Result<RecalcReport> {
        let _guard = ClientGuard::acquire(&self.store, client_id, LockMode::Exclusive)?;
        recalc::recalculate(&self.store, client_id)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_metric_round_trip_through_str() {
        for metric in Metric::all() {
            assert_eq!(metric.as_str().parse::<Metric>().unwrap(), *metric);
        }
        assert!("max_reps".parse::<Metric>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(entry("squat", 0.0, 5, "2024-01-01").validate().is_err());
        assert!(entry("squat", -10.0, 5, "2024-01-01").validate().is_err());
        assert!(entry("squat", f64::NAN, 5, "2024-01-01").validate().is_err());
        assert!(entry("squat", 100.0, 0, "2024-01-01").validate().is_err());
        assert!(entry("", 100.0, 5, "2024-01-01").validate().is_err());
        assert!(entry("squat", 100.0, 5, "2024-01-01").validate().is_ok());
    }

    #[test]
    fn test_engine_rejects_invalid_set_without_touching_store() {
        let engine = PrEngine::new(MemoryStore::default());
        let err = engine
            .check_and_record_prs("c1", &entry("squat", 0.0, 5, "2024-01-01"))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<RecordError>(), Some(RecordError::InvalidSet { .. })));
        assert!(engine.store().calls.borrow().is_empty());
    }

    #[test]
    fn test_engine_first_set_records_both_metrics() {
        let engine = PrEngine::new(MemoryStore::default());
        let outcome = engine
            .check_and_record_prs("c1", &entry("squat", 60.0, 5, "2024-01-01"))
            .unwrap();
        assert!(outcome.is_new_record());
        assert_eq!(outcome.len(), 2);
        assert_eq!(engine.store().records.borrow().len(), 2);
    }

    #[test]
    fn test_engine_sequence_keeps_one_record_per_metric() {
        let engine = PrEngine::new(MemoryStore::default());
        let sets = [
            entry("squat", 60.0, 5, "2024-01-01"),
            entry("squat", 70.0, 3, "2024-01-02"),
            entry("squat", 50.0, 12, "2024-01-03"),
            entry("squat", 70.0, 3, "2024-01-04"),
            entry("bench", 40.0, 8, "2024-01-04"),
        ];
        for set in &sets {
            engine.check_and_record_prs("c1", set).unwrap();
        }

        let records = engine.store().fetch_records("c1", Some("squat")).unwrap();
        assert_eq!(records.len(), 2);
        let weight = records.iter().find(|r| r.metric == Metric::MaxWeight).unwrap();
        assert_eq!(weight.weight, 70.0);
        assert_eq!(weight.date, date("2024-01-02"));
        let volume = records.iter().find(|r| r.metric == Metric::MaxVolume).unwrap();
        assert_eq!(volume.total_volume, Some(600.0));
    }

    #[test]
    fn test_engine_check_refused_during_recalculation() {
        let engine = PrEngine::new(MemoryStore::default());
        let _guard = ClientGuard::acquire(engine.store(), "c1", LockMode::Exclusive).unwrap();

        let err = engine
            .check_and_record_prs("c1", &entry("squat", 60.0, 5, "2024-01-01"))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<RecordError>(), Some(RecordError::ClientBusy { .. })));

        // other clients are unaffected
        assert!(engine.check_and_record_prs("c2", &entry("squat", 60.0, 5, "2024-01-01")).is_ok());
    }

    #[test]
    fn test_engine_reads_one_record_per_metric() {
        let engine = PrEngine::new(MemoryStore::default());
        engine.check_and_record_prs("c1", &entry("squat", 60.0, 5, "2024-01-01")).unwrap();
        engine.store().calls.borrow_mut().clear();

        engine.check_and_record_prs("c1", &entry("squat", 65.0, 5, "2024-01-08")).unwrap();
        let calls = engine.store().calls.borrow();
        assert_eq!(calls.iter().filter(|c| c.as_str() == "fetch_record").count(), 2);
        assert!(!calls.iter().any(|c| c == "fetch_records"));
    }

    #[test]
    fn test_engine_recalculation_refused_while_client_shared() {
        let engine = PrEngine::new(MemoryStore::default());
        let guard = engine.share_client("c1").unwrap();
        // checks nest inside the caller's claim
        assert!(engine.check_and_record_prs("c1", &entry("squat", 60.0, 5, "2024-01-01")).is_ok());

        let err = engine.recalculate_all_records("c1").unwrap_err();
        assert!(matches!(err.downcast_ref::<RecordError>(), Some(RecordError::ClientBusy { .. })));
        assert!(!engine.store().called("delete_all"));

        drop(guard);
        assert!(engine.recalculate_all_records("c1").is_ok());
    }

    #[test]
    fn test_engine_recalculation_releases_lock() {
        let engine = PrEngine::new(MemoryStore::default());
        engine.recalculate_all_records("c1").unwrap();
        assert!(engine.check_and_record_prs("c1", &entry("squat", 60.0, 5, "2024-01-01")).is_ok());
    }
}
