//! Full recalculation - rebuild a client's records by replaying history
//!
//! Steps: clear stored records, load history, replay sets by session date,
//! write the best set per exercise and metric.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use super::compare::{is_new_max_volume, is_new_max_weight, to_write};
use super::{LoggedSet, Metric, PersonalRecord, PersonalRecordWrite, RecordError, RecordStore, SessionHistory, SetEntry};

/// A record write that failed during the persist phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteFailure {
    pub exercise_id: String,
    pub metric: Metric,
    pub error: String,
}

/// Outcome of a recalculation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecalcReport {
    pub records: Vec<PersonalRecord>,
    pub failures: Vec<WriteFailure>,
    /// Sets left out because their session has no date
    pub skipped_sets: usize,
}

impl RecalcReport {
    /// True when every computed record was written
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Best sets seen so far for one exercise
#[derive(Debug, Default)]
struct ExerciseBests {
    max_weight: Option<SetEntry>,
    max_volume: Option<SetEntry>,
}

impl ExerciseBests {
    fn offer(&mut self, set: &SetEntry) {
        let best_weight = self.max_weight.as_ref().map_or(0.0, |s| s.weight);
        if is_new_max_weight(best_weight, set.weight) {
            self.max_weight = Some(set.clone());
        }
        let best_volume = self.max_volume.as_ref().map_or(0.0, |s| s.volume());
        if is_new_max_volume(best_volume, set.weight, set.reps) {
            self.max_volume = Some(set.clone());
        }
    }
}

/// Dated sets in replay order: session date ascending, store order kept
/// within a date. Returns the number of undated sets left out.
fn chronological_sets(history: Vec<SessionHistory>) -> (Vec<SetEntry>, usize) {
    let mut dated: Vec<(NaiveDate, LoggedSet, i64)> = Vec::new();
    let mut skipped = 0;

    for session in history {
        match session.session_date {
            Some(date) => {
                dated.extend(session.sets.into_iter().map(|set| (date, set, session.session_id)));
            }
            None => {
                if !session.sets.is_empty() {
                    warn!(
                        "Session {} has no date, skipping {} set(s) from record replay",
                        session.session_id,
                        session.sets.len()
                    );
                }
                skipped += session.sets.len();
            }
        }
    }

    // stable: ties on date keep store order
    dated.sort_by_key(|(date, _, _)| *date);

    let sets = dated
        .into_iter()
        .map(|(date, set, session_id)| SetEntry {
            exercise_id: set.exercise_id,
            weight: set.weight,
            reps: set.reps,
            set_number: set.set_number,
            date,
            session_id: Some(session_id),
        })
        .collect();

    (sets, skipped)
}

/// Best record per exercise and metric from a replay of `history`.
/// Pure: nothing is read or written.
pub fn replay(client_id: &str, history: Vec<SessionHistory>) -> (Vec<PersonalRecordWrite>, usize) {
    let (sets, skipped) = chronological_sets(history);

    let mut tracker: BTreeMap<String, ExerciseBests> = BTreeMap::new();
    for set in &sets {
        if set.validate().is_err() {
            warn!(
                "Ignoring invalid set in history of {}: {} {} x {}",
                client_id, set.exercise_id, set.weight, set.reps
            );
            continue;
        }
        tracker.entry(set.exercise_id.clone()).or_default().offer(set);
    }

    let mut writes = Vec::with_capacity(tracker.len() * 2);
    for bests in tracker.values() {
        if let Some(set) = &bests.max_weight {
            writes.push(to_write(client_id, set, Metric::MaxWeight));
        }
        if let Some(set) = &bests.max_volume {
            writes.push(to_write(client_id, set, Metric::MaxVolume));
        }
    }

    (writes, skipped)
}

/// Clear, replay and persist. A failed clear aborts before anything is read;
/// failed writes are collected in the report and do not stop the others.
pub fn recalculate<S: RecordStore + ?Sized>(store: &S, client_id: &str) -> Result<RecalcReport> {
    info!("Recalculating personal records for {}", client_id);

    store
        .delete_all_records_for_client(client_id)
        .map_err(|source| RecordError::ClearFailed {
            client_id: client_id.to_string(),
            source,
        })?;

    let history = store.fetch_workout_history(client_id)?;
    let (writes, skipped_sets) = replay(client_id, history);

    let mut report = RecalcReport {
        skipped_sets,
        ..Default::default()
    };

    for write in &writes {
        match store.upsert_record(write) {
            Ok(record) => report.records.push(record),
            Err(e) => {
                error!(
                    "Failed to write {} record for {}/{}: {:#}",
                    write.metric, client_id, write.exercise_id, e
                );
                report.failures.push(WriteFailure {
                    exercise_id: write.exercise_id.clone(),
                    metric: write.metric,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    info!(
        "Recalculated {} record(s) for {} ({} failed, {} undated set(s) skipped)",
        report.records.len(),
        client_id,
        report.failures.len(),
        report.skipped_sets
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::records::check;
    use crate::records::testing::*;

    fn session(id: i64, day: Option<&str>, sets: Vec<LoggedSet>) -> SessionHistory {
        SessionHistory {
            session_id: id,
            session_date: day.map(date),
            sets,
        }
    }

    fn find<'a>(records: &'a [PersonalRecord], exercise: &str, metric: Metric) -> &'a PersonalRecord {
        records
            .iter()
            .find(|r| r.exercise_id == exercise && r.metric == metric)
            .unwrap()
    }

    #[test]
    fn test_two_session_scenario() {
        let store = MemoryStore::with_history(vec![
            session(1, Some("2024-01-10"), vec![logged(1, "x", 100.0, 5, 1)]),
            session(2, Some("2024-01-20"), vec![logged(2, "x", 110.0, 3, 1), logged(3, "x", 90.0, 10, 2)]),
        ]);

        let report = recalculate(&store, "c1").unwrap();
        assert!(report.is_complete());
        assert_eq!(report.records.len(), 2);

        let weight = find(&report.records, "x", Metric::MaxWeight);
        assert_eq!((weight.weight, weight.reps, weight.date), (110.0, 3, date("2024-01-20")));
        assert_eq!(weight.total_volume, None);

        let volume = find(&report.records, "x", Metric::MaxVolume);
        assert_eq!((volume.weight, volume.reps, volume.date), (90.0, 10, date("2024-01-20")));
        assert_eq!(volume.total_volume, Some(900.0));
        assert_eq!(volume.set_number, 2);
        assert_eq!(volume.session_id, Some(2));
    }

    #[test]
    fn test_earliest_set_wins_ties() {
        // later session listed first: order comes from dates, not from the log
        let store = MemoryStore::with_history(vec![
            session(2, Some("2024-03-02"), vec![logged(2, "bench", 100.0, 5, 1)]),
            session(1, Some("2024-03-01"), vec![logged(1, "bench", 100.0, 5, 1)]),
        ]);

        let report = recalculate(&store, "c1").unwrap();
        assert_eq!(find(&report.records, "bench", Metric::MaxWeight).date, date("2024-03-01"));
        assert_eq!(find(&report.records, "bench", Metric::MaxVolume).date, date("2024-03-01"));
    }

    #[test]
    fn test_clear_happens_first_and_drops_stale_records() {
        let store = MemoryStore::with_history(vec![session(1, Some("2024-01-10"), vec![logged(1, "x", 50.0, 5, 1)])]);
        // stale record for an exercise no longer in history
        check::check_set(&store, &Default::default(), "c1", &entry("gone", 300.0, 1, "2023-01-01")).unwrap();
        store.calls.borrow_mut().clear();

        let report = recalculate(&store, "c1").unwrap();
        assert_eq!(store.calls.borrow()[0], "delete_all");
        assert_eq!(report.records.len(), 2);
        assert!(store.fetch_records("c1", Some("gone")).unwrap().is_empty());
    }

    #[test]
    fn test_failed_clear_aborts_everything() {
        let store = MemoryStore::with_history(vec![session(1, Some("2024-01-10"), vec![logged(1, "x", 50.0, 5, 1)])]);
        store.fail_clear.set(true);

        let err = recalculate(&store, "c1").unwrap_err();
        assert!(matches!(err.downcast_ref::<RecordError>(), Some(RecordError::ClearFailed { .. })));
        assert!(!store.called("fetch_history"));
        assert_eq!(store.upsert_count(), 0);
    }

    #[test]
    fn test_empty_history_is_not_an_error() {
        let store = MemoryStore::default();
        let report = recalculate(&store, "c1").unwrap();
        assert!(report.records.is_empty());
        assert!(report.is_complete());
        assert_eq!(report.skipped_sets, 0);
    }

    #[test]
    fn test_undated_sets_are_skipped() {
        let store = MemoryStore::with_history(vec![
            session(1, Some("2024-01-10"), vec![logged(1, "x", 100.0, 5, 1)]),
            session(2, None, vec![logged(2, "x", 500.0, 5, 1), logged(3, "y", 10.0, 1, 2)]),
        ]);

        let report = recalculate(&store, "c1").unwrap();
        assert_eq!(report.skipped_sets, 2);
        assert_eq!(report.records.len(), 2);
        assert_eq!(find(&report.records, "x", Metric::MaxWeight).weight, 100.0);
        assert!(report.records.iter().all(|r| r.exercise_id != "y"));
    }

    #[test]
    fn test_partial_write_failure_continues() {
        let store = MemoryStore::with_history(vec![session(
            1,
            Some("2024-01-10"),
            vec![logged(1, "bench", 60.0, 8, 1), logged(2, "squat", 100.0, 5, 2), logged(3, "row", 50.0, 10, 3)],
        )]);
        store.fail_upsert_for.borrow_mut().push("squat".into());

        let report = recalculate(&store, "c1").unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.exercise_id == "squat"));
        assert_eq!(report.records.len(), 4);
        assert_eq!(store.upsert_count(), 6);
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let store = MemoryStore::with_history(vec![
            session(1, Some("2024-01-10"), vec![logged(1, "x", 100.0, 5, 1), logged(2, "y", 40.0, 12, 2)]),
            session(2, Some("2024-01-20"), vec![logged(3, "x", 110.0, 3, 1), logged(4, "x", 90.0, 10, 2)]),
        ]);

        let strip = |records: Vec<PersonalRecord>| {
            let mut writes: Vec<_> = records.iter().map(PersonalRecord::to_write).collect();
            writes.sort_by(|a, b| (&a.exercise_id, a.metric).cmp(&(&b.exercise_id, b.metric)));
            writes
        };

        let first = strip(recalculate(&store, "c1").unwrap().records);
        let second = strip(recalculate(&store, "c1").unwrap().records);
        assert_eq!(first, second);
        assert_eq!(strip(store.fetch_records("c1", None).unwrap()), second);
    }

    #[test]
    fn test_replay_matches_brute_force_on_random_history() {
        let mut rng = StdRng::seed_from_u64(7);
        let exercises = ["squat", "bench", "deadlift"];

        for _ in 0..50 {
            let mut history = Vec::new();
            let mut set_id = 0;
            for session_id in 0..rng.gen_range(1..8) {
                let day = 1 + rng.gen_range(0..20);
                let sets = (0..rng.gen_range(0..6))
                    .map(|n| {
                        set_id += 1;
                        let exercise = exercises[rng.gen_range(0..exercises.len())];
                        // coarse weights so ties happen
                        let weight = 20.0 + 10.0 * rng.gen_range(0..5) as f64;
                        logged(set_id, exercise, weight, rng.gen_range(1..6), n + 1)
                    })
                    .collect();
                history.push(session(session_id, Some(&format!("2024-05-{:02}", day)), sets));
            }

            let (writes, skipped) = replay("c1", history.clone());
            assert_eq!(skipped, 0);

            for exercise in exercises {
                let mut sets: Vec<(NaiveDate, f64, f64)> = Vec::new();
                for s in &history {
                    for set in s.sets.iter().filter(|set| set.exercise_id == exercise) {
                        sets.push((s.session_date.unwrap(), set.weight, set.weight * set.reps as f64));
                    }
                }
                let weight = writes.iter().find(|w| w.exercise_id == exercise && w.metric == Metric::MaxWeight);
                let volume = writes.iter().find(|w| w.exercise_id == exercise && w.metric == Metric::MaxVolume);

                if sets.is_empty() {
                    assert!(weight.is_none() && volume.is_none());
                    continue;
                }

                let max_weight = sets.iter().map(|s| s.1).fold(f64::MIN, f64::max);
                let first_weight_date = sets.iter().filter(|s| s.1 == max_weight).map(|s| s.0).min();
                let weight = weight.unwrap();
                assert_eq!(weight.weight, max_weight);
                assert_eq!(Some(weight.date), first_weight_date);

                let max_volume = sets.iter().map(|s| s.2).fold(f64::MIN, f64::max);
                let first_volume_date = sets.iter().filter(|s| s.2 == max_volume).map(|s| s.0).min();
                let volume = volume.unwrap();
                assert_eq!(volume.total_volume, Some(max_volume));
                assert_eq!(Some(volume.date), first_volume_date);
            }
        }
    }
}
