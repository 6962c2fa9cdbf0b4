//! Incremental check - one logged set against a snapshot of known records

use anyhow::Result;
use tracing::{debug, warn};

use super::compare::{Bests, derive_records};
use super::{Metric, PersonalRecord, RecordStore, SetEntry};

/// Records already known for a client, as loaded by the caller
#[derive(Debug, Clone, Default)]
pub struct RecordSnapshot {
    records: Vec<PersonalRecord>,
}

impl RecordSnapshot {
    pub fn new(records: Vec<PersonalRecord>) -> Self {
        Self { records }
    }

    /// Best record for one triple.
    ///
    /// The store keeps at most one row per triple; a snapshot holding more
    /// (stale merge, bad import) still resolves to the highest value.
    pub fn best(&self, client_id: &str, exercise_id: &str, metric: Metric) -> Option<&PersonalRecord> {
        let mut matching = self
            .records
            .iter()
            .filter(|r| r.client_id == client_id && r.exercise_id == exercise_id && r.metric == metric);

        let first = matching.next()?;
        let mut best = first;
        let mut count = 1;
        for record in matching {
            count += 1;
            if record.value() > best.value() {
                best = record;
            }
        }
        if count > 1 {
            warn!(
                "{} {} records for {}/{}, using the best",
                count, metric, client_id, exercise_id
            );
        }
        Some(best)
    }

    pub fn bests(&self, client_id: &str, exercise_id: &str) -> Bests {
        Bests {
            max_weight: self.best(client_id, exercise_id, Metric::MaxWeight).map(|r| r.value()),
            max_volume: self.best(client_id, exercise_id, Metric::MaxVolume).map(|r| r.value()),
        }
    }
}

/// New records produced by one check, for the caller to announce
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOutcome {
    pub new_records: Vec<PersonalRecord>,
}

impl CheckOutcome {
    pub fn is_new_record(&self) -> bool {
        !self.new_records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.new_records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.new_records.is_empty()
    }

    pub fn get(&self, metric: Metric) -> Option<&PersonalRecord> {
        self.new_records.iter().find(|r| r.metric == metric)
    }
}

/// Compare `set` with the snapshot and upsert each beaten metric once.
///
/// Store errors propagate; a write that fails leaves earlier writes of
/// this call in place.
pub fn check_set<S: RecordStore + ?Sized>(
    store: &S,
    snapshot: &RecordSnapshot,
    client_id: &str,
    set: &SetEntry,
) -> Result<CheckOutcome> {
    let bests = snapshot.bests(client_id, &set.exercise_id);
    let writes = derive_records(client_id, set, &bests);

    let mut outcome = CheckOutcome::default();
    for write in &writes {
        debug!(
            "Upserting {} record for {}/{}: {} x {}",
            write.metric, client_id, write.exercise_id, write.weight, write.reps
        );
        outcome.new_records.push(store.upsert_record(write)?);
    }

    Ok(outcome)
}
