//! Comparison rules shared by the incremental check and the recalculation
//!
//! Both metrics use strict greater-than: a tie never makes a record.

use super::{Metric, PersonalRecordWrite, SetEntry};

pub fn is_new_max_weight(current_best: f64, candidate_weight: f64) -> bool {
    candidate_weight > current_best
}

pub fn is_new_max_volume(current_best_volume: f64, candidate_weight: f64, candidate_reps: u32) -> bool {
    candidate_weight * candidate_reps as f64 > current_best_volume
}

/// Current best value per metric, `None` when no record exists yet
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bests {
    pub max_weight: Option<f64>,
    pub max_volume: Option<f64>,
}

impl Bests {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::MaxWeight => self.max_weight,
            Metric::MaxVolume => self.max_volume,
        }
    }
}

/// Record writes a candidate set earns against the current bests.
///
/// Returns zero, one or two writes, one per beaten metric.
/// Missing bests count as 0.
pub fn derive_records(client_id: &str, set: &SetEntry, bests: &Bests) -> Vec<PersonalRecordWrite> {
    let mut writes = Vec::with_capacity(2);

    if is_new_max_weight(bests.max_weight.unwrap_or(0.0), set.weight) {
        writes.push(to_write(client_id, set, Metric::MaxWeight));
    }
    if is_new_max_volume(bests.max_volume.unwrap_or(0.0), set.weight, set.reps) {
        writes.push(to_write(client_id, set, Metric::MaxVolume));
    }

    writes
}

pub(crate) fn to_write(client_id: &str, set: &SetEntry, metric: Metric) -> PersonalRecordWrite {
    PersonalRecordWrite {
        client_id: client_id.to_string(),
        exercise_id: set.exercise_id.clone(),
        metric,
        weight: set.weight,
        reps: set.reps,
        set_number: set.set_number,
        date: set.date,
        session_id: set.session_id,
        total_volume: match metric {
            Metric::MaxVolume => Some(set.volume()),
            Metric::MaxWeight => None,
        },
    }
}
