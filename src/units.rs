//! Weight units - everything is stored in kilograms

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const KG_PER_LB: f64 = 0.453_592_37;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum WeightUnit {
    #[default]
    Kilograms,
    Pounds,
}

impl WeightUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            WeightUnit::Kilograms => "kg",
            WeightUnit::Pounds => "lb",
        }
    }
}

impl FromStr for WeightUnit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kg" | "kgs" | "kilograms" => Ok(WeightUnit::Kilograms),
            "lb" | "lbs" | "pounds" => Ok(WeightUnit::Pounds),
            other => anyhow::bail!("unknown weight unit: {}", other),
        }
    }
}

/// Convert to kilograms, rounded to 2 decimals.
///
/// Rounding keeps the same entered value mapping to the same stored weight,
/// so equal lifts still compare as ties.
pub fn normalize(weight: f64, unit: WeightUnit) -> f64 {
    let kg = match unit {
        WeightUnit::Kilograms => weight,
        WeightUnit::Pounds => weight * KG_PER_LB,
    };
    (kg * 100.0).round() / 100.0
}

/// Kilograms to the given unit, for display
pub fn from_kg(kg: f64, unit: WeightUnit) -> f64 {
    match unit {
        WeightUnit::Kilograms => kg,
        WeightUnit::Pounds => kg / KG_PER_LB,
    }
}
