//! Exercise library - built-in strength exercises

use serde::{Deserialize, Serialize};

/// Muscle groups an exercise targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MuscleGroup {
    Chest,
    Shoulders,
    Triceps,
    Back,
    Biceps,
    Core,
    Glutes,
    Quads,
    Hamstrings,
    Calves,
}

impl MuscleGroup {
    pub fn name(&self) -> &'static str {
        match self {
            MuscleGroup::Chest => "chest",
            MuscleGroup::Shoulders => "shoulders",
            MuscleGroup::Triceps => "triceps",
            MuscleGroup::Back => "back",
            MuscleGroup::Biceps => "biceps",
            MuscleGroup::Core => "core",
            MuscleGroup::Glutes => "glutes",
            MuscleGroup::Quads => "quads",
            MuscleGroup::Hamstrings => "hamstrings",
            MuscleGroup::Calves => "calves",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Category {
    Push,
    Pull,
    Legs,
    Core,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Push => "push",
            Category::Pull => "pull",
            Category::Legs => "legs",
            Category::Core => "core",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Equipment {
    Barbell,
    Dumbbell,
    Machine,
    Cable,
    Bodyweight,
}

impl Equipment {
    pub fn name(&self) -> &'static str {
        match self {
            Equipment::Barbell => "barbell",
            Equipment::Dumbbell => "dumbbell",
            Equipment::Machine => "machine",
            Equipment::Cable => "cable",
            Equipment::Bodyweight => "bodyweight",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Exercise {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub muscle_groups: &'static [MuscleGroup],
    pub equipment: Equipment,
}

pub const EXERCISES: &[Exercise] = &[
    // Legs
    Exercise {
        id: "back_squat",
        name: "Back Squat",
        category: Category::Legs,
        muscle_groups: &[MuscleGroup::Quads, MuscleGroup::Glutes, MuscleGroup::Core],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "front_squat",
        name: "Front Squat",
        category: Category::Legs,
        muscle_groups: &[MuscleGroup::Quads, MuscleGroup::Core],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "deadlift",
        name: "Deadlift",
        category: Category::Pull,
        muscle_groups: &[MuscleGroup::Hamstrings, MuscleGroup::Glutes, MuscleGroup::Back],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "romanian_deadlift",
        name: "Romanian Deadlift",
        category: Category::Legs,
        muscle_groups: &[MuscleGroup::Hamstrings, MuscleGroup::Glutes],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "leg_press",
        name: "Leg Press",
        category: Category::Legs,
        muscle_groups: &[MuscleGroup::Quads, MuscleGroup::Glutes],
        equipment: Equipment::Machine,
    },
    Exercise {
        id: "calf_raise",
        name: "Standing Calf Raise",
        category: Category::Legs,
        muscle_groups: &[MuscleGroup::Calves],
        equipment: Equipment::Machine,
    },
    // Push
    Exercise {
        id: "bench_press",
        name: "Bench Press",
        category: Category::Push,
        muscle_groups: &[MuscleGroup::Chest, MuscleGroup::Triceps, MuscleGroup::Shoulders],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "incline_db_press",
        name: "Incline Dumbbell Press",
        category: Category::Push,
        muscle_groups: &[MuscleGroup::Chest, MuscleGroup::Shoulders],
        equipment: Equipment::Dumbbell,
    },
    Exercise {
        id: "overhead_press",
        name: "Overhead Press",
        category: Category::Push,
        muscle_groups: &[MuscleGroup::Shoulders, MuscleGroup::Triceps, MuscleGroup::Core],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "dip",
        name: "Weighted Dip",
        category: Category::Push,
        muscle_groups: &[MuscleGroup::Chest, MuscleGroup::Triceps],
        equipment: Equipment::Bodyweight,
    },
    // Pull
    Exercise {
        id: "barbell_row",
        name: "Barbell Row",
        category: Category::Pull,
        muscle_groups: &[MuscleGroup::Back, MuscleGroup::Biceps],
        equipment: Equipment::Barbell,
    },
    Exercise {
        id: "pull_up",
        name: "Weighted Pull-up",
        category: Category::Pull,
        muscle_groups: &[MuscleGroup::Back, MuscleGroup::Biceps],
        equipment: Equipment::Bodyweight,
    },
    Exercise {
        id: "lat_pulldown",
        name: "Lat Pulldown",
        category: Category::Pull,
        muscle_groups: &[MuscleGroup::Back, MuscleGroup::Biceps],
        equipment: Equipment::Cable,
    },
    Exercise {
        id: "biceps_curl",
        name: "Dumbbell Curl",
        category: Category::Pull,
        muscle_groups: &[MuscleGroup::Biceps],
        equipment: Equipment::Dumbbell,
    },
    // Core
    Exercise {
        id: "cable_crunch",
        name: "Cable Crunch",
        category: Category::Core,
        muscle_groups: &[MuscleGroup::Core],
        equipment: Equipment::Cable,
    },
];

pub fn get_all_exercises() -> &'static [Exercise] {
    EXERCISES
}

pub fn find_exercise(id: &str) -> Option<&'static Exercise> {
    EXERCISES.iter().find(|e| e.id == id)
}

/// Find exercise by display name, case-insensitive
pub fn find_exercise_by_name(name: &str) -> Option<&'static Exercise> {
    EXERCISES.iter().find(|e| e.name.eq_ignore_ascii_case(name))
}

/// Look up by id first, then by display name
pub fn resolve_exercise(input: &str) -> Option<&'static Exercise> {
    find_exercise(input).or_else(|| find_exercise_by_name(input))
}

/// Display name for an exercise id, falling back to the id itself
pub fn display_name(id: &str) -> &str {
    find_exercise(id).map_or(id, |e| e.name)
}
