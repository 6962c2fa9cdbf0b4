//! prtrack - Personal record tracking for personal-training clients

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use prtrack::db::{Database, NewSession, NewSet};
use prtrack::exercises::{display_name, get_all_exercises, resolve_exercise};
use prtrack::records::{Metric, PersonalRecord, PrEngine, RecordStore, SetEntry, validate_set};
use prtrack::units::{WeightUnit, from_kg, normalize};

const DB_PATH: &str = "prtrack.db";

#[derive(Parser)]
#[command(name = "prtrack")]
#[command(author, version, about = "Personal record tracking for training clients")]
struct Cli {
    /// SQLite database file
    #[arg(long, env = "PRTRACK_DB", default_value = DB_PATH, global = true)]
    db: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a workout session for a client
    Session {
        client: String,

        /// Session date (defaults to today)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// List a client's sessions
    Sessions { client: String },

    /// Log a completed set and check it for new records
    Log {
        client: String,

        session: i64,

        /// Exercise id (see `exercises`)
        exercise: String,

        weight: f64,

        reps: u32,

        /// Set number within the session (defaults to next)
        #[arg(short, long)]
        set: Option<u32>,

        /// Unit the weight was entered in
        #[arg(short, long, default_value = "kg")]
        unit: WeightUnit,
    },

    /// Show a client's personal records
    Records {
        client: String,

        #[arg(short, long)]
        exercise: Option<String>,

        /// Unit to display weights in
        #[arg(short, long, default_value = "kg")]
        unit: WeightUnit,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild a client's records from the full workout history
    Recalc { client: String },

    /// Clear a claim on a client left behind by an interrupted log or recalc
    Unlock { client: String },

    /// List the exercise library
    Exercises,
}

fn format_record(record: &PersonalRecord, unit: WeightUnit) -> String {
    let weight = from_kg(record.weight, unit);
    let value = match record.metric {
        Metric::MaxWeight => format!("{:.1} {} x {}", weight, unit.suffix(), record.reps),
        Metric::MaxVolume => format!(
            "{:.1} {} x {} = {:.0} {}",
            weight,
            unit.suffix(),
            record.reps,
            from_kg(record.total_volume.unwrap_or(record.weight * record.reps as f64), unit),
            unit.suffix()
        ),
    };
    format!(
        "{} | {:24} | {:10} | {}",
        record.date.format("%Y-%m-%d"),
        display_name(&record.exercise_id),
        record.metric.label(),
        value
    )
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let db = Database::open(&cli.db)?;

    match cli.command {
        Commands::Session { client, date, notes } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let id = db.add_session(&NewSession {
                client_id: client.clone(),
                date: Some(date),
                notes,
            })?;
            println!("Session {} for {} on {}", id, client, date);
        }

        Commands::Sessions { client } => {
            for session in db.list_sessions(&client)? {
                println!(
                    "{:6} | {} | {}",
                    session.id,
                    session.date.map_or_else(|| "undated".to_string(), |d| d.to_string()),
                    session.notes.as_deref().unwrap_or("-")
                );
            }
        }

        Commands::Log { client, session, exercise, weight, reps, set, unit } => {
            let exercise_id = match resolve_exercise(&exercise) {
                Some(ex) => ex.id.to_string(),
                None => {
                    warn!("{} is not in the exercise library, logging it anyway", exercise);
                    exercise
                }
            };

            let weight_kg = normalize(weight, unit);
            validate_set(&exercise_id, weight_kg, reps, set)?;
            let Some(session_date) = db.get_session(session)?.and_then(|s| s.date) else {
                bail!("session {} not found or has no date", session);
            };

            let engine = PrEngine::new(db);
            // held across the insert and the check so a recalculation cannot run between them
            let _claim = engine.share_client(&client)?;

            let logged = engine.store().add_set(&NewSet {
                client_id: client.clone(),
                session_id: session,
                exercise_id,
                weight: weight_kg,
                reps,
                set_number: set,
            })?;
            println!(
                "Logged: {} - set {} {} {} x {} (id: {})",
                display_name(&logged.exercise_id),
                logged.set_number,
                weight,
                unit.suffix(),
                reps,
                logged.id
            );

            let outcome = engine.check_and_record_prs(
                &client,
                &SetEntry {
                    exercise_id: logged.exercise_id,
                    weight: logged.weight,
                    reps: logged.reps,
                    set_number: logged.set_number,
                    date: session_date,
                    session_id: Some(session),
                },
            )?;
            if outcome.is_empty() {
                println!("No new records");
            }
            for record in &outcome.new_records {
                println!("New personal record! {}", format_record(record, unit));
            }
        }

        Commands::Records { client, exercise, unit, json } => {
            let records = db.fetch_records(&client, exercise.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No personal records for {}", client);
            } else {
                println!("Personal records of {}:", client);
                println!("{:-<72}", "");
                for record in &records {
                    println!("{}", format_record(record, unit));
                }
            }
        }

        Commands::Recalc { client } => {
            let engine = PrEngine::new(db);
            let report = engine.recalculate_all_records(&client)?;

            println!("Recalculated {} record(s) for {}", report.records.len(), client);
            if report.skipped_sets > 0 {
                println!("Skipped {} set(s) from sessions without a date", report.skipped_sets);
            }
            if !report.is_complete() {
                for failure in &report.failures {
                    println!(
                        "Failed: {} {} - {}",
                        display_name(&failure.exercise_id),
                        failure.metric.label(),
                        failure.error
                    );
                }
                bail!("{} record write(s) failed, run recalc again", report.failures.len());
            }
        }

        Commands::Unlock { client } => {
            if db.release_all_claims(&client)? {
                println!("Released claim on {}", client);
            } else {
                println!("{} was not claimed", client);
            }
        }

        Commands::Exercises => {
            println!("{:20} | {:24} | {:5} | {:10} | Muscles", "Id", "Name", "Type", "Equipment");
            println!("{:-<84}", "");
            for ex in get_all_exercises() {
                let muscles: Vec<&str> = ex.muscle_groups.iter().map(|m| m.name()).collect();
                println!(
                    "{:20} | {:24} | {:5} | {:10} | {}",
                    ex.id,
                    ex.name,
                    ex.category.name(),
                    ex.equipment.name(),
                    muscles.join(", ")
                );
            }
        }
    }

    Ok(())
}
