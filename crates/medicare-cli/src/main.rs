//! `medicare-db`: migration and maintenance commands for the MediCare database.

mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use medicare_core::models::today;
use medicare_core::{Database, Migrator, Seeder};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "medicare-db")]
#[command(about = "MediCare database maintenance", long_about = None)]
struct Cli {
    /// Settings file (toml, yaml or json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the settings file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate,

    /// Show every migration and when it was applied
    Status,

    /// Load demo users, clinics, doctors, slots, a laboratory and a pharmacy
    Seed {
        /// Delete all existing rows first
        #[arg(long)]
        reset: bool,
    },

    /// Hard-delete accounts whose scheduled deletion date has passed
    PurgeDeletions {
        /// Cutoff date (YYYY-MM-DD), defaults to today
        #[arg(long, value_parser = parse_date)]
        as_of: Option<NaiveDate>,
    },
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

/// Cutoff for purging; defaults to the current UTC date the core stamps with.
fn purge_cutoff(as_of: Option<NaiveDate>) -> NaiveDate {
    as_of.unwrap_or_else(today)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref())
        .context("failed to load settings")?
        .with_database(cli.database);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| settings.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = &settings.database_path;
    info!(database = %path.display(), "using database");

    match cli.command {
        Commands::Migrate => {
            let db = Database::open_unmigrated(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let report = Migrator::new(&db).run().context("migration failed")?;

            if report.is_noop() {
                println!("Database is up to date");
            } else {
                for version in &report.applied {
                    println!("Applied {:04}", version);
                }
            }
        }
        Commands::Status => {
            let db = Database::open_unmigrated(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let status = Migrator::new(&db).status().context("failed to read migration ledger")?;

            for migration in status {
                println!(
                    "{:04}  {:<32} {}",
                    migration.version,
                    migration.name,
                    migration.applied_at.as_deref().unwrap_or("pending")
                );
            }
        }
        Commands::Seed { reset } => {
            let db = Database::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let seeder = Seeder::new(&db);

            if reset {
                seeder.clear_all().context("failed to clear existing data")?;
                println!("Cleared existing data");
            }

            let summary = seeder
                .seed_demo(today())
                .context("seeding failed; run with --reset if demo data already exists")?;

            println!("Seeded:");
            println!("  users         {}", summary.users);
            println!("  clinics       {}", summary.clinics);
            println!("  doctors       {}", summary.doctors);
            println!("  slots         {}", summary.slots);
            println!("  laboratories  {}", summary.laboratories);
            println!("  lab tests     {}", summary.lab_tests);
            println!("  pharmacies    {}", summary.pharmacies);
            println!("  medicines     {}", summary.medicines);
        }
        Commands::PurgeDeletions { as_of } => {
            let as_of = purge_cutoff(as_of);
            let db = Database::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let purged = db
                .purge_scheduled_deletions(as_of)
                .context("failed to purge scheduled deletions")?;

            println!("Purged {} account(s) scheduled on or before {}", purged.len(), as_of);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2025-03-01"), Ok(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()));
        assert!(parse_date("01/03/2025").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "medicare-db",
            "purge-deletions",
            "--as-of",
            "2025-03-01",
            "--database",
            "/tmp/m.db",
        ])
        .unwrap();

        assert_eq!(cli.database, Some(PathBuf::from("/tmp/m.db")));
        match cli.command {
            Commands::PurgeDeletions { as_of } => {
                assert_eq!(as_of, NaiveDate::from_ymd_opt(2025, 3, 1));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_purge_cutoff_defaults_to_utc_today() {
        let explicit = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(purge_cutoff(Some(explicit)), explicit);

        let before = today();
        let cutoff = purge_cutoff(None);
        assert!(cutoff == before || cutoff == today());
    }

    #[test]
    fn test_seed_reset_flag() {
        let cli = Cli::try_parse_from(["medicare-db", "seed", "--reset"]).unwrap();
        assert!(matches!(cli.command, Commands::Seed { reset: true }));
    }
}
