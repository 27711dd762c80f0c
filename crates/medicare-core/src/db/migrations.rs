//! Sequential, re-runnable schema migrations.

use std::collections::HashMap;

use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::schema::*;
use super::{Database, DbError, DbResult};

/// One unit of schema change.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// SQL batch whose statements are all `IF NOT EXISTS` guarded.
    Sql(&'static str),
    /// `ALTER TABLE … ADD COLUMN`, skipped when the column already exists.
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

/// A numbered migration.
#[derive(Debug)]
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub steps: &'static [Step],
}

impl Migration {
    /// SHA-256 over the migration's steps, stored in the ledger to detect edits.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for step in self.steps {
            match step {
                Step::Sql(sql) => hasher.update(sql.as_bytes()),
                Step::AddColumn {
                    table,
                    column,
                    definition,
                } => hasher.update(format!("{}.{} {}", table, column, definition).as_bytes()),
            }
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "users_and_profiles",
        steps: &[Step::Sql(USERS_AND_PROFILES)],
    },
    Migration {
        version: 2,
        name: "clinics_and_doctors",
        steps: &[Step::Sql(CLINICS_AND_DOCTORS)],
    },
    Migration {
        version: 3,
        name: "appointments",
        steps: &[
            Step::Sql(APPOINTMENTS),
            Step::AddColumn {
                table: "doctor_slots",
                column: "appointment_id",
                definition: "TEXT REFERENCES appointments(id) ON DELETE SET NULL",
            },
            Step::Sql(SLOT_APPOINTMENT_LINK),
        ],
    },
    Migration {
        version: 4,
        name: "pharmacy",
        steps: &[Step::Sql(PHARMACY)],
    },
    Migration {
        version: 5,
        name: "laboratories",
        steps: &[Step::Sql(LABORATORIES)],
    },
    Migration {
        version: 6,
        name: "emergency_and_activity",
        steps: &[Step::Sql(EMERGENCY_AND_ACTIVITY)],
    },
    Migration {
        version: 7,
        name: "profile_and_slot_extensions",
        steps: &[
            Step::AddColumn {
                table: "users",
                column: "allergies",
                definition: "TEXT NOT NULL DEFAULT '[]'",
            },
            Step::AddColumn {
                table: "users",
                column: "profile_photo_url",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "users",
                column: "deletion_requested_at",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "users",
                column: "scheduled_deletion_date",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "doctor_slots",
                column: "is_blocked",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            Step::AddColumn {
                table: "doctor_slots",
                column: "block_reason",
                definition: "TEXT",
            },
            Step::Sql(PROFILE_EXTENSION_INDEXES),
        ],
    },
];

/// Outcome of a migrator run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    /// Versions applied by this run.
    pub applied: Vec<u32>,
    /// Versions that were already recorded in the ledger.
    pub already_applied: Vec<u32>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Applied/pending state of one migration.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    pub version: u32,
    pub name: &'static str,
    /// `None` while pending.
    pub applied_at: Option<String>,
}

/// Applies [`MIGRATIONS`] against a database.
pub struct Migrator<'a> {
    db: &'a Database,
}

impl<'a> Migrator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Apply every pending migration, each in its own transaction.
    pub fn run(&self) -> DbResult<MigrationReport> {
        self.db.conn().execute_batch(MIGRATION_LEDGER)?;
        let recorded = self.recorded_checksums()?;
        let mut report = MigrationReport::default();

        for migration in MIGRATIONS {
            let checksum = migration.checksum();
            if let Some(stored) = recorded.get(&migration.version) {
                if *stored != checksum {
                    return Err(DbError::Migration(format!(
                        "checksum mismatch for {:04}_{}: ledger has {}, code has {}",
                        migration.version, migration.name, stored, checksum
                    )));
                }
                report.already_applied.push(migration.version);
                continue;
            }

            let tx = self.db.begin()?;
            apply_steps(&tx, migration)?;
            tx.execute(
                "INSERT INTO schema_migrations (version, name, checksum) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, checksum],
            )?;
            tx.commit()?;

            info!(
                version = migration.version,
                name = migration.name,
                "applied migration"
            );
            report.applied.push(migration.version);
        }

        Ok(report)
    }

    /// Re-execute one migration's steps, ignoring the ledger.
    pub fn replay(&self, version: u32) -> DbResult<()> {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.version == version)
            .ok_or_else(|| DbError::NotFound(format!("migration {}", version)))?;

        let tx = self.db.begin()?;
        apply_steps(&tx, migration)?;
        tx.commit()?;
        debug!(version, "replayed migration");
        Ok(())
    }

    /// Status of every known migration.
    pub fn status(&self) -> DbResult<Vec<MigrationStatus>> {
        self.db.conn().execute_batch(MIGRATION_LEDGER)?;
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT version, applied_at FROM schema_migrations")?;
        let applied: HashMap<u32, String> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        Ok(MIGRATIONS
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                name: m.name,
                applied_at: applied.get(&m.version).cloned(),
            })
            .collect())
    }

    /// Highest version recorded in the ledger (0 for a fresh database).
    pub fn current_version(&self) -> DbResult<u32> {
        self.db.conn().execute_batch(MIGRATION_LEDGER)?;
        let version: Option<u32> = self.db.conn().query_row(
            "SELECT MAX(version) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version.unwrap_or(0))
    }

    fn recorded_checksums(&self) -> DbResult<HashMap<u32, String>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT version, checksum FROM schema_migrations")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut map = HashMap::new();
        for row in rows {
            let (version, checksum) = row?;
            map.insert(version, checksum);
        }
        Ok(map)
    }
}

fn apply_steps(conn: &Connection, migration: &Migration) -> DbResult<()> {
    for step in migration.steps {
        match step {
            Step::Sql(sql) => conn.execute_batch(sql)?,
            Step::AddColumn {
                table,
                column,
                definition,
            } => {
                if column_exists(conn, table, column)? {
                    debug!(table, column, "column already present");
                    continue;
                }
                conn.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    table, column, definition
                ))?;
            }
        }
    }
    Ok(())
}

/// Whether `table` has a column named `column`.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_snapshot(db: &Database) -> Vec<(String, String)> {
        db.conn()
            .prepare("SELECT name, COALESCE(sql, '') FROM sqlite_master ORDER BY name")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_versions_are_sequential() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
        }
    }

    #[test]
    fn test_second_run_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let report = Migrator::new(&db).run().unwrap();
        assert!(report.is_noop());
        assert_eq!(report.already_applied.len(), MIGRATIONS.len());
    }

    #[test]
    fn test_replay_every_migration_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let before = schema_snapshot(&db);

        let migrator = Migrator::new(&db);
        for migration in MIGRATIONS {
            migrator.replay(migration.version).unwrap();
        }

        assert_eq!(before, schema_snapshot(&db));
    }

    #[test]
    fn test_replay_unknown_version() {
        let db = Database::open_in_memory().unwrap();
        let result = Migrator::new(&db).replay(999);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("UPDATE schema_migrations SET checksum = 'tampered' WHERE version = 2", [])
            .unwrap();

        let result = Migrator::new(&db).run();
        assert!(matches!(result, Err(DbError::Migration(_))));
    }

    #[test]
    fn test_status_and_current_version() {
        let db = Database::open_in_memory().unwrap();
        let migrator = Migrator::new(&db);

        let status = migrator.status().unwrap();
        assert_eq!(status.len(), MIGRATIONS.len());
        assert!(status.iter().all(|s| s.applied_at.is_some()));
        assert_eq!(migrator.current_version().unwrap(), MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_added_columns_present() {
        let db = Database::open_in_memory().unwrap();
        assert!(column_exists(db.conn(), "doctor_slots", "appointment_id").unwrap());
        assert!(column_exists(db.conn(), "doctor_slots", "is_blocked").unwrap());
        assert!(column_exists(db.conn(), "users", "scheduled_deletion_date").unwrap());
        assert!(!column_exists(db.conn(), "users", "no_such_column").unwrap());
    }

    #[test]
    fn test_checksum_stable() {
        assert_eq!(MIGRATIONS[0].checksum(), MIGRATIONS[0].checksum());
        assert_ne!(MIGRATIONS[0].checksum(), MIGRATIONS[1].checksum());
    }
}
