//! Database layer for MediCare.

mod schema;
mod migrations;
mod users;
mod clinics;
mod appointments;
mod pharmacy;
mod orders;
mod labs;
mod emergency;
mod activity;
mod files;

pub use schema::*;
pub use migrations::*;
#[allow(unused_imports)]
pub use users::*;
#[allow(unused_imports)]
pub use clinics::*;
#[allow(unused_imports)]
pub use pharmacy::*;
#[allow(unused_imports)]
pub use orders::*;
pub(crate) use pharmacy::insert_medicine_with_opening_stock;

use rusqlite::{ffi, Connection, ErrorCode};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Kind of integrity constraint reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    PrimaryKey,
    ForeignKey,
    NotNull,
    Check,
    /// Raised by a schema trigger (append-only tables).
    Trigger,
    Other,
}

impl ConstraintKind {
    fn from_extended_code(code: i32) -> Self {
        match code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => ConstraintKind::Unique,
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => ConstraintKind::PrimaryKey,
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => ConstraintKind::ForeignKey,
            ffi::SQLITE_CONSTRAINT_NOTNULL => ConstraintKind::NotNull,
            ffi::SQLITE_CONSTRAINT_CHECK => ConstraintKind::Check,
            ffi::SQLITE_CONSTRAINT_TRIGGER => ConstraintKind::Trigger,
            _ => ConstraintKind::Other,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Unique => "unique",
            ConstraintKind::PrimaryKey => "primary key",
            ConstraintKind::ForeignKey => "foreign key",
            ConstraintKind::NotNull => "not null",
            ConstraintKind::Check => "check",
            ConstraintKind::Trigger => "trigger",
            ConstraintKind::Other => "constraint",
        };
        f.write_str(s)
    }
}

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("{kind} violation: {message}")]
    Constraint {
        kind: ConstraintKind,
        message: String,
    },

    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient stock for medicine {medicine_id}: available {available}, requested {requested}")]
    InsufficientStock {
        medicine_id: i64,
        available: i64,
        requested: i64,
    },

    #[error("Migration error: {0}")]
    Migration(String),
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, msg) = &e {
            if err.code == ErrorCode::ConstraintViolation {
                return DbError::Constraint {
                    kind: ConstraintKind::from_extended_code(err.extended_code),
                    message: msg.clone().unwrap_or_else(|| err.to_string()),
                };
            }
        }
        DbError::Sqlite(e)
    }
}

impl DbError {
    /// The constraint kind, if this error is an integrity violation.
    pub fn constraint_kind(&self) -> Option<ConstraintKind> {
        match self {
            DbError::Constraint { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating it and applying pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open without running migrations. Foreign keys are still enforced.
    pub fn open_unmigrated<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(Self { conn })
    }

    /// Enable foreign keys and bring the schema up to date.
    fn initialize(&self) -> DbResult<()> {
        // Must run outside a transaction or SQLite ignores it.
        self.conn.execute_batch(CONNECTION_PRAGMAS)?;
        Migrator::new(self).run()?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a transaction.
    pub fn transaction(&mut self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Begin a transaction through a shared reference.
    ///
    /// Nested calls fail, so operations that open one never call each other.
    pub(crate) fn begin(&self) -> DbResult<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_schema_initialized() {
        let db = Database::open_in_memory().unwrap();

        let tables: Vec<String> = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for expected in [
            "users",
            "family_members",
            "addresses",
            "notification_preferences",
            "clinics",
            "doctors",
            "doctor_specialties",
            "doctor_slots",
            "appointments",
            "prescriptions",
            "uploaded_files",
            "pharmacies",
            "medicines",
            "stock_entries",
            "orders",
            "order_items",
            "laboratories",
            "lab_tests",
            "lab_bookings",
            "emergency_requests",
            "notifications",
            "audit_logs",
            "schema_migrations",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
        }
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let enabled: i64 = db
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[test]
    fn test_constraint_classification() {
        let db = Database::open_in_memory().unwrap();
        db.conn()
            .execute("INSERT INTO users (phone) VALUES ('+910000000001')", [])
            .unwrap();

        let err: DbError = db
            .conn()
            .execute("INSERT INTO users (phone) VALUES ('+910000000001')", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));

        let err: DbError = db
            .conn()
            .execute("INSERT INTO family_members (user_id, name, relation) VALUES (999, 'A', 'son')", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));

        let err: DbError = db
            .conn()
            .execute("INSERT INTO users (phone) VALUES (NULL)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::NotNull));
    }
}
