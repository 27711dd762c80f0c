//! Emergency request operations.

use rusqlite::{params, OptionalExtension, Row};
use tracing::{info, warn};

use super::{Database, DbError, DbResult};
use crate::models::{EmergencyRequest, EmergencyStatus, EmergencyType};

const EMERGENCY_COLUMNS: &str = r#"
    id, user_id, emergency_type, description, location, location_lat, location_lng,
    contact_number, status, assigned_clinic_id, ambulance_eta, created_at, updated_at,
    completed_at
"#;

impl Database {
    /// Record a new request. It always starts `requested` with no clinic
    /// assigned; dispatch goes through [`Database::assign_emergency`].
    pub fn create_emergency_request(&self, request: &EmergencyRequest) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO emergency_requests (
                id, user_id, emergency_type, description, location, location_lat,
                location_lng, contact_number, status, assigned_clinic_id, ambulance_eta,
                created_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, ?10, ?11, NULL)
            "#,
            params![
                request.id,
                request.user_id,
                request.emergency_type.as_str(),
                request.description,
                request.location,
                request.location_lat,
                request.location_lng,
                request.contact_number,
                EmergencyStatus::Requested.as_str(),
                request.created_at,
                request.updated_at,
            ],
        )?;
        warn!(
            request_id = %request.id,
            emergency_type = request.emergency_type.as_str(),
            "emergency requested"
        );
        Ok(())
    }

    pub fn get_emergency_request(&self, id: &str) -> DbResult<Option<EmergencyRequest>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM emergency_requests WHERE id = ?", EMERGENCY_COLUMNS),
                [id],
                read_emergency_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Requests still in progress, oldest first.
    pub fn list_active_emergencies(&self) -> DbResult<Vec<EmergencyRequest>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM emergency_requests
            WHERE status IN ('requested', 'dispatched', 'arrived')
            ORDER BY created_at, id
            "#,
            EMERGENCY_COLUMNS
        ))?;
        let rows = stmt.query_map([], read_emergency_row)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?.try_into()?);
        }
        Ok(requests)
    }

    /// Assign a clinic and ETA, moving the request to `dispatched`.
    pub fn assign_emergency(&self, id: &str, clinic_id: &str, eta_minutes: i64) -> DbResult<EmergencyRequest> {
        let tx = self.begin()?;
        let current = current_emergency_status(&tx, id)?;
        ensure_transition(current, EmergencyStatus::Dispatched)?;

        let has_ambulance: bool = tx
            .query_row(
                "SELECT ambulance_available FROM clinics WHERE id = ?",
                [clinic_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("clinic {}", clinic_id)))?;
        if !has_ambulance {
            return Err(DbError::InvalidState(format!(
                "clinic {} has no ambulance service",
                clinic_id
            )));
        }

        tx.execute(
            r#"
            UPDATE emergency_requests SET
                status = 'dispatched',
                assigned_clinic_id = ?2,
                ambulance_eta = ?3,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, clinic_id, eta_minutes],
        )?;
        tx.commit()?;
        info!(request_id = id, clinic_id, eta_minutes, "dispatched emergency");

        self.get_emergency_request(id)?
            .ok_or_else(|| DbError::NotFound(format!("emergency request {}", id)))
    }

    /// Move a request along its lifecycle. Completion is timestamped.
    pub fn update_emergency_status(&self, id: &str, next: EmergencyStatus) -> DbResult<EmergencyRequest> {
        let tx = self.begin()?;
        let current = current_emergency_status(&tx, id)?;
        ensure_transition(current, next)?;

        if next == EmergencyStatus::Dispatched {
            return Err(DbError::InvalidState(
                "dispatch needs a clinic; use assign_emergency".into(),
            ));
        }

        tx.execute(
            r#"
            UPDATE emergency_requests SET
                status = ?2,
                completed_at = CASE WHEN ?2 = 'completed' THEN datetime('now') ELSE completed_at END,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, next.as_str()],
        )?;
        tx.commit()?;

        self.get_emergency_request(id)?
            .ok_or_else(|| DbError::NotFound(format!("emergency request {}", id)))
    }

    pub fn cancel_emergency(&self, id: &str) -> DbResult<EmergencyRequest> {
        self.update_emergency_status(id, EmergencyStatus::Cancelled)
    }
}

fn current_emergency_status(conn: &rusqlite::Connection, id: &str) -> DbResult<EmergencyStatus> {
    let status: String = conn
        .query_row(
            "SELECT status FROM emergency_requests WHERE id = ?",
            [id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("emergency request {}", id)))?;
    EmergencyStatus::parse(&status)
        .ok_or_else(|| DbError::InvalidState(format!("unknown emergency status '{}'", status)))
}

fn ensure_transition(current: EmergencyStatus, next: EmergencyStatus) -> DbResult<()> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(DbError::InvalidTransition {
            entity: "emergency_request",
            from: current.as_str().to_string(),
            to: next.as_str().to_string(),
        })
    }
}

struct EmergencyRow {
    id: String,
    user_id: i64,
    emergency_type: String,
    description: Option<String>,
    location: String,
    location_lat: f64,
    location_lng: f64,
    contact_number: String,
    status: String,
    assigned_clinic_id: Option<String>,
    ambulance_eta: Option<i64>,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

fn read_emergency_row(row: &Row<'_>) -> rusqlite::Result<EmergencyRow> {
    Ok(EmergencyRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        emergency_type: row.get(2)?,
        description: row.get(3)?,
        location: row.get(4)?,
        location_lat: row.get(5)?,
        location_lng: row.get(6)?,
        contact_number: row.get(7)?,
        status: row.get(8)?,
        assigned_clinic_id: row.get(9)?,
        ambulance_eta: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

impl TryFrom<EmergencyRow> for EmergencyRequest {
    type Error = DbError;

    fn try_from(row: EmergencyRow) -> Result<Self, Self::Error> {
        Ok(EmergencyRequest {
            emergency_type: EmergencyType::parse(&row.emergency_type).ok_or_else(|| {
                DbError::InvalidState(format!("unknown emergency type '{}'", row.emergency_type))
            })?,
            status: EmergencyStatus::parse(&row.status).ok_or_else(|| {
                DbError::InvalidState(format!("unknown emergency status '{}'", row.status))
            })?,
            id: row.id,
            user_id: row.user_id,
            description: row.description,
            location: row.location,
            location_lat: row.location_lat,
            location_lng: row.location_lng,
            contact_number: row.contact_number,
            assigned_clinic_id: row.assigned_clinic_id,
            ambulance_eta: row.ambulance_eta,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Clinic, User};

    fn setup() -> (Database, EmergencyRequest) {
        let db = Database::open_in_memory().unwrap();

        let mut user = User::new("+919876543210");
        db.insert_user(&mut user).unwrap();

        let mut clinic = Clinic::new("CLI001", "Apollo Clinic", "Bandra West", 19.0596, 72.8295);
        clinic.emergency_available = true;
        clinic.ambulance_available = true;
        db.insert_clinic(&clinic).unwrap();
        db.insert_clinic(&Clinic::new("CLI002", "Corner Clinic", "Dadar", 19.01, 72.84))
            .unwrap();

        let request = EmergencyRequest::new(
            user.id,
            EmergencyType::Ambulance,
            "Linking Road, Bandra",
            19.06,
            72.83,
            "+919876543210",
        );
        db.create_emergency_request(&request).unwrap();
        (db, request)
    }

    #[test]
    fn test_full_lifecycle() {
        let (db, request) = setup();
        assert_eq!(db.list_active_emergencies().unwrap().len(), 1);

        let dispatched = db.assign_emergency(&request.id, "CLI001", 12).unwrap();
        assert_eq!(dispatched.status, EmergencyStatus::Dispatched);
        assert_eq!(dispatched.assigned_clinic_id.as_deref(), Some("CLI001"));
        assert_eq!(dispatched.ambulance_eta, Some(12));

        db.update_emergency_status(&request.id, EmergencyStatus::Arrived).unwrap();
        let done = db
            .update_emergency_status(&request.id, EmergencyStatus::Completed)
            .unwrap();
        assert!(done.completed_at.is_some());
        assert!(db.list_active_emergencies().unwrap().is_empty());
    }

    #[test]
    fn test_new_request_starts_requested() {
        let (db, _) = setup();
        let user = db.get_user_by_phone("+919876543210").unwrap().unwrap();

        let mut prefilled = EmergencyRequest::new(user.id, EmergencyType::Doctor, "Western Express Highway", 19.1, 72.85, "+919876543210");
        prefilled.status = EmergencyStatus::Completed;
        prefilled.assigned_clinic_id = Some("CLI002".into());
        prefilled.ambulance_eta = Some(3);
        prefilled.completed_at = Some("2025-03-01 10:00:00".into());
        db.create_emergency_request(&prefilled).unwrap();

        let stored = db.get_emergency_request(&prefilled.id).unwrap().unwrap();
        assert_eq!(stored.status, EmergencyStatus::Requested);
        assert_eq!(stored.assigned_clinic_id, None);
        assert_eq!(stored.ambulance_eta, None);
        assert_eq!(stored.completed_at, None);
        assert_eq!(db.list_active_emergencies().unwrap().len(), 2);
    }

    #[test]
    fn test_dispatch_requires_ambulance_clinic() {
        let (db, request) = setup();
        assert!(matches!(
            db.assign_emergency(&request.id, "CLI002", 10),
            Err(DbError::InvalidState(_))
        ));
        assert!(matches!(
            db.assign_emergency(&request.id, "CLI999", 10),
            Err(DbError::NotFound(_))
        ));
        assert!(matches!(
            db.update_emergency_status(&request.id, EmergencyStatus::Dispatched),
            Err(DbError::InvalidState(_))
        ));
    }

    #[test]
    fn test_no_skipping_or_late_cancel() {
        let (db, request) = setup();
        assert!(matches!(
            db.update_emergency_status(&request.id, EmergencyStatus::Completed),
            Err(DbError::InvalidTransition { entity: "emergency_request", .. })
        ));

        db.assign_emergency(&request.id, "CLI001", 8).unwrap();
        db.update_emergency_status(&request.id, EmergencyStatus::Arrived).unwrap();
        assert!(db.cancel_emergency(&request.id).is_err());
    }

    #[test]
    fn test_cancel_requested() {
        let (db, request) = setup();
        let cancelled = db.cancel_emergency(&request.id).unwrap();
        assert_eq!(cancelled.status, EmergencyStatus::Cancelled);
        assert!(cancelled.completed_at.is_none());
    }

    #[test]
    fn test_clinic_removal_keeps_request() {
        let (db, request) = setup();
        db.assign_emergency(&request.id, "CLI001", 12).unwrap();
        db.conn()
            .execute("DELETE FROM clinics WHERE id = 'CLI001'", [])
            .unwrap();

        let fetched = db.get_emergency_request(&request.id).unwrap().unwrap();
        assert_eq!(fetched.assigned_clinic_id, None);
        assert_eq!(fetched.status, EmergencyStatus::Dispatched);
    }
}
