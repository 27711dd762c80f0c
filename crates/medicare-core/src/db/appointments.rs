//! Appointment booking and prescription operations.

use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use super::activity::{insert_audit, insert_notification};
use super::{Database, DbError, DbResult};
use crate::models::{
    generate_reference_id, now_timestamp, Appointment, AppointmentStatus, AuditEntry,
    BookingRequest, ConsultationType, Notification, Prescription,
};

const APPOINTMENT_COLUMNS: &str = r#"
    id, user_id, doctor_id, slot_id, date, time, reason, symptoms, is_emergency,
    consultation_type, status, consultation_fee, notes, cancellation_reason,
    cancelled_at, created_at, updated_at
"#;

impl Database {
    /// Book an open slot.
    ///
    /// The slot must belong to the requested doctor and be neither booked nor
    /// blocked. The appointment is created `confirmed` with the doctor's
    /// current fee, and the slot is marked booked and linked to it, all in one
    /// transaction.
    pub fn book_appointment(&self, request: &BookingRequest) -> DbResult<Appointment> {
        let tx = self.begin()?;

        let slot: Option<(i64, String, String, bool, bool)> = tx
            .query_row(
                "SELECT doctor_id, date, start_time, is_booked, is_blocked FROM doctor_slots WHERE id = ?",
                [request.slot_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        let (slot_doctor, date, time, is_booked, is_blocked) =
            slot.ok_or_else(|| DbError::NotFound(format!("slot {}", request.slot_id)))?;

        if slot_doctor != request.doctor_id {
            return Err(DbError::InvalidState(format!(
                "slot {} belongs to doctor {}, not {}",
                request.slot_id, slot_doctor, request.doctor_id
            )));
        }
        if is_booked {
            return Err(DbError::InvalidState(format!(
                "slot {} is already booked",
                request.slot_id
            )));
        }
        if is_blocked {
            return Err(DbError::InvalidState(format!(
                "slot {} is blocked",
                request.slot_id
            )));
        }

        let fee: i64 = tx
            .query_row(
                "SELECT consultation_fee FROM doctors WHERE id = ?",
                [request.doctor_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("doctor {}", request.doctor_id)))?;

        let id = generate_reference_id("APT");
        let now = now_timestamp();
        let symptoms_json = serde_json::to_string(&request.symptoms)?;

        tx.execute(
            r#"
            INSERT INTO appointments (
                id, user_id, doctor_id, slot_id, date, time, reason, symptoms,
                is_emergency, consultation_type, status, consultation_fee,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
            params![
                id,
                request.user_id,
                request.doctor_id,
                request.slot_id,
                date,
                time,
                request.reason,
                symptoms_json,
                request.is_emergency,
                request.consultation_type.as_str(),
                AppointmentStatus::Confirmed.as_str(),
                fee,
                now,
            ],
        )?;

        tx.execute(
            "UPDATE doctor_slots SET is_booked = 1, appointment_id = ?1 WHERE id = ?2",
            params![id, request.slot_id],
        )?;

        tx.commit()?;
        info!(appointment_id = %id, slot_id = request.slot_id, "booked appointment");

        self.get_appointment(&id)?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))
    }

    pub fn get_appointment(&self, id: &str) -> DbResult<Option<Appointment>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM appointments WHERE id = ?", APPOINTMENT_COLUMNS),
                [id],
                read_appointment_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Move an appointment to `next`. Cancelling goes through
    /// [`Database::cancel_appointment`] semantics and frees the slot.
    pub fn update_appointment_status(
        &self,
        id: &str,
        next: AppointmentStatus,
    ) -> DbResult<Appointment> {
        self.transition_appointment(id, next, None)
    }

    /// Cancel an appointment and release its slot.
    pub fn cancel_appointment(&self, id: &str, reason: Option<&str>) -> DbResult<Appointment> {
        self.transition_appointment(id, AppointmentStatus::Cancelled, reason)
    }

    fn transition_appointment(
        &self,
        id: &str,
        next: AppointmentStatus,
        reason: Option<&str>,
    ) -> DbResult<Appointment> {
        let tx = self.begin()?;

        let (current, doctor_id): (String, i64) = tx
            .query_row(
                "SELECT status, doctor_id FROM appointments WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))?;
        let current = AppointmentStatus::parse(&current)
            .ok_or_else(|| DbError::InvalidState(format!("unknown appointment status '{}'", current)))?;

        if !current.can_transition_to(next) {
            return Err(DbError::InvalidTransition {
                entity: "appointment",
                from: current.as_str().to_string(),
                to: next.as_str().to_string(),
            });
        }

        match next {
            AppointmentStatus::Cancelled => {
                tx.execute(
                    r#"
                    UPDATE appointments SET
                        status = 'cancelled',
                        cancellation_reason = ?2,
                        cancelled_at = datetime('now'),
                        updated_at = datetime('now')
                    WHERE id = ?1
                    "#,
                    params![id, reason],
                )?;
                tx.execute(
                    "UPDATE doctor_slots SET is_booked = 0, appointment_id = NULL WHERE appointment_id = ?",
                    [id],
                )?;
            }
            _ => {
                tx.execute(
                    "UPDATE appointments SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
                    params![id, next.as_str()],
                )?;
                if next == AppointmentStatus::Completed {
                    tx.execute(
                        "UPDATE doctors SET total_consultations = total_consultations + 1, updated_at = datetime('now') WHERE id = ?",
                        [doctor_id],
                    )?;
                }
            }
        }

        tx.commit()?;
        debug!(appointment_id = id, from = current.as_str(), to = next.as_str(), "appointment transition");

        self.get_appointment(id)?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))
    }

    /// Move a live appointment to another open slot of the same doctor.
    ///
    /// The old slot is released, the new one booked and linked, and the
    /// appointment takes the new slot's date and start time. The patient is
    /// notified and the change is audited in the same transaction.
    pub fn reschedule_appointment(&self, id: &str, new_slot_id: i64) -> DbResult<Appointment> {
        let tx = self.begin()?;

        let (user_id, doctor_id, status, old_date, old_time): (i64, i64, String, String, String) = tx
            .query_row(
                "SELECT user_id, doctor_id, status, date, time FROM appointments WHERE id = ?",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))?;
        let status = AppointmentStatus::parse(&status)
            .ok_or_else(|| DbError::InvalidState(format!("unknown appointment status '{}'", status)))?;
        if status.is_terminal() {
            return Err(DbError::InvalidState(format!(
                "cannot reschedule a {} appointment",
                status.as_str()
            )));
        }

        let (slot_doctor, date, time, is_booked, is_blocked): (i64, String, String, bool, bool) = tx
            .query_row(
                "SELECT doctor_id, date, start_time, is_booked, is_blocked FROM doctor_slots WHERE id = ?",
                [new_slot_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("slot {}", new_slot_id)))?;

        if slot_doctor != doctor_id {
            return Err(DbError::InvalidState(format!(
                "slot {} belongs to doctor {}, not {}",
                new_slot_id, slot_doctor, doctor_id
            )));
        }
        if is_booked {
            return Err(DbError::InvalidState(format!("slot {} is already booked", new_slot_id)));
        }
        if is_blocked {
            return Err(DbError::InvalidState(format!("slot {} is blocked", new_slot_id)));
        }

        // Release first: appointment_id is unique across slots
        tx.execute(
            "UPDATE doctor_slots SET is_booked = 0, appointment_id = NULL WHERE appointment_id = ?",
            [id],
        )?;
        tx.execute(
            "UPDATE doctor_slots SET is_booked = 1, appointment_id = ?1 WHERE id = ?2",
            params![id, new_slot_id],
        )?;
        tx.execute(
            r#"
            UPDATE appointments SET slot_id = ?2, date = ?3, time = ?4, updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, new_slot_id, date, time],
        )?;

        let notification = Notification::new(
            user_id,
            "Appointment rescheduled",
            format!("Your appointment has been rescheduled to {} at {}", date, time),
            "appointment",
        )
        .about("appointment", id);
        insert_notification(&tx, &notification)?;

        let audit = AuditEntry::new(Some(user_id), "appointment_rescheduled")
            .on("appointment", id)
            .with_details(serde_json::json!({
                "old_date": old_date,
                "old_time": old_time,
                "new_date": date,
                "new_time": time,
                "new_slot_id": new_slot_id,
            }));
        insert_audit(&tx, &audit)?;

        tx.commit()?;
        info!(appointment_id = id, new_slot_id, "rescheduled appointment");

        self.get_appointment(id)?
            .ok_or_else(|| DbError::NotFound(format!("appointment {}", id)))
    }

    /// Appointments for a user, most recent first.
    pub fn list_appointments_for_user(
        &self,
        user_id: i64,
        status: Option<AppointmentStatus>,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM appointments
            WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
            ORDER BY date DESC, time DESC
            "#,
            APPOINTMENT_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![user_id, status.map(|s| s.as_str())],
            read_appointment_row,
        )?;

        let mut appointments = Vec::new();
        for row in rows {
            appointments.push(row?.try_into()?);
        }
        Ok(appointments)
    }

    // ------------------------------------------------------------------------
    // Prescriptions
    // ------------------------------------------------------------------------

    /// Insert a prescription. A second one for the same appointment is a
    /// unique violation.
    pub fn insert_prescription(&self, prescription: &mut Prescription) -> DbResult<i64> {
        let medicines_json = serde_json::to_string(&prescription.medicines)?;

        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                user_id, appointment_id, doctor_id, medicines, diagnosis, instructions,
                issue_date, valid_until, follow_up_required, image_url, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                prescription.user_id,
                prescription.appointment_id,
                prescription.doctor_id,
                medicines_json,
                prescription.diagnosis,
                prescription.instructions,
                prescription.issue_date,
                prescription.valid_until,
                prescription.follow_up_required,
                prescription.image_url,
                prescription.created_at,
            ],
        )?;
        prescription.id = self.conn.last_insert_rowid();
        Ok(prescription.id)
    }

    pub fn get_prescription(&self, id: i64) -> DbResult<Option<Prescription>> {
        self.query_prescription("id = ?", rusqlite::types::Value::Integer(id))
    }

    pub fn get_prescription_for_appointment(&self, appointment_id: &str) -> DbResult<Option<Prescription>> {
        self.query_prescription(
            "appointment_id = ?",
            rusqlite::types::Value::Text(appointment_id.to_string()),
        )
    }

    pub fn list_prescriptions_for_user(&self, user_id: i64) -> DbResult<Vec<Prescription>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, appointment_id, doctor_id, medicines, diagnosis, instructions,
                   issue_date, valid_until, follow_up_required, image_url, created_at
            FROM prescriptions
            WHERE user_id = ?
            ORDER BY issue_date DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map([user_id], read_prescription_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    fn query_prescription(
        &self,
        predicate: &str,
        key: rusqlite::types::Value,
    ) -> DbResult<Option<Prescription>> {
        self.conn
            .query_row(
                &format!(
                    r#"
                    SELECT id, user_id, appointment_id, doctor_id, medicines, diagnosis, instructions,
                           issue_date, valid_until, follow_up_required, image_url, created_at
                    FROM prescriptions
                    WHERE {}
                    "#,
                    predicate
                ),
                [key],
                read_prescription_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct AppointmentRow {
    id: String,
    user_id: i64,
    doctor_id: i64,
    slot_id: Option<i64>,
    date: String,
    time: String,
    reason: Option<String>,
    symptoms: String,
    is_emergency: bool,
    consultation_type: String,
    status: String,
    consultation_fee: i64,
    notes: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_appointment_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        doctor_id: row.get(2)?,
        slot_id: row.get(3)?,
        date: row.get(4)?,
        time: row.get(5)?,
        reason: row.get(6)?,
        symptoms: row.get(7)?,
        is_emergency: row.get(8)?,
        consultation_type: row.get(9)?,
        status: row.get(10)?,
        consultation_fee: row.get(11)?,
        notes: row.get(12)?,
        cancellation_reason: row.get(13)?,
        cancelled_at: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let status = AppointmentStatus::parse(&row.status).ok_or_else(|| {
            DbError::InvalidState(format!("unknown appointment status '{}'", row.status))
        })?;
        let consultation_type = ConsultationType::parse(&row.consultation_type).ok_or_else(|| {
            DbError::InvalidState(format!("unknown consultation type '{}'", row.consultation_type))
        })?;

        Ok(Appointment {
            id: row.id,
            user_id: row.user_id,
            doctor_id: row.doctor_id,
            slot_id: row.slot_id,
            date: row.date,
            time: row.time,
            reason: row.reason,
            symptoms: serde_json::from_str(&row.symptoms)?,
            is_emergency: row.is_emergency,
            consultation_type,
            status,
            consultation_fee: row.consultation_fee,
            notes: row.notes,
            cancellation_reason: row.cancellation_reason,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct PrescriptionRow {
    id: i64,
    user_id: i64,
    appointment_id: Option<String>,
    doctor_id: Option<i64>,
    medicines: String,
    diagnosis: Option<String>,
    instructions: Option<String>,
    issue_date: String,
    valid_until: Option<String>,
    follow_up_required: bool,
    image_url: Option<String>,
    created_at: String,
}

fn read_prescription_row(row: &Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        appointment_id: row.get(2)?,
        doctor_id: row.get(3)?,
        medicines: row.get(4)?,
        diagnosis: row.get(5)?,
        instructions: row.get(6)?,
        issue_date: row.get(7)?,
        valid_until: row.get(8)?,
        follow_up_required: row.get(9)?,
        image_url: row.get(10)?,
        created_at: row.get(11)?,
    })
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        Ok(Prescription {
            id: row.id,
            user_id: row.user_id,
            appointment_id: row.appointment_id,
            doctor_id: row.doctor_id,
            medicines: serde_json::from_str(&row.medicines)?,
            diagnosis: row.diagnosis,
            instructions: row.instructions,
            issue_date: row.issue_date,
            valid_until: row.valid_until,
            follow_up_required: row.follow_up_required,
            image_url: row.image_url,
            created_at: row.created_at,
        })
    }
}
