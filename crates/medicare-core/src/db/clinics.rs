//! Clinic, doctor and slot operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::activity::insert_notification;
use super::{Database, DbError, DbResult};
use crate::models::{
    BoundingBox, Clinic, Doctor, DoctorSlot, LeaveSummary, Notification, SlotSchedule, DATE_FORMAT,
};

const CLINIC_COLUMNS: &str = r#"
    id, name, address, location_lat, location_lng, phone, email, working_hours,
    emergency_available, ambulance_available, insurance_accepted, rating,
    total_reviews, created_at
"#;

const DOCTOR_COLUMNS: &str = r#"
    d.id, d.user_id, d.clinic_id, d.name, d.specialties, d.qualification,
    d.experience_years, d.registration_number, d.consultation_fee, d.rating,
    d.total_consultations, d.is_available, d.is_verified, d.created_at, d.updated_at
"#;

const SLOT_COLUMNS: &str = r#"
    id, doctor_id, date, start_time, end_time, is_booked, is_blocked,
    block_reason, appointment_id
"#;

impl Database {
    // ------------------------------------------------------------------------
    // Clinics
    // ------------------------------------------------------------------------

    pub fn insert_clinic(&self, clinic: &Clinic) -> DbResult<()> {
        let working_hours_json = serde_json::to_string(&clinic.working_hours)?;
        let insurance_json = serde_json::to_string(&clinic.insurance_accepted)?;

        self.conn.execute(
            r#"
            INSERT INTO clinics (
                id, name, address, location_lat, location_lng, phone, email, working_hours,
                emergency_available, ambulance_available, insurance_accepted, rating,
                total_reviews, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                clinic.id,
                clinic.name,
                clinic.address,
                clinic.location_lat,
                clinic.location_lng,
                clinic.phone,
                clinic.email,
                working_hours_json,
                clinic.emergency_available,
                clinic.ambulance_available,
                insurance_json,
                clinic.rating,
                clinic.total_reviews,
                clinic.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_clinic(&self, id: &str) -> DbResult<Option<Clinic>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM clinics WHERE id = ?", CLINIC_COLUMNS),
                [id],
                read_clinic_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Emergency-capable clinics inside `bbox`, best rated first.
    pub fn list_emergency_clinics_in(&self, bbox: &BoundingBox) -> DbResult<Vec<Clinic>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM clinics
            WHERE location_lat BETWEEN ?1 AND ?2
              AND location_lng BETWEEN ?3 AND ?4
              AND emergency_available = 1
            ORDER BY rating DESC, id
            "#,
            CLINIC_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![bbox.min_lat, bbox.max_lat, bbox.min_lng, bbox.max_lng],
            read_clinic_row,
        )?;

        let mut clinics = Vec::new();
        for row in rows {
            clinics.push(row?.try_into()?);
        }
        Ok(clinics)
    }

    // ------------------------------------------------------------------------
    // Doctors
    // ------------------------------------------------------------------------

    /// Insert a doctor. Specialties are indexed by trigger.
    pub fn insert_doctor(&self, doctor: &mut Doctor) -> DbResult<i64> {
        let specialties_json = serde_json::to_string(&doctor.specialties)?;

        self.conn.execute(
            r#"
            INSERT INTO doctors (
                user_id, clinic_id, name, specialties, qualification, experience_years,
                registration_number, consultation_fee, rating, total_consultations,
                is_available, is_verified, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                doctor.user_id,
                doctor.clinic_id,
                doctor.name,
                specialties_json,
                doctor.qualification,
                doctor.experience_years,
                doctor.registration_number,
                doctor.consultation_fee,
                doctor.rating,
                doctor.total_consultations,
                doctor.is_available,
                doctor.is_verified,
                doctor.created_at,
                doctor.updated_at,
            ],
        )?;
        doctor.id = self.conn.last_insert_rowid();
        Ok(doctor.id)
    }

    pub fn get_doctor(&self, id: i64) -> DbResult<Option<Doctor>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM doctors d WHERE d.id = ?", DOCTOR_COLUMNS),
                [id],
                read_doctor_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Update a doctor's editable fields. Counters are left alone.
    pub fn update_doctor(&self, doctor: &Doctor) -> DbResult<bool> {
        let specialties_json = serde_json::to_string(&doctor.specialties)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE doctors SET
                clinic_id = ?2,
                name = ?3,
                specialties = ?4,
                qualification = ?5,
                experience_years = ?6,
                registration_number = ?7,
                consultation_fee = ?8,
                is_available = ?9,
                is_verified = ?10,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                doctor.id,
                doctor.clinic_id,
                doctor.name,
                specialties_json,
                doctor.qualification,
                doctor.experience_years,
                doctor.registration_number,
                doctor.consultation_fee,
                doctor.is_available,
                doctor.is_verified,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Available doctors with `specialty`, matched case-insensitively.
    pub fn find_doctors_by_specialty(&self, specialty: &str) -> DbResult<Vec<Doctor>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM doctors d
            JOIN doctor_specialties s ON s.doctor_id = d.id
            WHERE s.specialty = lower(trim(?1))
              AND d.is_available = 1
            ORDER BY d.rating DESC, d.name
            "#,
            DOCTOR_COLUMNS
        ))?;

        let rows = stmt.query_map([specialty], read_doctor_row)?;

        let mut doctors = Vec::new();
        for row in rows {
            doctors.push(row?.try_into()?);
        }
        Ok(doctors)
    }

    pub fn list_doctors_for_clinic(&self, clinic_id: &str) -> DbResult<Vec<Doctor>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM doctors d WHERE d.clinic_id = ? ORDER BY d.name",
            DOCTOR_COLUMNS
        ))?;

        let rows = stmt.query_map([clinic_id], read_doctor_row)?;

        let mut doctors = Vec::new();
        for row in rows {
            doctors.push(row?.try_into()?);
        }
        Ok(doctors)
    }

    // ------------------------------------------------------------------------
    // Slots
    // ------------------------------------------------------------------------

    /// Insert a slot. A duplicate (doctor, date, start_time) is a unique violation.
    pub fn insert_slot(&self, slot: &mut DoctorSlot) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO doctor_slots (doctor_id, date, start_time, end_time, is_booked, is_blocked, block_reason)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                slot.doctor_id,
                slot.date,
                slot.start_time,
                slot.end_time,
                slot.is_booked,
                slot.is_blocked,
                slot.block_reason,
            ],
        )?;
        slot.id = self.conn.last_insert_rowid();
        Ok(slot.id)
    }

    pub fn get_slot(&self, id: i64) -> DbResult<Option<DoctorSlot>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM doctor_slots WHERE id = ?", SLOT_COLUMNS),
                [id],
                read_slot,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Unbooked, unblocked slots for a doctor on `date`, in time order.
    pub fn list_open_slots(&self, doctor_id: i64, date: &str) -> DbResult<Vec<DoctorSlot>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM doctor_slots
            WHERE doctor_id = ?1 AND date = ?2 AND is_booked = 0 AND is_blocked = 0
            ORDER BY start_time
            "#,
            SLOT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![doctor_id, date], read_slot)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Hold a slot back from booking. Booked slots cannot be blocked.
    pub fn block_slot(&self, slot_id: i64, reason: Option<&str>) -> DbResult<()> {
        let slot = self
            .get_slot(slot_id)?
            .ok_or_else(|| DbError::NotFound(format!("slot {}", slot_id)))?;
        if slot.is_booked {
            return Err(DbError::InvalidState(format!(
                "slot {} is booked and cannot be blocked",
                slot_id
            )));
        }

        self.conn.execute(
            "UPDATE doctor_slots SET is_blocked = 1, block_reason = ?2 WHERE id = ?1",
            params![slot_id, reason],
        )?;
        Ok(())
    }

    pub fn unblock_slot(&self, slot_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE doctor_slots SET is_blocked = 0, block_reason = NULL WHERE id = ?1 AND is_blocked = 1",
            [slot_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Generate slots from a weekly timetable in one transaction.
    ///
    /// Slots that already exist for the same (date, start_time) are skipped.
    /// Returns the number of slots created.
    pub fn create_slots_batch(&self, doctor_id: i64, schedule: &SlotSchedule) -> DbResult<usize> {
        if schedule.end_date < schedule.start_date {
            return Err(DbError::InvalidState(format!(
                "schedule ends {} before it starts {}",
                schedule.end_date, schedule.start_date
            )));
        }

        let tx = self.begin()?;
        ensure_doctor_exists(&tx, doctor_id)?;

        let mut created = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO doctor_slots (doctor_id, date, start_time, end_time)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (doctor_id, date, start_time) DO NOTHING
                "#,
            )?;
            for date in schedule.working_dates() {
                let date = date.format(DATE_FORMAT).to_string();
                for (start, end) in &schedule.times {
                    created += stmt.execute(params![doctor_id, date, start, end])?;
                }
            }
        }

        tx.commit()?;
        info!(doctor_id, created, "created slot batch");
        Ok(created)
    }

    /// Put a doctor on leave from `start` to `end` inclusive.
    ///
    /// Every open slot in the range is blocked, the doctor is marked
    /// unavailable and patients with confirmed appointments in the range are
    /// notified. Booked slots are left alone.
    pub fn apply_doctor_leave(
        &self,
        doctor_id: i64,
        start: NaiveDate,
        end: NaiveDate,
        reason: &str,
    ) -> DbResult<LeaveSummary> {
        if end < start {
            return Err(DbError::InvalidState(format!(
                "leave ends {} before it starts {}",
                end, start
            )));
        }
        let from = start.format(DATE_FORMAT).to_string();
        let until = end.format(DATE_FORMAT).to_string();

        let tx = self.begin()?;
        let name = ensure_doctor_exists(&tx, doctor_id)?;

        let affected: Vec<(String, i64, String)> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id, user_id, date FROM appointments
                WHERE doctor_id = ?1 AND date >= ?2 AND date <= ?3 AND status = 'confirmed'
                ORDER BY date, time
                "#,
            )?;
            let rows = stmt.query_map(params![doctor_id, from, until], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for (appointment_id, user_id, date) in &affected {
            let notification = Notification::new(
                *user_id,
                "Doctor leave notice",
                format!(
                    "{} is on leave from {} to {}. Your appointment on {} may be affected; please reschedule.",
                    name, from, until, date
                ),
                "appointment",
            )
            .about("appointment", appointment_id.as_str());
            insert_notification(&tx, &notification)?;
        }

        let slots_blocked = tx.execute(
            r#"
            UPDATE doctor_slots SET is_blocked = 1, block_reason = ?4
            WHERE doctor_id = ?1 AND date >= ?2 AND date <= ?3
              AND is_booked = 0 AND is_blocked = 0
            "#,
            params![doctor_id, from, until, format!("Leave: {}", reason)],
        )?;

        tx.execute(
            "UPDATE doctors SET is_available = 0, updated_at = datetime('now') WHERE id = ?",
            [doctor_id],
        )?;

        tx.commit()?;
        info!(doctor_id, slots_blocked, patients = affected.len(), "applied doctor leave");

        Ok(LeaveSummary {
            slots_blocked,
            patients_notified: affected.len(),
        })
    }
}

fn ensure_doctor_exists(conn: &rusqlite::Connection, doctor_id: i64) -> DbResult<String> {
    conn.query_row("SELECT name FROM doctors WHERE id = ?", [doctor_id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("doctor {}", doctor_id)))
}

struct ClinicRow {
    id: String,
    name: String,
    address: String,
    location_lat: f64,
    location_lng: f64,
    phone: Option<String>,
    email: Option<String>,
    working_hours: String,
    emergency_available: bool,
    ambulance_available: bool,
    insurance_accepted: String,
    rating: f64,
    total_reviews: i64,
    created_at: String,
}

fn read_clinic_row(row: &Row<'_>) -> rusqlite::Result<ClinicRow> {
    Ok(ClinicRow {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        location_lat: row.get(3)?,
        location_lng: row.get(4)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        working_hours: row.get(7)?,
        emergency_available: row.get(8)?,
        ambulance_available: row.get(9)?,
        insurance_accepted: row.get(10)?,
        rating: row.get(11)?,
        total_reviews: row.get(12)?,
        created_at: row.get(13)?,
    })
}

impl TryFrom<ClinicRow> for Clinic {
    type Error = DbError;

    fn try_from(row: ClinicRow) -> Result<Self, Self::Error> {
        Ok(Clinic {
            id: row.id,
            name: row.name,
            address: row.address,
            location_lat: row.location_lat,
            location_lng: row.location_lng,
            phone: row.phone,
            email: row.email,
            working_hours: serde_json::from_str(&row.working_hours)?,
            emergency_available: row.emergency_available,
            ambulance_available: row.ambulance_available,
            insurance_accepted: serde_json::from_str(&row.insurance_accepted)?,
            rating: row.rating,
            total_reviews: row.total_reviews,
            created_at: row.created_at,
        })
    }
}

struct DoctorRow {
    id: i64,
    user_id: Option<i64>,
    clinic_id: Option<String>,
    name: String,
    specialties: String,
    qualification: Option<String>,
    experience_years: i64,
    registration_number: Option<String>,
    consultation_fee: i64,
    rating: f64,
    total_consultations: i64,
    is_available: bool,
    is_verified: bool,
    created_at: String,
    updated_at: String,
}

fn read_doctor_row(row: &Row<'_>) -> rusqlite::Result<DoctorRow> {
    Ok(DoctorRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        clinic_id: row.get(2)?,
        name: row.get(3)?,
        specialties: row.get(4)?,
        qualification: row.get(5)?,
        experience_years: row.get(6)?,
        registration_number: row.get(7)?,
        consultation_fee: row.get(8)?,
        rating: row.get(9)?,
        total_consultations: row.get(10)?,
        is_available: row.get(11)?,
        is_verified: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl TryFrom<DoctorRow> for Doctor {
    type Error = DbError;

    fn try_from(row: DoctorRow) -> Result<Self, Self::Error> {
        Ok(Doctor {
            id: row.id,
            user_id: row.user_id,
            clinic_id: row.clinic_id,
            name: row.name,
            specialties: serde_json::from_str(&row.specialties)?,
            qualification: row.qualification,
            experience_years: row.experience_years,
            registration_number: row.registration_number,
            consultation_fee: row.consultation_fee,
            rating: row.rating,
            total_consultations: row.total_consultations,
            is_available: row.is_available,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn read_slot(row: &Row<'_>) -> rusqlite::Result<DoctorSlot> {
    Ok(DoctorSlot {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        date: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        is_booked: row.get(5)?,
        is_blocked: row.get(6)?,
        block_reason: row.get(7)?,
        appointment_id: row.get(8)?,
    })
}
