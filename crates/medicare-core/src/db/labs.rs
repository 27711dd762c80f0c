//! Laboratory, lab test catalogue and booking operations.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::activity::insert_notification;
use super::{Database, DbError, DbResult};
use crate::models::{
    generate_reference_id, now_timestamp, today, CollectionType, LabBooking, LabBookingRequest,
    LabBookingStatus, LabTest, Laboratory, Notification, DATE_FORMAT,
};

const LABORATORY_COLUMNS: &str = r#"
    id, user_id, name, license_number, accreditation, address, city, state, pincode,
    location_lat, location_lng, phone, owner_name, contact_person, emergency_contact,
    is_verified, is_active, rating, home_collection_available, home_collection_charges,
    operating_hours, specializations, total_tests_completed, created_at, updated_at
"#;

const LAB_TEST_COLUMNS: &str = r#"
    id, laboratory_id, name, category, description, price, result_time_hours,
    sample_type, preparation_required, home_collection_available, fasting_required,
    is_available
"#;

const LAB_BOOKING_COLUMNS: &str = r#"
    id, user_id, laboratory_id, test_id, total_amount, booking_date, collection_date,
    collection_time, collection_type, collection_address, status, result_pdf_url,
    completed_at, created_at, updated_at
"#;

impl Database {
    // ------------------------------------------------------------------------
    // Laboratories
    // ------------------------------------------------------------------------

    pub fn insert_laboratory(&self, lab: &Laboratory) -> DbResult<()> {
        let accreditation_json = serde_json::to_string(&lab.accreditation)?;
        let hours_json = serde_json::to_string(&lab.operating_hours)?;
        let specializations_json = serde_json::to_string(&lab.specializations)?;

        self.conn.execute(
            r#"
            INSERT INTO laboratories (
                id, user_id, name, license_number, accreditation, address, city, state,
                pincode, location_lat, location_lng, phone, owner_name, contact_person,
                emergency_contact, is_verified, is_active, rating, home_collection_available,
                home_collection_charges, operating_hours, specializations,
                total_tests_completed, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
            "#,
            params![
                lab.id,
                lab.user_id,
                lab.name,
                lab.license_number,
                accreditation_json,
                lab.address,
                lab.city,
                lab.state,
                lab.pincode,
                lab.location_lat,
                lab.location_lng,
                lab.phone,
                lab.owner_name,
                lab.contact_person,
                lab.emergency_contact,
                lab.is_verified,
                lab.is_active,
                lab.rating,
                lab.home_collection_available,
                lab.home_collection_charges,
                hours_json,
                specializations_json,
                lab.total_tests_completed,
                lab.created_at,
                lab.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_laboratory(&self, id: &str) -> DbResult<Option<Laboratory>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM laboratories WHERE id = ?", LABORATORY_COLUMNS),
                [id],
                read_laboratory_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    // ------------------------------------------------------------------------
    // Test catalogue
    // ------------------------------------------------------------------------

    pub fn insert_lab_test(&self, test: &mut LabTest) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO lab_tests (
                laboratory_id, name, category, description, price, result_time_hours,
                sample_type, preparation_required, home_collection_available,
                fasting_required, is_available
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                test.laboratory_id,
                test.name,
                test.category,
                test.description,
                test.price,
                test.result_time_hours,
                test.sample_type,
                test.preparation_required,
                test.home_collection_available,
                test.fasting_required,
                test.is_available,
            ],
        )?;
        test.id = self.conn.last_insert_rowid();
        Ok(test.id)
    }

    pub fn get_lab_test(&self, id: i64) -> DbResult<Option<LabTest>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM lab_tests WHERE id = ?", LAB_TEST_COLUMNS),
                [id],
                read_lab_test,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Available tests at active laboratories, cheapest first.
    pub fn list_available_lab_tests(&self, category: Option<&str>) -> DbResult<Vec<LabTest>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.laboratory_id, t.name, t.category, t.description, t.price,
                   t.result_time_hours, t.sample_type, t.preparation_required,
                   t.home_collection_available, t.fasting_required, t.is_available
            FROM lab_tests t
            JOIN laboratories l ON l.id = t.laboratory_id
            WHERE t.is_available = 1 AND l.is_active = 1
              AND (?1 IS NULL OR t.category = ?1)
            ORDER BY t.price, t.name
            "#,
        )?;

        let rows = stmt.query_map([category], read_lab_test)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ------------------------------------------------------------------------
    // Bookings
    // ------------------------------------------------------------------------

    /// Book a lab test.
    ///
    /// The total is the test price, plus the laboratory's home collection
    /// charge when the sample is collected at home. Home collection needs an
    /// address and a test and laboratory that offer it.
    pub fn book_lab_test(&self, request: &LabBookingRequest) -> DbResult<LabBooking> {
        let tx = self.begin()?;

        let (lab_id, price, test_home, test_available): (String, i64, bool, bool) = tx
            .query_row(
                "SELECT laboratory_id, price, home_collection_available, is_available FROM lab_tests WHERE id = ?",
                [request.test_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::NotFound(format!("lab test {}", request.test_id)))?;

        if !test_available {
            return Err(DbError::InvalidState(format!(
                "lab test {} is not available",
                request.test_id
            )));
        }

        let (lab_home, home_charges): (bool, i64) = tx.query_row(
            "SELECT home_collection_available, home_collection_charges FROM laboratories WHERE id = ?",
            [&lab_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let total_amount = match request.collection_type {
            CollectionType::Home => {
                if !(test_home && lab_home) {
                    return Err(DbError::InvalidState(format!(
                        "lab test {} has no home collection",
                        request.test_id
                    )));
                }
                if request.collection_address.as_deref().map_or(true, |a| a.trim().is_empty()) {
                    return Err(DbError::InvalidState(
                        "home collection needs an address".into(),
                    ));
                }
                price + home_charges
            }
            CollectionType::Lab => price,
        };

        let id = generate_reference_id("LAB");
        let now = now_timestamp();
        let booking_date = today().format(DATE_FORMAT).to_string();

        tx.execute(
            r#"
            INSERT INTO lab_bookings (
                id, user_id, laboratory_id, test_id, total_amount, booking_date,
                collection_date, collection_time, collection_type, collection_address,
                status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            "#,
            params![
                id,
                request.user_id,
                lab_id,
                request.test_id,
                total_amount,
                booking_date,
                request.collection_date,
                request.collection_time,
                request.collection_type.as_str(),
                request.collection_address,
                LabBookingStatus::Scheduled.as_str(),
                now,
            ],
        )?;

        tx.commit()?;
        info!(booking_id = %id, total_amount, "booked lab test");

        self.get_lab_booking(&id)?
            .ok_or_else(|| DbError::NotFound(format!("lab booking {}", id)))
    }

    pub fn get_lab_booking(&self, id: &str) -> DbResult<Option<LabBooking>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM lab_bookings WHERE id = ?", LAB_BOOKING_COLUMNS),
                [id],
                read_lab_booking_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    pub fn list_lab_bookings_for_user(&self, user_id: i64) -> DbResult<Vec<LabBooking>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM lab_bookings WHERE user_id = ? ORDER BY collection_date DESC, collection_time DESC",
            LAB_BOOKING_COLUMNS
        ))?;
        let rows = stmt.query_map([user_id], read_lab_booking_row)?;

        let mut bookings = Vec::new();
        for row in rows {
            bookings.push(row?.try_into()?);
        }
        Ok(bookings)
    }

    pub fn mark_sample_collected(&self, id: &str) -> DbResult<LabBooking> {
        let tx = self.begin()?;
        check_lab_transition(&tx, id, LabBookingStatus::SampleCollected)?;
        tx.execute(
            "UPDATE lab_bookings SET status = 'sample_collected', updated_at = datetime('now') WHERE id = ?",
            [id],
        )?;
        tx.commit()?;

        self.get_lab_booking(id)?
            .ok_or_else(|| DbError::NotFound(format!("lab booking {}", id)))
    }

    /// Attach the result report, stamp completion and credit the laboratory.
    pub fn complete_lab_booking(&self, id: &str, result_pdf_url: &str) -> DbResult<LabBooking> {
        let tx = self.begin()?;
        check_lab_transition(&tx, id, LabBookingStatus::Completed)?;

        tx.execute(
            r#"
            UPDATE lab_bookings SET
                status = 'completed',
                result_pdf_url = ?2,
                completed_at = datetime('now'),
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![id, result_pdf_url],
        )?;

        let (user_id, lab_id): (i64, String) = tx.query_row(
            "SELECT user_id, laboratory_id FROM lab_bookings WHERE id = ?",
            [id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        tx.execute(
            r#"
            UPDATE laboratories SET
                total_tests_completed = total_tests_completed + 1,
                updated_at = datetime('now')
            WHERE id = ?
            "#,
            [&lab_id],
        )?;

        let notification = Notification::new(
            user_id,
            "Lab report ready",
            format!("Your report for booking #{} is ready", id),
            "lab_test",
        )
        .about("lab_booking", id);
        insert_notification(&tx, &notification)?;

        tx.commit()?;
        info!(booking_id = id, laboratory_id = %lab_id, "completed lab booking");

        self.get_lab_booking(id)?
            .ok_or_else(|| DbError::NotFound(format!("lab booking {}", id)))
    }

    /// Cancel a booking whose sample has not been collected yet.
    pub fn cancel_lab_booking(&self, id: &str) -> DbResult<LabBooking> {
        let tx = self.begin()?;
        check_lab_transition(&tx, id, LabBookingStatus::Cancelled)?;
        tx.execute(
            "UPDATE lab_bookings SET status = 'cancelled', updated_at = datetime('now') WHERE id = ?",
            [id],
        )?;
        tx.commit()?;

        self.get_lab_booking(id)?
            .ok_or_else(|| DbError::NotFound(format!("lab booking {}", id)))
    }
}

fn check_lab_transition(conn: &Connection, id: &str, next: LabBookingStatus) -> DbResult<()> {
    let status: String = conn
        .query_row("SELECT status FROM lab_bookings WHERE id = ?", [id], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("lab booking {}", id)))?;
    let current = LabBookingStatus::parse(&status)
        .ok_or_else(|| DbError::InvalidState(format!("unknown lab booking status '{}'", status)))?;

    if !current.can_transition_to(next) {
        return Err(DbError::InvalidTransition {
            entity: "lab_booking",
            from: current.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }
    Ok(())
}

fn read_lab_test(row: &Row<'_>) -> rusqlite::Result<LabTest> {
    Ok(LabTest {
        id: row.get(0)?,
        laboratory_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        description: row.get(4)?,
        price: row.get(5)?,
        result_time_hours: row.get(6)?,
        sample_type: row.get(7)?,
        preparation_required: row.get(8)?,
        home_collection_available: row.get(9)?,
        fasting_required: row.get(10)?,
        is_available: row.get(11)?,
    })
}

/// Intermediate row struct for database mapping.
struct LaboratoryRow {
    id: String,
    user_id: Option<i64>,
    name: String,
    license_number: Option<String>,
    accreditation: String,
    address: String,
    city: Option<String>,
    state: Option<String>,
    pincode: Option<String>,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    phone: Option<String>,
    owner_name: String,
    contact_person: Option<String>,
    emergency_contact: Option<String>,
    is_verified: bool,
    is_active: bool,
    rating: f64,
    home_collection_available: bool,
    home_collection_charges: i64,
    operating_hours: String,
    specializations: String,
    total_tests_completed: i64,
    created_at: String,
    updated_at: String,
}

fn read_laboratory_row(row: &Row<'_>) -> rusqlite::Result<LaboratoryRow> {
    Ok(LaboratoryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        license_number: row.get(3)?,
        accreditation: row.get(4)?,
        address: row.get(5)?,
        city: row.get(6)?,
        state: row.get(7)?,
        pincode: row.get(8)?,
        location_lat: row.get(9)?,
        location_lng: row.get(10)?,
        phone: row.get(11)?,
        owner_name: row.get(12)?,
        contact_person: row.get(13)?,
        emergency_contact: row.get(14)?,
        is_verified: row.get(15)?,
        is_active: row.get(16)?,
        rating: row.get(17)?,
        home_collection_available: row.get(18)?,
        home_collection_charges: row.get(19)?,
        operating_hours: row.get(20)?,
        specializations: row.get(21)?,
        total_tests_completed: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

impl TryFrom<LaboratoryRow> for Laboratory {
    type Error = DbError;

    fn try_from(row: LaboratoryRow) -> Result<Self, Self::Error> {
        Ok(Laboratory {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            license_number: row.license_number,
            accreditation: serde_json::from_str(&row.accreditation)?,
            address: row.address,
            city: row.city,
            state: row.state,
            pincode: row.pincode,
            location_lat: row.location_lat,
            location_lng: row.location_lng,
            phone: row.phone,
            owner_name: row.owner_name,
            contact_person: row.contact_person,
            emergency_contact: row.emergency_contact,
            is_verified: row.is_verified,
            is_active: row.is_active,
            rating: row.rating,
            home_collection_available: row.home_collection_available,
            home_collection_charges: row.home_collection_charges,
            operating_hours: serde_json::from_str(&row.operating_hours)?,
            specializations: serde_json::from_str(&row.specializations)?,
            total_tests_completed: row.total_tests_completed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct LabBookingRow {
    id: String,
    user_id: i64,
    laboratory_id: String,
    test_id: i64,
    total_amount: i64,
    booking_date: String,
    collection_date: String,
    collection_time: String,
    collection_type: String,
    collection_address: Option<String>,
    status: String,
    result_pdf_url: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_lab_booking_row(row: &Row<'_>) -> rusqlite::Result<LabBookingRow> {
    Ok(LabBookingRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        laboratory_id: row.get(2)?,
        test_id: row.get(3)?,
        total_amount: row.get(4)?,
        booking_date: row.get(5)?,
        collection_date: row.get(6)?,
        collection_time: row.get(7)?,
        collection_type: row.get(8)?,
        collection_address: row.get(9)?,
        status: row.get(10)?,
        result_pdf_url: row.get(11)?,
        completed_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl TryFrom<LabBookingRow> for LabBooking {
    type Error = DbError;

    fn try_from(row: LabBookingRow) -> Result<Self, Self::Error> {
        let collection_type = CollectionType::parse(&row.collection_type).ok_or_else(|| {
            DbError::InvalidState(format!("unknown collection type '{}'", row.collection_type))
        })?;
        let status = LabBookingStatus::parse(&row.status).ok_or_else(|| {
            DbError::InvalidState(format!("unknown lab booking status '{}'", row.status))
        })?;

        Ok(LabBooking {
            id: row.id,
            user_id: row.user_id,
            laboratory_id: row.laboratory_id,
            test_id: row.test_id,
            total_amount: row.total_amount,
            booking_date: row.booking_date,
            collection_date: row.collection_date,
            collection_time: row.collection_time,
            collection_type,
            collection_address: row.collection_address,
            status,
            result_pdf_url: row.result_pdf_url,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConstraintKind;
    use crate::models::User;

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();

        let mut user = User::new("+919876543210");
        db.insert_user(&mut user).unwrap();

        let mut lab = Laboratory::new("LAB001", "HealthFirst Diagnostics", "Andheri West", "Dr. Kapoor");
        lab.accreditation = vec!["NABL".into()];
        db.insert_laboratory(&lab).unwrap();

        let mut cbc = LabTest::new("LAB001", "Complete Blood Count (CBC)", 300, 6);
        cbc.category = Some("blood_test".into());
        db.insert_lab_test(&mut cbc).unwrap();

        (db, user.id, cbc.id)
    }

    fn request(user_id: i64, test_id: i64, collection_type: CollectionType) -> LabBookingRequest {
        LabBookingRequest {
            user_id,
            test_id,
            collection_date: "2025-03-01".into(),
            collection_time: "08:00".into(),
            collection_type,
            collection_address: Some("12 MG Road, Mumbai".into()),
        }
    }

    #[test]
    fn test_laboratory_roundtrip() {
        let (db, _, _) = setup();
        let lab = db.get_laboratory("LAB001").unwrap().unwrap();
        assert_eq!(lab.accreditation, vec!["NABL".to_string()]);
        assert_eq!(lab.home_collection_charges, 50);
    }

    #[test]
    fn test_home_collection_adds_charge() {
        let (db, user_id, test_id) = setup();

        let home = db.book_lab_test(&request(user_id, test_id, CollectionType::Home)).unwrap();
        assert!(home.id.starts_with("LAB"));
        assert_eq!(home.total_amount, 350);
        assert_eq!(home.status, LabBookingStatus::Scheduled);

        let at_lab = db.book_lab_test(&request(user_id, test_id, CollectionType::Lab)).unwrap();
        assert_eq!(at_lab.total_amount, 300);
        assert_eq!(db.list_lab_bookings_for_user(user_id).unwrap().len(), 2);
    }

    #[test]
    fn test_home_collection_needs_address() {
        let (db, user_id, test_id) = setup();
        let mut req = request(user_id, test_id, CollectionType::Home);
        req.collection_address = None;
        assert!(matches!(db.book_lab_test(&req), Err(DbError::InvalidState(_))));

        assert!(matches!(
            db.book_lab_test(&request(user_id, 999, CollectionType::Lab)),
            Err(DbError::NotFound(_))
        ));
    }

    #[test]
    fn test_booking_lifecycle() {
        let (db, user_id, test_id) = setup();
        let booking = db.book_lab_test(&request(user_id, test_id, CollectionType::Home)).unwrap();

        assert!(matches!(
            db.complete_lab_booking(&booking.id, "/api/uploads/report/1/cbc.pdf"),
            Err(DbError::InvalidTransition { entity: "lab_booking", .. })
        ));

        db.mark_sample_collected(&booking.id).unwrap();
        assert!(db.cancel_lab_booking(&booking.id).is_err());

        let done = db
            .complete_lab_booking(&booking.id, "/api/uploads/report/1/cbc.pdf")
            .unwrap();
        assert_eq!(done.status, LabBookingStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.result_pdf_url.as_deref(), Some("/api/uploads/report/1/cbc.pdf"));

        let lab = db.get_laboratory("LAB001").unwrap().unwrap();
        assert_eq!(lab.total_tests_completed, 1);
        assert_eq!(db.unread_notification_count(user_id).unwrap(), 1);
    }

    #[test]
    fn test_cancel_before_collection() {
        let (db, user_id, test_id) = setup();
        let booking = db.book_lab_test(&request(user_id, test_id, CollectionType::Lab)).unwrap();
        let cancelled = db.cancel_lab_booking(&booking.id).unwrap();
        assert_eq!(cancelled.status, LabBookingStatus::Cancelled);
    }

    #[test]
    fn test_catalogue_filters() {
        let (db, _, _) = setup();
        let mut urine = LabTest::new("LAB001", "Urine Routine", 150, 4);
        urine.category = Some("urine_test".into());
        db.insert_lab_test(&mut urine).unwrap();
        let mut retired = LabTest::new("LAB001", "Retired Panel", 100, 4);
        retired.is_available = false;
        db.insert_lab_test(&mut retired).unwrap();

        let all = db.list_available_lab_tests(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Urine Routine");

        let blood = db.list_available_lab_tests(Some("blood_test")).unwrap();
        assert_eq!(blood.len(), 1);
        assert_eq!(db.get_lab_test(urine.id).unwrap().unwrap().price, 150);
    }

    #[test]
    fn test_booked_test_cannot_be_deleted() {
        let (db, user_id, test_id) = setup();
        db.book_lab_test(&request(user_id, test_id, CollectionType::Lab)).unwrap();

        let err: DbError = db
            .conn()
            .execute("DELETE FROM lab_tests WHERE id = ?", [test_id])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
    }

    #[test]
    fn test_result_time_must_be_positive() {
        let (db, _, _) = setup();
        let mut bad = LabTest::new("LAB001", "Instant", 100, 0);
        let err = db.insert_lab_test(&mut bad).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));
    }
}
