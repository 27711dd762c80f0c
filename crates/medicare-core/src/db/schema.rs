//! SQLite schema, one constant per migration step.
//!
//! Every statement is guarded (`IF NOT EXISTS`, `INSERT OR IGNORE`) so a step
//! can be executed again without error. Column additions to existing tables
//! live in [`super::migrations`] because SQLite has no `ADD COLUMN IF NOT
//! EXISTS`.

/// Per-connection settings. Not persisted by SQLite, so applied on every open.
pub const CONNECTION_PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
"#;

/// Ledger of applied migrations.
pub const MIGRATION_LEDGER: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    checksum TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

// ============================================================================
// 0001 Users and profiles
// ============================================================================

pub const USERS_AND_PROFILES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    phone TEXT NOT NULL UNIQUE,
    email TEXT UNIQUE,
    full_name TEXT,
    role TEXT NOT NULL DEFAULT 'patient'
        CHECK (role IN ('patient', 'doctor', 'pharmacy', 'lab', 'admin')),
    is_active INTEGER NOT NULL DEFAULT 1,
    is_verified INTEGER NOT NULL DEFAULT 0,
    date_of_birth TEXT,
    gender TEXT,
    blood_group TEXT,
    city TEXT,
    state TEXT,
    pincode TEXT,
    location_lat REAL,
    location_lng REAL,
    insurance_provider TEXT,
    insurance_number TEXT,
    otp_hash TEXT,                               -- SHA-256 hex of the pending OTP
    otp_expires_at TEXT,
    last_login TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);
CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
CREATE INDEX IF NOT EXISTS idx_users_location ON users(location_lat, location_lng);

CREATE TABLE IF NOT EXISTS family_members (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    relation TEXT NOT NULL,
    age INTEGER CHECK (age IS NULL OR age >= 0),
    gender TEXT,
    blood_group TEXT,
    phone TEXT,
    allergies TEXT NOT NULL DEFAULT '[]',        -- JSON array of strings
    medical_notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_family_members_user ON family_members(user_id);

CREATE TABLE IF NOT EXISTS addresses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    label TEXT NOT NULL,
    address_line1 TEXT NOT NULL,
    address_line2 TEXT,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    pincode TEXT NOT NULL,
    location_lat REAL,
    location_lng REAL,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_addresses_user ON addresses(user_id);
-- At most one default address per user
CREATE UNIQUE INDEX IF NOT EXISTS idx_addresses_one_default
    ON addresses(user_id) WHERE is_default = 1;

CREATE TABLE IF NOT EXISTS notification_preferences (
    user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    sms_enabled INTEGER NOT NULL DEFAULT 1,
    email_enabled INTEGER NOT NULL DEFAULT 1,
    push_enabled INTEGER NOT NULL DEFAULT 1,
    appointment_reminders INTEGER NOT NULL DEFAULT 1,
    lab_test_reminders INTEGER NOT NULL DEFAULT 1,
    order_updates INTEGER NOT NULL DEFAULT 1,
    promotional INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

// ============================================================================
// 0002 Clinics and doctors
// ============================================================================

pub const CLINICS_AND_DOCTORS: &str = r#"
CREATE TABLE IF NOT EXISTS clinics (
    id TEXT PRIMARY KEY,                         -- CLI001 format
    name TEXT NOT NULL,
    address TEXT NOT NULL,
    location_lat REAL NOT NULL,
    location_lng REAL NOT NULL,
    phone TEXT,
    email TEXT,
    working_hours TEXT NOT NULL DEFAULT '{}',     -- JSON object {day: "09:00-18:00"}
    emergency_available INTEGER NOT NULL DEFAULT 0,
    ambulance_available INTEGER NOT NULL DEFAULT 0,
    insurance_accepted TEXT NOT NULL DEFAULT '[]',-- JSON array of strings
    rating REAL NOT NULL DEFAULT 0.0,
    total_reviews INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_clinics_location ON clinics(location_lat, location_lng);
CREATE INDEX IF NOT EXISTS idx_clinics_emergency ON clinics(emergency_available);

CREATE TABLE IF NOT EXISTS doctors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER UNIQUE REFERENCES users(id) ON DELETE SET NULL,
    clinic_id TEXT REFERENCES clinics(id) ON DELETE SET NULL,
    name TEXT NOT NULL,
    specialties TEXT NOT NULL DEFAULT '[]',      -- JSON array, mirrored in doctor_specialties
    qualification TEXT,
    experience_years INTEGER NOT NULL DEFAULT 0,
    registration_number TEXT UNIQUE,
    consultation_fee INTEGER NOT NULL CHECK (consultation_fee >= 0),
    rating REAL NOT NULL DEFAULT 0.0,
    total_consultations INTEGER NOT NULL DEFAULT 0,
    is_available INTEGER NOT NULL DEFAULT 1,
    is_verified INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_doctors_clinic ON doctors(clinic_id);
CREATE INDEX IF NOT EXISTS idx_doctors_available ON doctors(is_available);

-- Inverted index over doctors.specialties
CREATE TABLE IF NOT EXISTS doctor_specialties (
    doctor_id INTEGER NOT NULL REFERENCES doctors(id) ON DELETE CASCADE,
    specialty TEXT NOT NULL,                     -- lowercased, trimmed
    PRIMARY KEY (doctor_id, specialty)
);

CREATE INDEX IF NOT EXISTS idx_doctor_specialties_specialty ON doctor_specialties(specialty);

CREATE TRIGGER IF NOT EXISTS doctors_specialties_ai AFTER INSERT ON doctors BEGIN
    INSERT OR IGNORE INTO doctor_specialties (doctor_id, specialty)
    SELECT new.id, lower(trim(value)) FROM json_each(new.specialties)
    WHERE type = 'text' AND trim(value) <> '';
END;

CREATE TRIGGER IF NOT EXISTS doctors_specialties_au AFTER UPDATE OF specialties ON doctors BEGIN
    DELETE FROM doctor_specialties WHERE doctor_id = old.id;
    INSERT OR IGNORE INTO doctor_specialties (doctor_id, specialty)
    SELECT new.id, lower(trim(value)) FROM json_each(new.specialties)
    WHERE type = 'text' AND trim(value) <> '';
END;

CREATE TABLE IF NOT EXISTS doctor_slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    doctor_id INTEGER NOT NULL REFERENCES doctors(id) ON DELETE CASCADE,
    date TEXT NOT NULL,                          -- YYYY-MM-DD
    start_time TEXT NOT NULL,                    -- HH:MM
    end_time TEXT NOT NULL,
    is_booked INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (doctor_id, date, start_time),
    CHECK (end_time > start_time)
);

CREATE INDEX IF NOT EXISTS idx_doctor_slots_lookup ON doctor_slots(doctor_id, date, is_booked);
"#;

// ============================================================================
// 0003 Appointments
// ============================================================================

pub const APPOINTMENTS: &str = r#"
CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,                         -- APT format
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    doctor_id INTEGER NOT NULL REFERENCES doctors(id) ON DELETE RESTRICT,
    slot_id INTEGER REFERENCES doctor_slots(id) ON DELETE SET NULL,
    date TEXT NOT NULL,
    time TEXT NOT NULL,
    reason TEXT,
    symptoms TEXT NOT NULL DEFAULT '[]',         -- JSON array of strings
    is_emergency INTEGER NOT NULL DEFAULT 0,
    consultation_type TEXT NOT NULL DEFAULT 'in-person'
        CHECK (consultation_type IN ('in-person', 'video', 'phone')),
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'confirmed', 'completed', 'cancelled')),
    consultation_fee INTEGER NOT NULL CHECK (consultation_fee >= 0),
    notes TEXT,
    cancellation_reason TEXT,
    cancelled_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_appointments_user ON appointments(user_id);
CREATE INDEX IF NOT EXISTS idx_appointments_doctor_date ON appointments(doctor_id, date);
CREATE INDEX IF NOT EXISTS idx_appointments_slot ON appointments(slot_id);
CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status);

CREATE TABLE IF NOT EXISTS prescriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    appointment_id TEXT UNIQUE REFERENCES appointments(id) ON DELETE SET NULL,
    doctor_id INTEGER REFERENCES doctors(id) ON DELETE SET NULL,
    medicines TEXT NOT NULL DEFAULT '[]',        -- JSON array of PrescribedMedicine
    diagnosis TEXT,
    instructions TEXT,
    issue_date TEXT NOT NULL,
    valid_until TEXT,
    follow_up_required INTEGER NOT NULL DEFAULT 0,
    image_url TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_user ON prescriptions(user_id);
CREATE INDEX IF NOT EXISTS idx_prescriptions_doctor ON prescriptions(doctor_id);

CREATE TABLE IF NOT EXISTS uploaded_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    appointment_id TEXT REFERENCES appointments(id) ON DELETE SET NULL,
    filename TEXT NOT NULL,
    stored_filename TEXT NOT NULL,
    file_path TEXT NOT NULL,
    file_url TEXT NOT NULL,
    file_size INTEGER NOT NULL CHECK (file_size >= 0),
    file_hash TEXT NOT NULL,                     -- SHA-256 hex
    file_type TEXT NOT NULL,
    category TEXT NOT NULL,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_uploaded_files_user ON uploaded_files(user_id, is_active);
CREATE INDEX IF NOT EXISTS idx_uploaded_files_hash ON uploaded_files(file_hash);
CREATE INDEX IF NOT EXISTS idx_uploaded_files_category ON uploaded_files(category);
CREATE INDEX IF NOT EXISTS idx_uploaded_files_appointment ON uploaded_files(appointment_id);
"#;

/// Slot to appointment link. Runs after `doctor_slots.appointment_id` exists.
pub const SLOT_APPOINTMENT_LINK: &str = r#"
-- One slot holds at most one appointment
CREATE UNIQUE INDEX IF NOT EXISTS idx_doctor_slots_appointment ON doctor_slots(appointment_id);

-- Release the slot when its appointment row goes away (e.g. user cascade).
-- BEFORE so it runs ahead of the SET NULL action on doctor_slots.appointment_id.
CREATE TRIGGER IF NOT EXISTS appointments_release_slot BEFORE DELETE ON appointments BEGIN
    UPDATE doctor_slots SET is_booked = 0, appointment_id = NULL
    WHERE appointment_id = old.id;
END;
"#;

// ============================================================================
// 0004 Pharmacy, stock ledger and orders
// ============================================================================

pub const PHARMACY: &str = r#"
CREATE TABLE IF NOT EXISTS pharmacies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER UNIQUE REFERENCES users(id) ON DELETE SET NULL,
    display_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    license_number TEXT UNIQUE,
    drug_license_number TEXT NOT NULL,
    gstin TEXT UNIQUE,
    owner_name TEXT NOT NULL,
    address TEXT NOT NULL,
    city TEXT,
    state TEXT,
    pincode TEXT,
    location_lat REAL,
    location_lng REAL,
    phone TEXT,
    email TEXT,
    operating_hours TEXT NOT NULL DEFAULT '{}',  -- JSON object
    is_verified INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    rating REAL NOT NULL DEFAULT 0.0,
    home_delivery_available INTEGER NOT NULL DEFAULT 1,
    minimum_order_amount INTEGER NOT NULL DEFAULT 0,
    total_orders INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_pharmacies_location ON pharmacies(location_lat, location_lng);
CREATE INDEX IF NOT EXISTS idx_pharmacies_verified ON pharmacies(is_verified, is_active);

CREATE TABLE IF NOT EXISTS medicines (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pharmacy_id INTEGER NOT NULL REFERENCES pharmacies(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    generic_name TEXT,
    manufacturer TEXT,
    composition TEXT,
    dosage TEXT,
    category TEXT,
    description TEXT,
    mrp INTEGER NOT NULL,
    selling_price INTEGER NOT NULL,
    discount_percentage REAL NOT NULL DEFAULT 0.0,
    stock_quantity INTEGER NOT NULL DEFAULT 0,   -- kept >= 0 by the stock ledger
    reorder_level INTEGER NOT NULL DEFAULT 10,
    requires_prescription INTEGER NOT NULL DEFAULT 0,
    is_controlled_substance INTEGER NOT NULL DEFAULT 0,
    schedule_type TEXT,
    expiry_date TEXT NOT NULL,
    batch_number TEXT NOT NULL,
    is_available INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_medicines_pharmacy ON medicines(pharmacy_id);
CREATE INDEX IF NOT EXISTS idx_medicines_category ON medicines(category);
CREATE INDEX IF NOT EXISTS idx_medicines_name ON medicines(name);
CREATE INDEX IF NOT EXISTS idx_medicines_expiry ON medicines(expiry_date);

-- FTS5 virtual table for medicine search
CREATE VIRTUAL TABLE IF NOT EXISTS medicines_fts USING fts5(
    name,
    generic_name,
    composition,
    content='medicines',
    content_rowid='id'
);

CREATE TRIGGER IF NOT EXISTS medicines_ai AFTER INSERT ON medicines BEGIN
    INSERT INTO medicines_fts(rowid, name, generic_name, composition)
    VALUES (new.id, new.name, new.generic_name, new.composition);
END;

CREATE TRIGGER IF NOT EXISTS medicines_ad AFTER DELETE ON medicines BEGIN
    INSERT INTO medicines_fts(medicines_fts, rowid, name, generic_name, composition)
    VALUES ('delete', old.id, old.name, old.generic_name, old.composition);
END;

CREATE TRIGGER IF NOT EXISTS medicines_au AFTER UPDATE OF name, generic_name, composition ON medicines BEGIN
    INSERT INTO medicines_fts(medicines_fts, rowid, name, generic_name, composition)
    VALUES ('delete', old.id, old.name, old.generic_name, old.composition);
    INSERT INTO medicines_fts(rowid, name, generic_name, composition)
    VALUES (new.id, new.name, new.generic_name, new.composition);
END;

-- Stock ledger (append-only)
CREATE TABLE IF NOT EXISTS stock_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    medicine_id INTEGER NOT NULL REFERENCES medicines(id) ON DELETE CASCADE,
    pharmacy_id INTEGER NOT NULL REFERENCES pharmacies(id) ON DELETE CASCADE,
    entry_type TEXT NOT NULL
        CHECK (entry_type IN ('purchase', 'sale', 'return', 'adjustment')),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    reference_id TEXT,
    batch_number TEXT,
    expiry_date TEXT,
    supplier_name TEXT,
    purchase_price_per_unit REAL,
    invoice_number TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_stock_entries_medicine ON stock_entries(medicine_id);
CREATE INDEX IF NOT EXISTS idx_stock_entries_pharmacy ON stock_entries(pharmacy_id);

CREATE TRIGGER IF NOT EXISTS stock_entries_no_update BEFORE UPDATE ON stock_entries
BEGIN
    SELECT RAISE(ABORT, 'stock_entries is append-only');
END;

CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,                         -- ORD format
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    pharmacy_id INTEGER NOT NULL REFERENCES pharmacies(id) ON DELETE RESTRICT,
    prescription_id INTEGER REFERENCES prescriptions(id) ON DELETE SET NULL,
    total_amount INTEGER NOT NULL CHECK (total_amount >= 0),
    delivery_address TEXT NOT NULL,
    contact_number TEXT NOT NULL,
    delivery_type TEXT NOT NULL DEFAULT 'home'
        CHECK (delivery_type IN ('home', 'express', 'pickup')),
    order_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (order_status IN ('pending', 'confirmed', 'processing', 'shipped', 'delivered', 'cancelled')),
    payment_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (payment_status IN ('pending', 'success', 'failed', 'refunded', 'partially_refunded')),
    tracking_number TEXT,
    estimated_delivery TEXT,
    delivered_at TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);
CREATE INDEX IF NOT EXISTS idx_orders_pharmacy ON orders(pharmacy_id);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(order_status);
CREATE INDEX IF NOT EXISTS idx_orders_prescription ON orders(prescription_id);

CREATE TABLE IF NOT EXISTS order_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    order_id TEXT NOT NULL REFERENCES orders(id) ON DELETE CASCADE,
    medicine_id INTEGER NOT NULL REFERENCES medicines(id) ON DELETE RESTRICT,
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    price INTEGER NOT NULL CHECK (price >= 0)    -- unit price at time of order
);

CREATE INDEX IF NOT EXISTS idx_order_items_order ON order_items(order_id);
CREATE INDEX IF NOT EXISTS idx_order_items_medicine ON order_items(medicine_id);
"#;

// ============================================================================
// 0005 Laboratories
// ============================================================================

pub const LABORATORIES: &str = r#"
CREATE TABLE IF NOT EXISTS laboratories (
    id TEXT PRIMARY KEY,
    user_id INTEGER UNIQUE REFERENCES users(id) ON DELETE SET NULL,
    name TEXT NOT NULL,
    license_number TEXT UNIQUE,
    accreditation TEXT NOT NULL DEFAULT '[]',    -- JSON array of strings
    address TEXT NOT NULL,
    city TEXT,
    state TEXT,
    pincode TEXT,
    location_lat REAL,
    location_lng REAL,
    phone TEXT,
    owner_name TEXT NOT NULL,
    contact_person TEXT,
    emergency_contact TEXT,
    is_verified INTEGER NOT NULL DEFAULT 0,
    is_active INTEGER NOT NULL DEFAULT 1,
    rating REAL NOT NULL DEFAULT 0.0,
    home_collection_available INTEGER NOT NULL DEFAULT 1,
    home_collection_charges INTEGER NOT NULL DEFAULT 50,
    operating_hours TEXT NOT NULL DEFAULT '{}',
    specializations TEXT NOT NULL DEFAULT '[]',
    total_tests_completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_laboratories_location ON laboratories(location_lat, location_lng);

CREATE TABLE IF NOT EXISTS lab_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    laboratory_id TEXT NOT NULL REFERENCES laboratories(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    category TEXT,
    description TEXT,
    price INTEGER NOT NULL CHECK (price >= 0),
    result_time_hours INTEGER NOT NULL CHECK (result_time_hours > 0),
    sample_type TEXT,
    preparation_required TEXT,
    home_collection_available INTEGER NOT NULL DEFAULT 1,
    fasting_required INTEGER NOT NULL DEFAULT 0,
    is_available INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_lab_tests_laboratory ON lab_tests(laboratory_id);
CREATE INDEX IF NOT EXISTS idx_lab_tests_category ON lab_tests(category);

CREATE TABLE IF NOT EXISTS lab_bookings (
    id TEXT PRIMARY KEY,                         -- LAB format
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    laboratory_id TEXT NOT NULL REFERENCES laboratories(id) ON DELETE RESTRICT,
    test_id INTEGER NOT NULL REFERENCES lab_tests(id) ON DELETE RESTRICT,
    total_amount INTEGER NOT NULL CHECK (total_amount >= 0),
    booking_date TEXT NOT NULL,
    collection_date TEXT NOT NULL,
    collection_time TEXT NOT NULL,
    collection_type TEXT NOT NULL DEFAULT 'home'
        CHECK (collection_type IN ('home', 'lab')),
    collection_address TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled'
        CHECK (status IN ('scheduled', 'sample_collected', 'completed', 'cancelled')),
    result_pdf_url TEXT,
    completed_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_lab_bookings_user ON lab_bookings(user_id);
CREATE INDEX IF NOT EXISTS idx_lab_bookings_laboratory ON lab_bookings(laboratory_id);
CREATE INDEX IF NOT EXISTS idx_lab_bookings_test ON lab_bookings(test_id);
CREATE INDEX IF NOT EXISTS idx_lab_bookings_status ON lab_bookings(status);
"#;

// ============================================================================
// 0006 Emergency requests, notifications, audit log
// ============================================================================

pub const EMERGENCY_AND_ACTIVITY: &str = r#"
CREATE TABLE IF NOT EXISTS emergency_requests (
    id TEXT PRIMARY KEY,                         -- EMG format
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    emergency_type TEXT NOT NULL
        CHECK (emergency_type IN ('ambulance', 'doctor', 'nurse')),
    description TEXT,
    location TEXT NOT NULL,
    location_lat REAL NOT NULL,
    location_lng REAL NOT NULL,
    contact_number TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'requested'
        CHECK (status IN ('requested', 'dispatched', 'arrived', 'completed', 'cancelled')),
    assigned_clinic_id TEXT REFERENCES clinics(id) ON DELETE SET NULL,
    ambulance_eta INTEGER,                       -- minutes
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_emergency_user ON emergency_requests(user_id);
CREATE INDEX IF NOT EXISTS idx_emergency_status ON emergency_requests(status);
CREATE INDEX IF NOT EXISTS idx_emergency_location ON emergency_requests(location_lat, location_lng);
CREATE INDEX IF NOT EXISTS idx_emergency_clinic ON emergency_requests(assigned_clinic_id);

CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    notification_type TEXT NOT NULL,
    related_entity_type TEXT,
    related_entity_id TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);

CREATE TABLE IF NOT EXISTS audit_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    action TEXT NOT NULL,
    entity_type TEXT,
    entity_id TEXT,
    details TEXT NOT NULL DEFAULT '{}',          -- JSON object
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_audit_logs_user ON audit_logs(user_id);
CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs(entity_type, entity_id);

-- Audit rows are immutable; only the ON DELETE SET NULL of user_id may touch them
CREATE TRIGGER IF NOT EXISTS audit_logs_no_update
BEFORE UPDATE OF action, entity_type, entity_id, details, created_at ON audit_logs
BEGIN
    SELECT RAISE(ABORT, 'audit_logs is append-only');
END;
"#;

// ============================================================================
// 0007 Profile and slot extensions
// ============================================================================

pub const PROFILE_EXTENSION_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_users_scheduled_deletion ON users(scheduled_deletion_date);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn all_steps() -> [&'static str; 8] {
        [
            USERS_AND_PROFILES,
            CLINICS_AND_DOCTORS,
            APPOINTMENTS,
            PHARMACY,
            LABORATORIES,
            EMERGENCY_AND_ACTIVITY,
            MIGRATION_LEDGER,
            CONNECTION_PRAGMAS,
        ]
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        for sql in all_steps() {
            let result = conn.execute_batch(sql);
            assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
        }
    }

    #[test]
    fn test_schema_rerunnable() {
        let conn = Connection::open_in_memory().unwrap();
        for sql in all_steps() {
            conn.execute_batch(sql).unwrap();
        }
        for sql in all_steps() {
            let result = conn.execute_batch(sql);
            assert!(result.is_ok(), "Second run should be a no-op: {:?}", result);
        }
    }

    #[test]
    fn test_medicine_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        for sql in all_steps() {
            conn.execute_batch(sql).unwrap();
        }

        conn.execute(
            "INSERT INTO pharmacies (display_id, name, drug_license_number, owner_name, address)
             VALUES ('PH1', 'City Pharmacy', 'DL-1', 'Owner', 'Main Road')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO medicines (pharmacy_id, name, generic_name, mrp, selling_price, expiry_date, batch_number)
             VALUES (1, 'Crocin 500', 'Paracetamol', 30, 25, '2027-01-01', 'B1')",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM medicines_fts WHERE medicines_fts MATCH 'paracetamol'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_specialty_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        for sql in all_steps() {
            conn.execute_batch(sql).unwrap();
        }

        conn.execute(
            "INSERT INTO doctors (name, specialties, consultation_fee)
             VALUES ('Dr. A', '[\"Cardiology\", \" General \", \"\"]', 500)",
            [],
        )
        .unwrap();

        let specialties: Vec<String> = conn
            .prepare("SELECT specialty FROM doctor_specialties ORDER BY specialty")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        assert_eq!(specialties, vec!["cardiology", "general"]);
    }
}
