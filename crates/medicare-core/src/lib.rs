//! MediCare Core Library
//!
//! Versioned SQLite schema and data-access layer for a healthcare and
//! pharmacy platform: patients, clinics and doctors, appointment slots,
//! prescriptions, pharmacies with a stock ledger, medicine orders, lab
//! bookings, emergency requests, notifications and an audit log.
//!
//! # Architecture
//!
//! ```text
//!  host runtime (uniffi)          medicare-db CLI
//!          │                            │
//!          ▼                            ▼
//!   MedicareCore ──────────────▶ Database ◀── Seeder
//!                                   │
//!                        ┌──────────┴──────────┐
//!                        ▼                     ▼
//!                   Migrator             impl Database
//!               (schema_migrations)   (users, clinics, orders, ...)
//!                        │                     │
//!                        └──────── SQLite ─────┘
//! ```
//!
//! Every multi-table write (booking, order placement, stock movement,
//! cancellation) runs in a single transaction. Stock only moves through the
//! append-only `stock_entries` ledger and never goes below zero.
//!
//! # Modules
//!
//! - [`db`]: connection, migrations and all data operations
//! - [`models`]: domain types (User, Doctor, Appointment, Order, ...)
//! - [`seed`]: demo data for local development

pub mod db;
pub mod models;
pub mod seed;

// Re-export commonly used types
pub use db::{ConstraintKind, Database, DbError, DbResult, MigrationReport, MigrationStatus, Migrator};
pub use models::{
    Appointment, AppointmentStatus, BookingRequest, DeliveryType, Doctor, DoctorSlot,
    EmergencyRequest, EmergencyStatus, EmergencyType, Medicine, NewOrder, Order, OrderLine,
    OrderStatus, User,
};
pub use seed::{SeedSummary, Seeder};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum MedicareError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<DbError> for MedicareError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => MedicareError::NotFound(what),
            DbError::Constraint { .. } => MedicareError::Conflict(e.to_string()),
            DbError::InvalidTransition { .. }
            | DbError::InvalidState(_)
            | DbError::InsufficientStock { .. } => MedicareError::InvalidInput(e.to_string()),
            _ => MedicareError::DatabaseError(e.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for MedicareError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        MedicareError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path and migrate it.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<MedicareCore>, MedicareError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(MedicareCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<MedicareCore>, MedicareError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(MedicareCore {
        db: Arc::new(Mutex::new(db)),
    }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database wrapper for FFI.
#[derive(uniffi::Object)]
pub struct MedicareCore {
    db: Arc<Mutex<Database>>,
}

#[uniffi::export]
impl MedicareCore {
    // =========================================================================
    // Users
    // =========================================================================

    pub fn get_user(&self, id: i64) -> Result<Option<FfiUser>, MedicareError> {
        let db = self.db.lock()?;
        Ok(db.get_user(id)?.map(Into::into))
    }

    pub fn get_user_by_phone(&self, phone: String) -> Result<Option<FfiUser>, MedicareError> {
        let db = self.db.lock()?;
        Ok(db.get_user_by_phone(&phone)?.map(Into::into))
    }

    /// Register a patient account. Fails with `Conflict` if the phone is taken.
    pub fn create_user(&self, phone: String, full_name: Option<String>) -> Result<FfiUser, MedicareError> {
        let db = self.db.lock()?;
        let mut user = User::new(phone);
        user.full_name = full_name;
        db.insert_user(&mut user)?;
        Ok(user.into())
    }

    // =========================================================================
    // Appointments
    // =========================================================================

    pub fn list_open_slots(&self, doctor_id: i64, date: String) -> Result<Vec<FfiSlot>, MedicareError> {
        let db = self.db.lock()?;
        let slots = db.list_open_slots(doctor_id, &date)?;
        Ok(slots.into_iter().map(Into::into).collect())
    }

    pub fn book_appointment(
        &self,
        user_id: i64,
        doctor_id: i64,
        slot_id: i64,
        reason: Option<String>,
    ) -> Result<FfiAppointment, MedicareError> {
        let db = self.db.lock()?;
        let mut request = BookingRequest::new(user_id, doctor_id, slot_id);
        request.reason = reason;
        Ok(db.book_appointment(&request)?.into())
    }

    pub fn cancel_appointment(
        &self,
        appointment_id: String,
        reason: Option<String>,
    ) -> Result<FfiAppointment, MedicareError> {
        let db = self.db.lock()?;
        Ok(db.cancel_appointment(&appointment_id, reason.as_deref())?.into())
    }

    /// Move an appointment to another open slot of the same doctor.
    pub fn reschedule_appointment(
        &self,
        appointment_id: String,
        new_slot_id: i64,
    ) -> Result<FfiAppointment, MedicareError> {
        let db = self.db.lock()?;
        Ok(db.reschedule_appointment(&appointment_id, new_slot_id)?.into())
    }

    // =========================================================================
    // Pharmacy
    // =========================================================================

    /// Search available medicines by name, generic name or composition.
    pub fn search_medicines(&self, query: String, limit: u32) -> Result<Vec<FfiMedicine>, MedicareError> {
        let db = self.db.lock()?;
        let medicines = db.search_medicines(&query, limit as usize)?;
        Ok(medicines.into_iter().map(Into::into).collect())
    }

    /// Place an order. `delivery_type` is `home`, `express` or `pickup`.
    pub fn place_order(
        &self,
        user_id: i64,
        pharmacy_id: i64,
        lines: Vec<FfiOrderLine>,
        delivery_address: String,
        contact_number: String,
        delivery_type: String,
    ) -> Result<FfiOrder, MedicareError> {
        let delivery_type = DeliveryType::parse(&delivery_type).ok_or_else(|| {
            MedicareError::InvalidInput(format!("unknown delivery type '{}'", delivery_type))
        })?;

        let db = self.db.lock()?;
        let lines = lines
            .into_iter()
            .map(|l| OrderLine {
                medicine_id: l.medicine_id,
                quantity: l.quantity,
            })
            .collect();
        let mut order = NewOrder::new(user_id, pharmacy_id, lines, delivery_address, contact_number);
        order.delivery_type = delivery_type;

        Ok(db.place_order(&order)?.into())
    }

    pub fn cancel_order(&self, order_id: String, reason: Option<String>) -> Result<FfiOrder, MedicareError> {
        let db = self.db.lock()?;
        Ok(db.cancel_order(&order_id, reason.as_deref())?.into())
    }

    // =========================================================================
    // Emergency
    // =========================================================================

    /// Raise an ambulance, doctor or nurse request.
    pub fn request_emergency(
        &self,
        user_id: i64,
        emergency_type: String,
        location: String,
        location_lat: f64,
        location_lng: f64,
        contact_number: String,
    ) -> Result<FfiEmergency, MedicareError> {
        let emergency_type = EmergencyType::parse(&emergency_type).ok_or_else(|| {
            MedicareError::InvalidInput(format!("unknown emergency type '{}'", emergency_type))
        })?;

        let db = self.db.lock()?;
        let request = EmergencyRequest::new(
            user_id,
            emergency_type,
            location,
            location_lat,
            location_lng,
            contact_number,
        );
        db.create_emergency_request(&request)?;
        Ok(request.into())
    }

    pub fn get_emergency_status(&self, request_id: String) -> Result<Option<FfiEmergency>, MedicareError> {
        let db = self.db.lock()?;
        Ok(db.get_emergency_request(&request_id)?.map(Into::into))
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe user.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiUser {
    pub id: i64,
    pub phone: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub is_verified: bool,
    pub scheduled_deletion_date: Option<String>,
}

impl From<User> for FfiUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            phone: user.phone,
            email: user.email,
            full_name: user.full_name,
            role: user.role.as_str().to_string(),
            is_verified: user.is_verified,
            scheduled_deletion_date: user.scheduled_deletion_date,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSlot {
    pub id: i64,
    pub doctor_id: i64,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

impl From<DoctorSlot> for FfiSlot {
    fn from(slot: DoctorSlot) -> Self {
        Self {
            id: slot.id,
            doctor_id: slot.doctor_id,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
        }
    }
}

/// FFI-safe appointment.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAppointment {
    pub id: String,
    pub user_id: i64,
    pub doctor_id: i64,
    pub slot_id: Option<i64>,
    pub date: String,
    pub time: String,
    pub status: String,
    pub consultation_fee: i64,
    pub cancellation_reason: Option<String>,
}

impl From<Appointment> for FfiAppointment {
    fn from(appointment: Appointment) -> Self {
        Self {
            id: appointment.id,
            user_id: appointment.user_id,
            doctor_id: appointment.doctor_id,
            slot_id: appointment.slot_id,
            date: appointment.date,
            time: appointment.time,
            status: appointment.status.as_str().to_string(),
            consultation_fee: appointment.consultation_fee,
            cancellation_reason: appointment.cancellation_reason,
        }
    }
}

/// FFI-safe medicine.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiMedicine {
    pub id: i64,
    pub pharmacy_id: i64,
    pub name: String,
    pub generic_name: Option<String>,
    pub mrp: i64,
    pub selling_price: i64,
    pub stock_quantity: i64,
    pub requires_prescription: bool,
}

impl From<Medicine> for FfiMedicine {
    fn from(medicine: Medicine) -> Self {
        Self {
            id: medicine.id,
            pharmacy_id: medicine.pharmacy_id,
            name: medicine.name,
            generic_name: medicine.generic_name,
            mrp: medicine.mrp,
            selling_price: medicine.selling_price,
            stock_quantity: medicine.stock_quantity,
            requires_prescription: medicine.requires_prescription,
        }
    }
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOrderLine {
    pub medicine_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOrderItem {
    pub medicine_id: i64,
    pub quantity: i64,
    pub price: i64,
}

/// FFI-safe order with its items.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOrder {
    pub id: String,
    pub user_id: i64,
    pub pharmacy_id: i64,
    pub total_amount: i64,
    pub delivery_type: String,
    pub order_status: String,
    pub payment_status: String,
    pub items: Vec<FfiOrderItem>,
}

impl From<Order> for FfiOrder {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            pharmacy_id: order.pharmacy_id,
            total_amount: order.total_amount,
            delivery_type: order.delivery_type.as_str().to_string(),
            order_status: order.order_status.as_str().to_string(),
            payment_status: order.payment_status.as_str().to_string(),
            items: order
                .items
                .into_iter()
                .map(|item| FfiOrderItem {
                    medicine_id: item.medicine_id,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
        }
    }
}

/// FFI-safe emergency request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEmergency {
    pub id: String,
    pub emergency_type: String,
    pub status: String,
    pub assigned_clinic_id: Option<String>,
    pub ambulance_eta: Option<i64>,
    pub created_at: String,
}

impl From<EmergencyRequest> for FfiEmergency {
    fn from(request: EmergencyRequest) -> Self {
        Self {
            id: request.id,
            emergency_type: request.emergency_type.as_str().to_string(),
            status: request.status.as_str().to_string(),
            assigned_clinic_id: request.assigned_clinic_id,
            ambulance_eta: request.ambulance_eta,
            created_at: request.created_at,
        }
    }
}
