//! Clinic, doctor and slot models.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// A physical clinic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    /// CLI001 style id
    pub id: String,
    pub name: String,
    pub address: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Day name to "HH:MM-HH:MM"
    pub working_hours: BTreeMap<String, String>,
    pub emergency_available: bool,
    pub ambulance_available: bool,
    pub insurance_accepted: Vec<String>,
    pub rating: f64,
    pub total_reviews: i64,
    pub created_at: String,
}

impl Clinic {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        location_lat: f64,
        location_lng: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: address.into(),
            location_lat,
            location_lng,
            phone: None,
            email: None,
            working_hours: BTreeMap::new(),
            emergency_available: false,
            ambulance_available: false,
            insurance_accepted: Vec::new(),
            rating: 0.0,
            total_reviews: 0,
            created_at: super::now_timestamp(),
        }
    }
}

/// Latitude/longitude rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    /// Approximate box of `radius_km` around a point.
    ///
    /// One degree of latitude is ~111 km; longitude degrees shrink with
    /// `cos(lat)`.
    pub fn around(lat: f64, lng: f64, radius_km: f64) -> Self {
        let dlat = radius_km / 111.0;
        let cos = lat.to_radians().cos().abs().max(0.01);
        let dlng = radius_km / (111.0 * cos);
        Self {
            min_lat: lat - dlat,
            max_lat: lat + dlat,
            min_lng: lng - dlng,
            max_lng: lng + dlng,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }
}

/// A doctor, optionally attached to a clinic and a login account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: i64,
    pub user_id: Option<i64>,
    pub clinic_id: Option<String>,
    pub name: String,
    /// Free-form specialty names; matched case-insensitively
    pub specialties: Vec<String>,
    pub qualification: Option<String>,
    pub experience_years: i64,
    pub registration_number: Option<String>,
    /// Fee in rupees
    pub consultation_fee: i64,
    pub rating: f64,
    pub total_consultations: i64,
    pub is_available: bool,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Doctor {
    pub fn new(name: impl Into<String>, specialties: Vec<String>, consultation_fee: i64) -> Self {
        let now = super::now_timestamp();
        Self {
            id: 0,
            user_id: None,
            clinic_id: None,
            name: name.into(),
            specialties,
            qualification: None,
            experience_years: 0,
            registration_number: None,
            consultation_fee,
            rating: 0.0,
            total_consultations: 0,
            is_available: true,
            is_verified: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn has_specialty(&self, specialty: &str) -> bool {
        let wanted = specialty.trim().to_lowercase();
        self.specialties
            .iter()
            .any(|s| s.trim().to_lowercase() == wanted)
    }
}

/// A bookable time range on a doctor's calendar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorSlot {
    pub id: i64,
    pub doctor_id: i64,
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM
    pub start_time: String,
    /// HH:MM
    pub end_time: String,
    pub is_booked: bool,
    /// Held back by the doctor (leave, surgery, ...)
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    /// Appointment occupying the slot
    pub appointment_id: Option<String>,
}

impl DoctorSlot {
    pub fn new(
        doctor_id: i64,
        date: impl Into<String>,
        start_time: impl Into<String>,
        end_time: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            doctor_id,
            date: date.into(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            is_booked: false,
            is_blocked: false,
            block_reason: None,
            appointment_id: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.is_booked && !self.is_blocked
    }
}

/// Recurring weekly timetable used to generate slots in bulk.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSchedule {
    pub start_date: NaiveDate,
    /// Inclusive
    pub end_date: NaiveDate,
    /// (start, end) pairs as HH:MM
    pub times: Vec<(String, String)>,
    pub weekdays: Vec<Weekday>,
    /// Holidays and other days without slots
    pub skip_dates: Vec<NaiveDate>,
}

impl SlotSchedule {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, times: Vec<(String, String)>) -> Self {
        Self {
            start_date,
            end_date,
            times,
            weekdays: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
            ],
            skip_dates: Vec::new(),
        }
    }

    /// Dates in range that fall on a working weekday and are not skipped.
    pub fn working_dates(&self) -> Vec<NaiveDate> {
        self.start_date
            .iter_days()
            .take_while(|d| *d <= self.end_date)
            .filter(|d| self.weekdays.contains(&d.weekday()) && !self.skip_dates.contains(d))
            .collect()
    }
}

/// Outcome of a doctor's leave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveSummary {
    pub slots_blocked: usize,
    pub patients_notified: usize,
}
