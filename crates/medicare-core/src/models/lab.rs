//! Laboratory, lab test and booking models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A diagnostic laboratory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Laboratory {
    pub id: String,
    pub user_id: Option<i64>,
    pub name: String,
    pub license_number: Option<String>,
    /// NABL, CAP, ...
    pub accreditation: Vec<String>,
    pub address: String,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub phone: Option<String>,
    pub owner_name: String,
    pub contact_person: Option<String>,
    pub emergency_contact: Option<String>,
    pub is_verified: bool,
    pub is_active: bool,
    pub rating: f64,
    pub home_collection_available: bool,
    /// Added to a booking total for home collection
    pub home_collection_charges: i64,
    pub operating_hours: BTreeMap<String, String>,
    pub specializations: Vec<String>,
    pub total_tests_completed: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Laboratory {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        address: impl Into<String>,
        owner_name: impl Into<String>,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            id: id.into(),
            user_id: None,
            name: name.into(),
            license_number: None,
            accreditation: Vec::new(),
            address: address.into(),
            city: None,
            state: None,
            pincode: None,
            location_lat: None,
            location_lng: None,
            phone: None,
            owner_name: owner_name.into(),
            contact_person: None,
            emergency_contact: None,
            is_verified: false,
            is_active: true,
            rating: 0.0,
            home_collection_available: true,
            home_collection_charges: 50,
            operating_hours: BTreeMap::new(),
            specializations: Vec::new(),
            total_tests_completed: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A test offered by a laboratory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabTest {
    pub id: i64,
    pub laboratory_id: String,
    pub name: String,
    /// blood_test, urine_test, ...
    pub category: Option<String>,
    pub description: Option<String>,
    pub price: i64,
    pub result_time_hours: i64,
    pub sample_type: Option<String>,
    pub preparation_required: Option<String>,
    pub home_collection_available: bool,
    pub fasting_required: bool,
    pub is_available: bool,
}

impl LabTest {
    pub fn new(
        laboratory_id: impl Into<String>,
        name: impl Into<String>,
        price: i64,
        result_time_hours: i64,
    ) -> Self {
        Self {
            id: 0,
            laboratory_id: laboratory_id.into(),
            name: name.into(),
            category: None,
            description: None,
            price,
            result_time_hours,
            sample_type: None,
            preparation_required: None,
            home_collection_available: true,
            fasting_required: false,
            is_available: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollectionType {
    Home,
    Lab,
}

impl CollectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionType::Home => "home",
            CollectionType::Lab => "lab",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(CollectionType::Home),
            "lab" => Some(CollectionType::Lab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabBookingStatus {
    Scheduled,
    SampleCollected,
    Completed,
    Cancelled,
}

impl LabBookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabBookingStatus::Scheduled => "scheduled",
            LabBookingStatus::SampleCollected => "sample_collected",
            LabBookingStatus::Completed => "completed",
            LabBookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(LabBookingStatus::Scheduled),
            "sample_collected" => Some(LabBookingStatus::SampleCollected),
            "completed" => Some(LabBookingStatus::Completed),
            "cancelled" => Some(LabBookingStatus::Cancelled),
            _ => None,
        }
    }

    /// Cancellation is only possible before the sample is taken.
    pub fn can_transition_to(&self, next: LabBookingStatus) -> bool {
        use LabBookingStatus::*;
        matches!(
            (self, next),
            (Scheduled, SampleCollected) | (Scheduled, Cancelled) | (SampleCollected, Completed)
        )
    }
}

/// A booked lab test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabBooking {
    /// LAB reference id
    pub id: String,
    pub user_id: i64,
    pub laboratory_id: String,
    pub test_id: i64,
    pub total_amount: i64,
    pub booking_date: String,
    pub collection_date: String,
    pub collection_time: String,
    pub collection_type: CollectionType,
    pub collection_address: Option<String>,
    pub status: LabBookingStatus,
    pub result_pdf_url: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for booking a lab test.
#[derive(Debug, Clone, PartialEq)]
pub struct LabBookingRequest {
    pub user_id: i64,
    pub test_id: i64,
    pub collection_date: String,
    pub collection_time: String,
    pub collection_type: CollectionType,
    /// Required for home collection
    pub collection_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_transitions() {
        use LabBookingStatus::*;
        assert!(Scheduled.can_transition_to(SampleCollected));
        assert!(SampleCollected.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(!SampleCollected.can_transition_to(Cancelled));
        assert!(!Scheduled.can_transition_to(Completed));
    }

    #[test]
    fn test_new_laboratory_defaults() {
        let lab = Laboratory::new("LAB001", "HealthFirst Diagnostics", "Andheri", "Owner");
        assert_eq!(lab.home_collection_charges, 50);
        assert!(lab.home_collection_available);
    }
}
