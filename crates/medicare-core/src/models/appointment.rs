//! Appointment and prescription models.

use serde::{Deserialize, Serialize};

/// Appointment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
        )
    }
}

/// How the consultation happens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConsultationType {
    #[serde(rename = "in-person")]
    InPerson,
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "phone")]
    Phone,
}

impl ConsultationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationType::InPerson => "in-person",
            ConsultationType::Video => "video",
            ConsultationType::Phone => "phone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in-person" => Some(ConsultationType::InPerson),
            "video" => Some(ConsultationType::Video),
            "phone" => Some(ConsultationType::Phone),
            _ => None,
        }
    }
}

/// A booked consultation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    /// APT reference id
    pub id: String,
    pub user_id: i64,
    pub doctor_id: i64,
    pub slot_id: Option<i64>,
    pub date: String,
    pub time: String,
    pub reason: Option<String>,
    pub symptoms: Vec<String>,
    pub is_emergency: bool,
    pub consultation_type: ConsultationType,
    pub status: AppointmentStatus,
    /// Copied from the doctor at booking time
    pub consultation_fee: i64,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub cancelled_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for booking an appointment into an open slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRequest {
    pub user_id: i64,
    pub doctor_id: i64,
    pub slot_id: i64,
    pub reason: Option<String>,
    pub symptoms: Vec<String>,
    pub consultation_type: ConsultationType,
    pub is_emergency: bool,
}

impl BookingRequest {
    pub fn new(user_id: i64, doctor_id: i64, slot_id: i64) -> Self {
        Self {
            user_id,
            doctor_id,
            slot_id,
            reason: None,
            symptoms: Vec::new(),
            consultation_type: ConsultationType::InPerson,
            is_emergency: false,
        }
    }
}

/// One medicine line inside a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescribedMedicine {
    pub name: String,
    pub dosage: String,
    /// e.g. "1-0-1"
    pub frequency: String,
    /// e.g. "5 days"
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A prescription issued to a user, optionally tied to an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: i64,
    pub user_id: i64,
    /// At most one prescription per appointment
    pub appointment_id: Option<String>,
    pub doctor_id: Option<i64>,
    pub medicines: Vec<PrescribedMedicine>,
    pub diagnosis: Option<String>,
    pub instructions: Option<String>,
    pub issue_date: String,
    pub valid_until: Option<String>,
    pub follow_up_required: bool,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl Prescription {
    pub fn new(user_id: i64, issue_date: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            appointment_id: None,
            doctor_id: None,
            medicines: Vec::new(),
            diagnosis: None,
            instructions: None,
            issue_date: issue_date.into(),
            valid_until: None,
            follow_up_required: false,
            image_url: None,
            created_at: super::now_timestamp(),
        }
    }

    /// Whether the prescription still covers `date` (YYYY-MM-DD).
    pub fn is_valid_on(&self, date: &str) -> bool {
        match self.valid_until.as_deref() {
            Some(until) => date <= until,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use AppointmentStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(Completed.is_terminal());
    }

    #[test]
    fn test_consultation_type_strings() {
        assert_eq!(ConsultationType::InPerson.as_str(), "in-person");
        assert_eq!(ConsultationType::parse("video"), Some(ConsultationType::Video));
        assert_eq!(ConsultationType::parse("in_person"), None);
    }

    #[test]
    fn test_prescription_validity() {
        let mut rx = Prescription::new(1, "2025-01-01");
        assert!(rx.is_valid_on("2030-01-01"));
        rx.valid_until = Some("2025-01-31".into());
        assert!(rx.is_valid_on("2025-01-31"));
        assert!(!rx.is_valid_on("2025-02-01"));
    }
}
