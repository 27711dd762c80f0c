//! Emergency request models.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    Ambulance,
    Doctor,
    Nurse,
}

impl EmergencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyType::Ambulance => "ambulance",
            EmergencyType::Doctor => "doctor",
            EmergencyType::Nurse => "nurse",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ambulance" => Some(EmergencyType::Ambulance),
            "doctor" => Some(EmergencyType::Doctor),
            "nurse" => Some(EmergencyType::Nurse),
            _ => None,
        }
    }
}

/// Emergency request lifecycle: requested, dispatched, arrived, completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Requested,
    Dispatched,
    Arrived,
    Completed,
    Cancelled,
}

impl EmergencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Requested => "requested",
            EmergencyStatus::Dispatched => "dispatched",
            EmergencyStatus::Arrived => "arrived",
            EmergencyStatus::Completed => "completed",
            EmergencyStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(EmergencyStatus::Requested),
            "dispatched" => Some(EmergencyStatus::Dispatched),
            "arrived" => Some(EmergencyStatus::Arrived),
            "completed" => Some(EmergencyStatus::Completed),
            "cancelled" => Some(EmergencyStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EmergencyStatus::Requested | EmergencyStatus::Dispatched | EmergencyStatus::Arrived
        )
    }

    pub fn can_transition_to(&self, next: EmergencyStatus) -> bool {
        use EmergencyStatus::*;
        matches!(
            (self, next),
            (Requested, Dispatched)
                | (Dispatched, Arrived)
                | (Arrived, Completed)
                | (Requested, Cancelled)
                | (Dispatched, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyRequest {
    /// EMG reference id
    pub id: String,
    pub user_id: i64,
    pub emergency_type: EmergencyType,
    pub description: Option<String>,
    /// Free-text location as reported by the caller
    pub location: String,
    pub location_lat: f64,
    pub location_lng: f64,
    pub contact_number: String,
    pub status: EmergencyStatus,
    pub assigned_clinic_id: Option<String>,
    /// Minutes
    pub ambulance_eta: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl EmergencyRequest {
    pub fn new(
        user_id: i64,
        emergency_type: EmergencyType,
        location: impl Into<String>,
        location_lat: f64,
        location_lng: f64,
        contact_number: impl Into<String>,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            id: super::generate_reference_id("EMG"),
            user_id,
            emergency_type,
            description: None,
            location: location.into(),
            location_lat,
            location_lng,
            contact_number: contact_number.into(),
            status: EmergencyStatus::Requested,
            assigned_clinic_id: None,
            ambulance_eta: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progression() {
        use EmergencyStatus::*;
        assert!(Requested.can_transition_to(Dispatched));
        assert!(Dispatched.can_transition_to(Arrived));
        assert!(Arrived.can_transition_to(Completed));
        assert!(!Requested.can_transition_to(Arrived));
        assert!(!Completed.can_transition_to(Requested));
    }

    #[test]
    fn test_cancel_window() {
        use EmergencyStatus::*;
        assert!(Requested.can_transition_to(Cancelled));
        assert!(Dispatched.can_transition_to(Cancelled));
        assert!(!Arrived.can_transition_to(Cancelled));
    }

    #[test]
    fn test_new_request() {
        let req = EmergencyRequest::new(1, EmergencyType::Ambulance, "Bandra West", 19.05, 72.83, "+919876543210");
        assert!(req.id.starts_with("EMG"));
        assert_eq!(req.status, EmergencyStatus::Requested);
        assert!(req.status.is_active());
    }
}
