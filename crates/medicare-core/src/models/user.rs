//! User, family and profile models.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Account role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Patient,
    Doctor,
    Pharmacy,
    Lab,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Patient => "patient",
            UserRole::Doctor => "doctor",
            UserRole::Pharmacy => "pharmacy",
            UserRole::Lab => "lab",
            UserRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "patient" => Some(UserRole::Patient),
            "doctor" => Some(UserRole::Doctor),
            "pharmacy" => Some(UserRole::Pharmacy),
            "lab" => Some(UserRole::Lab),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// A platform account, identified by phone number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Row id (0 until inserted)
    pub id: i64,
    /// Phone number in E.164 form, unique
    pub phone: String,
    /// Email, unique when present
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    /// Set once an OTP has been verified
    pub is_verified: bool,
    /// YYYY-MM-DD
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub allergies: Vec<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub insurance_provider: Option<String>,
    pub insurance_number: Option<String>,
    pub profile_photo_url: Option<String>,
    pub last_login: Option<String>,
    /// When the account deletion was requested
    pub deletion_requested_at: Option<String>,
    /// Date on or after which the account is purged
    pub scheduled_deletion_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Create a new patient account.
    pub fn new(phone: impl Into<String>) -> Self {
        let now = super::now_timestamp();
        Self {
            id: 0,
            phone: phone.into(),
            email: None,
            full_name: None,
            role: UserRole::Patient,
            is_active: true,
            is_verified: false,
            date_of_birth: None,
            gender: None,
            blood_group: None,
            allergies: Vec::new(),
            city: None,
            state: None,
            pincode: None,
            location_lat: None,
            location_lng: None,
            insurance_provider: None,
            insurance_number: None,
            profile_photo_url: None,
            last_login: None,
            deletion_requested_at: None,
            scheduled_deletion_date: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.full_name = Some(name.into());
        self
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.scheduled_deletion_date.is_some()
    }
}

/// SHA-256 hex digest of an OTP. Only the digest is stored.
pub fn hash_otp(otp: &str) -> String {
    hex::encode(Sha256::digest(otp.as_bytes()))
}

/// A dependent whose care is managed from the user's account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FamilyMember {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    /// e.g. "spouse", "child", "parent"
    pub relation: String,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub phone: Option<String>,
    pub allergies: Vec<String>,
    pub medical_notes: Option<String>,
    pub created_at: String,
}

impl FamilyMember {
    pub fn new(user_id: i64, name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            name: name.into(),
            relation: relation.into(),
            age: None,
            gender: None,
            blood_group: None,
            phone: None,
            allergies: Vec::new(),
            medical_notes: None,
            created_at: super::now_timestamp(),
        }
    }
}

/// A saved delivery or collection address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    /// "home", "work", ...
    pub label: String,
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub location_lat: Option<f64>,
    pub location_lng: Option<f64>,
    pub is_default: bool,
    pub created_at: String,
}

impl Address {
    pub fn new(
        user_id: i64,
        label: impl Into<String>,
        address_line1: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        pincode: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            label: label.into(),
            address_line1: address_line1.into(),
            address_line2: None,
            city: city.into(),
            state: state.into(),
            pincode: pincode.into(),
            location_lat: None,
            location_lng: None,
            is_default: false,
            created_at: super::now_timestamp(),
        }
    }

    /// Single-line rendering used as an order delivery address.
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.address_line1.as_str()];
        if let Some(line2) = self.address_line2.as_deref() {
            parts.push(line2);
        }
        format!("{}, {}, {} {}", parts.join(", "), self.city, self.state, self.pincode)
    }
}

/// Per-channel notification toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPreferences {
    pub user_id: i64,
    pub sms_enabled: bool,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub appointment_reminders: bool,
    pub lab_test_reminders: bool,
    pub order_updates: bool,
    pub promotional: bool,
}

impl NotificationPreferences {
    /// Defaults applied to users who never saved preferences.
    pub fn defaults_for(user_id: i64) -> Self {
        Self {
            user_id,
            sms_enabled: true,
            email_enabled: true,
            push_enabled: true,
            appointment_reminders: true,
            lab_test_reminders: true,
            order_updates: true,
            promotional: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user() {
        let user = User::new("+919876543210").with_name("Rahul Kumar");
        assert_eq!(user.role, UserRole::Patient);
        assert!(user.is_active);
        assert!(!user.is_verified);
        assert!(!user.is_pending_deletion());
        assert_eq!(user.full_name.as_deref(), Some("Rahul Kumar"));
    }

    #[test]
    fn test_role_round_trip() {
        for role in [
            UserRole::Patient,
            UserRole::Doctor,
            UserRole::Pharmacy,
            UserRole::Lab,
            UserRole::Admin,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("nurse"), None);
    }

    #[test]
    fn test_hash_otp() {
        let hash = hash_otp("123456");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_otp("123456"));
        assert_ne!(hash, hash_otp("654321"));
    }

    #[test]
    fn test_address_one_line() {
        let mut address = Address::new(1, "home", "12 MG Road", "Mumbai", "Maharashtra", "400001");
        assert_eq!(address.one_line(), "12 MG Road, Mumbai, Maharashtra 400001");

        address.address_line2 = Some("Flat 4B".into());
        assert_eq!(address.one_line(), "12 MG Road, Flat 4B, Mumbai, Maharashtra 400001");
    }
}
