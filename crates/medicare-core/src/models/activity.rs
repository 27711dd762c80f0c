//! Notification and audit log models.

use serde::{Deserialize, Serialize};

/// An in-app notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    /// appointment, order, lab_test, emergency, ...
    pub notification_type: String,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl Notification {
    pub fn new(
        user_id: i64,
        title: impl Into<String>,
        message: impl Into<String>,
        notification_type: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            title: title.into(),
            message: message.into(),
            notification_type: notification_type.into(),
            related_entity_type: None,
            related_entity_id: None,
            is_read: false,
            created_at: super::now_timestamp(),
        }
    }

    pub fn about(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.related_entity_type = Some(entity_type.into());
        self.related_entity_id = Some(entity_id.into());
        self
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: i64,
    /// Cleared when the acting user is deleted
    pub user_id: Option<i64>,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: String,
}

impl AuditEntry {
    pub fn new(user_id: Option<i64>, action: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            action: action.into(),
            entity_type: None,
            entity_id: None,
            details: serde_json::Value::Object(Default::default()),
            created_at: super::now_timestamp(),
        }
    }

    pub fn on(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
