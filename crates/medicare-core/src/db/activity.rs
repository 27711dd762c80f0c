//! Notification and audit log operations.

use rusqlite::{params, Connection};

use super::{Database, DbError, DbResult};
use crate::models::{AuditEntry, Notification};

impl Database {
    // ------------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------------

    pub fn create_notification(&self, notification: &mut Notification) -> DbResult<i64> {
        notification.id = insert_notification(&self.conn, notification)?;
        Ok(notification.id)
    }

    /// Notifications for a user, newest first.
    pub fn list_notifications(&self, user_id: i64, unread_only: bool) -> DbResult<Vec<Notification>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, title, message, notification_type,
                   related_entity_type, related_entity_id, is_read, created_at
            FROM notifications
            WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
            ORDER BY created_at DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, unread_only], |row| {
            Ok(Notification {
                id: row.get(0)?,
                user_id: row.get(1)?,
                title: row.get(2)?,
                message: row.get(3)?,
                notification_type: row.get(4)?,
                related_entity_type: row.get(5)?,
                related_entity_id: row.get(6)?,
                is_read: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn mark_notification_read(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ? AND is_read = 0",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Returns the number of notifications that changed.
    pub fn mark_all_notifications_read(&self, user_id: i64) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
            [user_id],
        )?;
        Ok(rows_affected)
    }

    pub fn unread_notification_count(&self, user_id: i64) -> DbResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ------------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------------

    /// Append an audit entry. Entries are immutable once written.
    pub fn append_audit(&self, entry: &mut AuditEntry) -> DbResult<i64> {
        entry.id = insert_audit(&self.conn, entry)?;
        Ok(entry.id)
    }

    /// Audit history of one entity, oldest first.
    pub fn list_audit_for_entity(&self, entity_type: &str, entity_id: &str) -> DbResult<Vec<AuditEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, action, entity_type, entity_id, details, created_at
            FROM audit_logs
            WHERE entity_type = ?1 AND entity_id = ?2
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map(params![entity_type, entity_id], |row| {
            Ok(AuditRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                action: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                details: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }
}

pub(crate) fn insert_notification(conn: &Connection, notification: &Notification) -> DbResult<i64> {
    conn.execute(
        r#"
        INSERT INTO notifications (
            user_id, title, message, notification_type, related_entity_type,
            related_entity_id, is_read, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            notification.user_id,
            notification.title,
            notification.message,
            notification.notification_type,
            notification.related_entity_type,
            notification.related_entity_id,
            notification.is_read,
            notification.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_audit(conn: &Connection, entry: &AuditEntry) -> DbResult<i64> {
    let details_json = serde_json::to_string(&entry.details)?;
    conn.execute(
        r#"
        INSERT INTO audit_logs (user_id, action, entity_type, entity_id, details, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            entry.user_id,
            entry.action,
            entry.entity_type,
            entry.entity_id,
            details_json,
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

struct AuditRow {
    id: i64,
    user_id: Option<i64>,
    action: String,
    entity_type: Option<String>,
    entity_id: Option<String>,
    details: String,
    created_at: String,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            details: serde_json::from_str(&row.details)?,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConstraintKind;
    use crate::models::User;

    fn setup_db() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let mut user = User::new("+919876543210");
        db.insert_user(&mut user).unwrap();
        (db, user.id)
    }

    #[test]
    fn test_notifications_read_state() {
        let (db, user_id) = setup_db();

        let mut first = Notification::new(user_id, "Appointment confirmed", "See you at 09:00", "appointment")
            .about("appointment", "APT1234ABCD");
        db.create_notification(&mut first).unwrap();
        let mut second = Notification::new(user_id, "Order shipped", "On the way", "order");
        db.create_notification(&mut second).unwrap();

        assert_eq!(db.unread_notification_count(user_id).unwrap(), 2);
        assert!(db.mark_notification_read(first.id).unwrap());
        assert!(!db.mark_notification_read(first.id).unwrap());

        let unread = db.list_notifications(user_id, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, second.id);
        assert_eq!(db.list_notifications(user_id, false).unwrap().len(), 2);

        assert_eq!(db.mark_all_notifications_read(user_id).unwrap(), 1);
        assert_eq!(db.unread_notification_count(user_id).unwrap(), 0);
    }

    #[test]
    fn test_audit_is_append_only() {
        let (db, user_id) = setup_db();

        let mut entry = AuditEntry::new(Some(user_id), "order_placed")
            .on("order", "ORD0000AAAA")
            .with_details(serde_json::json!({ "total": 150 }));
        db.append_audit(&mut entry).unwrap();

        let err: DbError = db
            .conn()
            .execute("UPDATE audit_logs SET action = 'edited'", [])
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Trigger));

        let history = db.list_audit_for_entity("order", "ORD0000AAAA").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].details["total"], 150);
    }

    #[test]
    fn test_audit_survives_user_deletion() {
        let (db, user_id) = setup_db();

        let mut entry = AuditEntry::new(Some(user_id), "login").on("user", user_id.to_string());
        db.append_audit(&mut entry).unwrap();
        let mut note = Notification::new(user_id, "Welcome", "Hello", "system");
        db.create_notification(&mut note).unwrap();

        db.delete_user(user_id).unwrap();

        let history = db.list_audit_for_entity("user", &user_id.to_string()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_id, None);
        assert_eq!(db.unread_notification_count(user_id).unwrap(), 0);
    }
}
