//! User, family, address and preference operations.

use chrono::{Duration, NaiveDate};
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use super::{Database, DbError, DbResult};
use crate::models::{
    hash_otp, now_timestamp, Address, FamilyMember, NotificationPreferences, User, UserRole,
    DATE_FORMAT,
};

/// Days between a deletion request and the purge.
pub const ACCOUNT_DELETION_GRACE_DAYS: i64 = 30;

const USER_COLUMNS: &str = r#"
    id, phone, email, full_name, role, is_active, is_verified, date_of_birth,
    gender, blood_group, allergies, city, state, pincode, location_lat, location_lng,
    insurance_provider, insurance_number, profile_photo_url, last_login,
    deletion_requested_at, scheduled_deletion_date, created_at, updated_at
"#;

impl Database {
    /// Insert a new user. Sets `user.id` to the new row id.
    pub fn insert_user(&self, user: &mut User) -> DbResult<i64> {
        let allergies_json = serde_json::to_string(&user.allergies)?;

        self.conn.execute(
            r#"
            INSERT INTO users (
                phone, email, full_name, role, is_active, is_verified, date_of_birth,
                gender, blood_group, allergies, city, state, pincode, location_lat,
                location_lng, insurance_provider, insurance_number, profile_photo_url,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            "#,
            params![
                user.phone,
                user.email,
                user.full_name,
                user.role.as_str(),
                user.is_active,
                user.is_verified,
                user.date_of_birth,
                user.gender,
                user.blood_group,
                allergies_json,
                user.city,
                user.state,
                user.pincode,
                user.location_lat,
                user.location_lng,
                user.insurance_provider,
                user.insurance_number,
                user.profile_photo_url,
                user.created_at,
                user.updated_at,
            ],
        )?;
        user.id = self.conn.last_insert_rowid();
        debug!(user_id = user.id, "inserted user");
        Ok(user.id)
    }

    /// Get a user by id.
    pub fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS),
                [id],
                read_user_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Get a user by phone number.
    pub fn get_user_by_phone(&self, phone: &str) -> DbResult<Option<User>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM users WHERE phone = ?", USER_COLUMNS),
                [phone],
                read_user_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Update profile fields. Phone and role are not changed here.
    pub fn update_user_profile(&self, user: &User) -> DbResult<bool> {
        let allergies_json = serde_json::to_string(&user.allergies)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                email = ?2,
                full_name = ?3,
                date_of_birth = ?4,
                gender = ?5,
                blood_group = ?6,
                allergies = ?7,
                city = ?8,
                state = ?9,
                pincode = ?10,
                location_lat = ?11,
                location_lng = ?12,
                insurance_provider = ?13,
                insurance_number = ?14,
                profile_photo_url = ?15,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                user.id,
                user.email,
                user.full_name,
                user.date_of_birth,
                user.gender,
                user.blood_group,
                allergies_json,
                user.city,
                user.state,
                user.pincode,
                user.location_lat,
                user.location_lng,
                user.insurance_provider,
                user.insurance_number,
                user.profile_photo_url,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Hard-delete a user and everything that cascades from it.
    pub fn delete_user(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM users WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    // ------------------------------------------------------------------------
    // OTP
    // ------------------------------------------------------------------------

    /// Store a pending OTP (hashed) with its expiry timestamp.
    pub fn set_user_otp(&self, user_id: i64, otp: &str, expires_at: &str) -> DbResult<()> {
        let rows_affected = self.conn.execute(
            "UPDATE users SET otp_hash = ?2, otp_expires_at = ?3, updated_at = datetime('now') WHERE id = ?1",
            params![user_id, hash_otp(otp), expires_at],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("user {}", user_id)));
        }
        Ok(())
    }

    /// The stored OTP hash, if one exists and has not expired at `now`.
    pub fn get_valid_otp_hash(&self, user_id: i64, now: &str) -> DbResult<Option<String>> {
        let hash: Option<Option<String>> = self
            .conn
            .query_row(
                r#"
                SELECT otp_hash FROM users
                WHERE id = ?1 AND otp_hash IS NOT NULL AND otp_expires_at > ?2
                "#,
                params![user_id, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hash.flatten())
    }

    /// Clear OTP state after a successful verification.
    pub fn clear_user_otp(&self, user_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                otp_hash = NULL,
                otp_expires_at = NULL,
                is_verified = 1,
                last_login = datetime('now'),
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            [user_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Check `otp` against the stored hash; clears it on success.
    pub fn verify_user_otp(&self, user_id: i64, otp: &str, now: &str) -> DbResult<bool> {
        match self.get_valid_otp_hash(user_id, now)? {
            Some(stored) if stored == hash_otp(otp) => self.clear_user_otp(user_id),
            _ => Ok(false),
        }
    }

    // ------------------------------------------------------------------------
    // Account deletion
    // ------------------------------------------------------------------------

    /// Schedule the account for deletion. Returns the purge date.
    pub fn request_account_deletion(&self, user_id: i64, today: NaiveDate) -> DbResult<NaiveDate> {
        let scheduled = today + Duration::days(ACCOUNT_DELETION_GRACE_DAYS);
        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                deletion_requested_at = ?2,
                scheduled_deletion_date = ?3,
                updated_at = datetime('now')
            WHERE id = ?1
            "#,
            params![
                user_id,
                now_timestamp(),
                scheduled.format(DATE_FORMAT).to_string()
            ],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!("user {}", user_id)));
        }
        info!(user_id, scheduled = %scheduled, "account deletion requested");
        Ok(scheduled)
    }

    pub fn cancel_account_deletion(&self, user_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE users SET
                deletion_requested_at = NULL,
                scheduled_deletion_date = NULL,
                updated_at = datetime('now')
            WHERE id = ?1 AND scheduled_deletion_date IS NOT NULL
            "#,
            [user_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Hard-delete every user whose scheduled deletion date is on or before `as_of`.
    pub fn purge_scheduled_deletions(&self, as_of: NaiveDate) -> DbResult<Vec<i64>> {
        let as_of = as_of.format(DATE_FORMAT).to_string();
        let tx = self.begin()?;

        let ids: Vec<i64> = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id FROM users
                WHERE scheduled_deletion_date IS NOT NULL AND scheduled_deletion_date <= ?1
                ORDER BY id
                "#,
            )?;
            let rows = stmt.query_map([&as_of], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        for id in &ids {
            tx.execute("DELETE FROM users WHERE id = ?", [id])?;
        }
        tx.commit()?;

        info!(count = ids.len(), as_of = %as_of, "purged scheduled account deletions");
        Ok(ids)
    }

    // ------------------------------------------------------------------------
    // Family members
    // ------------------------------------------------------------------------

    pub fn add_family_member(&self, member: &mut FamilyMember) -> DbResult<i64> {
        let allergies_json = serde_json::to_string(&member.allergies)?;
        self.conn.execute(
            r#"
            INSERT INTO family_members (
                user_id, name, relation, age, gender, blood_group, phone,
                allergies, medical_notes, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
            params![
                member.user_id,
                member.name,
                member.relation,
                member.age,
                member.gender,
                member.blood_group,
                member.phone,
                allergies_json,
                member.medical_notes,
                member.created_at,
            ],
        )?;
        member.id = self.conn.last_insert_rowid();
        Ok(member.id)
    }

    pub fn list_family_members(&self, user_id: i64) -> DbResult<Vec<FamilyMember>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, name, relation, age, gender, blood_group, phone,
                   allergies, medical_notes, created_at
            FROM family_members
            WHERE user_id = ?
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([user_id], |row| {
            Ok(FamilyMemberRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                relation: row.get(3)?,
                age: row.get(4)?,
                gender: row.get(5)?,
                blood_group: row.get(6)?,
                phone: row.get(7)?,
                allergies: row.get(8)?,
                medical_notes: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?.try_into()?);
        }
        Ok(members)
    }

    pub fn delete_family_member(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM family_members WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    // ------------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------------

    /// Add an address. A new default address demotes the previous one.
    pub fn add_address(&self, address: &mut Address) -> DbResult<i64> {
        let tx = self.begin()?;
        if address.is_default {
            tx.execute(
                "UPDATE addresses SET is_default = 0, updated_at = datetime('now') WHERE user_id = ? AND is_default = 1",
                [address.user_id],
            )?;
        }
        tx.execute(
            r#"
            INSERT INTO addresses (
                user_id, label, address_line1, address_line2, city, state, pincode,
                location_lat, location_lng, is_default, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
            params![
                address.user_id,
                address.label,
                address.address_line1,
                address.address_line2,
                address.city,
                address.state,
                address.pincode,
                address.location_lat,
                address.location_lng,
                address.is_default,
                address.created_at,
            ],
        )?;
        address.id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(address.id)
    }

    /// Addresses for a user, default first.
    pub fn list_addresses(&self, user_id: i64) -> DbResult<Vec<Address>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, label, address_line1, address_line2, city, state,
                   pincode, location_lat, location_lng, is_default, created_at
            FROM addresses
            WHERE user_id = ?
            ORDER BY is_default DESC, id
            "#,
        )?;
        let rows = stmt.query_map([user_id], read_address)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Make `address_id` the user's only default address.
    pub fn set_default_address(&self, user_id: i64, address_id: i64) -> DbResult<()> {
        let tx = self.begin()?;
        tx.execute(
            "UPDATE addresses SET is_default = 0, updated_at = datetime('now') WHERE user_id = ? AND is_default = 1",
            [user_id],
        )?;
        let rows_affected = tx.execute(
            "UPDATE addresses SET is_default = 1, updated_at = datetime('now') WHERE id = ?1 AND user_id = ?2",
            params![address_id, user_id],
        )?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(format!(
                "address {} for user {}",
                address_id, user_id
            )));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn delete_address(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM addresses WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    // ------------------------------------------------------------------------
    // Notification preferences
    // ------------------------------------------------------------------------

    /// Saved preferences, or the defaults when none were saved.
    pub fn get_notification_preferences(&self, user_id: i64) -> DbResult<NotificationPreferences> {
        let prefs = self
            .conn
            .query_row(
                r#"
                SELECT user_id, sms_enabled, email_enabled, push_enabled,
                       appointment_reminders, lab_test_reminders, order_updates, promotional
                FROM notification_preferences
                WHERE user_id = ?
                "#,
                [user_id],
                |row| {
                    Ok(NotificationPreferences {
                        user_id: row.get(0)?,
                        sms_enabled: row.get(1)?,
                        email_enabled: row.get(2)?,
                        push_enabled: row.get(3)?,
                        appointment_reminders: row.get(4)?,
                        lab_test_reminders: row.get(5)?,
                        order_updates: row.get(6)?,
                        promotional: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(prefs.unwrap_or_else(|| NotificationPreferences::defaults_for(user_id)))
    }

    pub fn upsert_notification_preferences(&self, prefs: &NotificationPreferences) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO notification_preferences (
                user_id, sms_enabled, email_enabled, push_enabled,
                appointment_reminders, lab_test_reminders, order_updates, promotional, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
            ON CONFLICT(user_id) DO UPDATE SET
                sms_enabled = excluded.sms_enabled,
                email_enabled = excluded.email_enabled,
                push_enabled = excluded.push_enabled,
                appointment_reminders = excluded.appointment_reminders,
                lab_test_reminders = excluded.lab_test_reminders,
                order_updates = excluded.order_updates,
                promotional = excluded.promotional,
                updated_at = datetime('now')
            "#,
            params![
                prefs.user_id,
                prefs.sms_enabled,
                prefs.email_enabled,
                prefs.push_enabled,
                prefs.appointment_reminders,
                prefs.lab_test_reminders,
                prefs.order_updates,
                prefs.promotional,
            ],
        )?;
        Ok(())
    }
}

/// Intermediate row struct for database mapping.
struct UserRow {
    id: i64,
    phone: String,
    email: Option<String>,
    full_name: Option<String>,
    role: String,
    is_active: bool,
    is_verified: bool,
    date_of_birth: Option<String>,
    gender: Option<String>,
    blood_group: Option<String>,
    allergies: String,
    city: Option<String>,
    state: Option<String>,
    pincode: Option<String>,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    insurance_provider: Option<String>,
    insurance_number: Option<String>,
    profile_photo_url: Option<String>,
    last_login: Option<String>,
    deletion_requested_at: Option<String>,
    scheduled_deletion_date: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        phone: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        role: row.get(4)?,
        is_active: row.get(5)?,
        is_verified: row.get(6)?,
        date_of_birth: row.get(7)?,
        gender: row.get(8)?,
        blood_group: row.get(9)?,
        allergies: row.get(10)?,
        city: row.get(11)?,
        state: row.get(12)?,
        pincode: row.get(13)?,
        location_lat: row.get(14)?,
        location_lng: row.get(15)?,
        insurance_provider: row.get(16)?,
        insurance_number: row.get(17)?,
        profile_photo_url: row.get(18)?,
        last_login: row.get(19)?,
        deletion_requested_at: row.get(20)?,
        scheduled_deletion_date: row.get(21)?,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
    })
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = UserRole::parse(&row.role)
            .ok_or_else(|| DbError::InvalidState(format!("unknown user role '{}'", row.role)))?;

        Ok(User {
            id: row.id,
            phone: row.phone,
            email: row.email,
            full_name: row.full_name,
            role,
            is_active: row.is_active,
            is_verified: row.is_verified,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            blood_group: row.blood_group,
            allergies: serde_json::from_str(&row.allergies)?,
            city: row.city,
            state: row.state,
            pincode: row.pincode,
            location_lat: row.location_lat,
            location_lng: row.location_lng,
            insurance_provider: row.insurance_provider,
            insurance_number: row.insurance_number,
            profile_photo_url: row.profile_photo_url,
            last_login: row.last_login,
            deletion_requested_at: row.deletion_requested_at,
            scheduled_deletion_date: row.scheduled_deletion_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

struct FamilyMemberRow {
    id: i64,
    user_id: i64,
    name: String,
    relation: String,
    age: Option<i64>,
    gender: Option<String>,
    blood_group: Option<String>,
    phone: Option<String>,
    allergies: String,
    medical_notes: Option<String>,
    created_at: String,
}

impl TryFrom<FamilyMemberRow> for FamilyMember {
    type Error = DbError;

    fn try_from(row: FamilyMemberRow) -> Result<Self, Self::Error> {
        Ok(FamilyMember {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            relation: row.relation,
            age: row.age,
            gender: row.gender,
            blood_group: row.blood_group,
            phone: row.phone,
            allergies: serde_json::from_str(&row.allergies)?,
            medical_notes: row.medical_notes,
            created_at: row.created_at,
        })
    }
}

fn read_address(row: &Row<'_>) -> rusqlite::Result<Address> {
    Ok(Address {
        id: row.get(0)?,
        user_id: row.get(1)?,
        label: row.get(2)?,
        address_line1: row.get(3)?,
        address_line2: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        pincode: row.get(7)?,
        location_lat: row.get(8)?,
        location_lng: row.get(9)?,
        is_default: row.get(10)?,
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ConstraintKind;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn new_user(db: &Database, phone: &str) -> User {
        let mut user = User::new(phone).with_name("Rahul Kumar");
        db.insert_user(&mut user).unwrap();
        user
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut user = User::new("+919876543210");
        user.email = Some("rahul@example.com".into());
        user.allergies = vec!["penicillin".into()];
        let id = db.insert_user(&mut user).unwrap();
        assert!(id > 0);

        let by_id = db.get_user(id).unwrap().unwrap();
        assert_eq!(by_id.phone, "+919876543210");
        assert_eq!(by_id.allergies, vec!["penicillin".to_string()]);
        assert_eq!(by_id.role, UserRole::Patient);

        let by_phone = db.get_user_by_phone("+919876543210").unwrap().unwrap();
        assert_eq!(by_phone.id, id);
        assert!(db.get_user_by_phone("+910000000000").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_phone_and_email() {
        let db = setup_db();
        let mut first = User::new("+919876543210");
        first.email = Some("a@example.com".into());
        db.insert_user(&mut first).unwrap();

        let err = db.insert_user(&mut User::new("+919876543210")).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));

        let mut same_email = User::new("+919876543211");
        same_email.email = Some("a@example.com".into());
        let err = db.insert_user(&mut same_email).unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));

        // NULL emails never collide
        db.insert_user(&mut User::new("+919876543212")).unwrap();
        db.insert_user(&mut User::new("+919876543213")).unwrap();
    }

    #[test]
    fn test_update_profile() {
        let db = setup_db();
        let mut user = new_user(&db, "+919876543210");

        user.city = Some("Mumbai".into());
        user.blood_group = Some("O+".into());
        assert!(db.update_user_profile(&user).unwrap());

        let retrieved = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(retrieved.city.as_deref(), Some("Mumbai"));
        assert_eq!(retrieved.blood_group.as_deref(), Some("O+"));
    }

    #[test]
    fn test_otp_flow() {
        let db = setup_db();
        let user = new_user(&db, "+919876543210");

        db.set_user_otp(user.id, "123456", "2030-01-01 00:10:00").unwrap();
        assert!(db
            .get_valid_otp_hash(user.id, "2030-01-01 00:05:00")
            .unwrap()
            .is_some());

        assert!(!db.verify_user_otp(user.id, "000000", "2030-01-01 00:05:00").unwrap());
        assert!(db.verify_user_otp(user.id, "123456", "2030-01-01 00:05:00").unwrap());

        let verified = db.get_user(user.id).unwrap().unwrap();
        assert!(verified.is_verified);
        assert!(verified.last_login.is_some());
        assert!(db
            .get_valid_otp_hash(user.id, "2030-01-01 00:05:00")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_expired_otp() {
        let db = setup_db();
        let user = new_user(&db, "+919876543210");

        db.set_user_otp(user.id, "123456", "2024-01-01 00:10:00").unwrap();
        assert!(!db.verify_user_otp(user.id, "123456", "2024-01-01 00:10:01").unwrap());
        assert!(db.set_user_otp(9999, "1", "2024-01-01 00:00:00").is_err());
    }

    #[test]
    fn test_deletion_schedule_and_purge() {
        let db = setup_db();
        let keep = new_user(&db, "+919876543210");
        let leave = new_user(&db, "+919876543211");

        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let scheduled = db.request_account_deletion(leave.id, today).unwrap();
        assert_eq!(scheduled, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());

        // Not yet due
        let purged = db.purge_scheduled_deletions(today).unwrap();
        assert!(purged.is_empty());

        let purged = db.purge_scheduled_deletions(scheduled).unwrap();
        assert_eq!(purged, vec![leave.id]);
        assert!(db.get_user(leave.id).unwrap().is_none());
        assert!(db.get_user(keep.id).unwrap().is_some());
    }

    #[test]
    fn test_cancel_deletion() {
        let db = setup_db();
        let user = new_user(&db, "+919876543210");
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        db.request_account_deletion(user.id, today).unwrap();
        assert!(db.get_user(user.id).unwrap().unwrap().is_pending_deletion());
        assert!(db.cancel_account_deletion(user.id).unwrap());
        assert!(!db.cancel_account_deletion(user.id).unwrap());

        let far_future = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        assert!(db.purge_scheduled_deletions(far_future).unwrap().is_empty());
    }

    #[test]
    fn test_family_members() {
        let db = setup_db();
        let user = new_user(&db, "+919876543210");

        let mut member = FamilyMember::new(user.id, "Asha Kumar", "mother");
        member.age = Some(58);
        member.allergies = vec!["sulfa".into()];
        db.add_family_member(&mut member).unwrap();

        let members = db.list_family_members(user.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].allergies, vec!["sulfa".to_string()]);

        assert!(db.delete_family_member(member.id).unwrap());
        assert!(db.list_family_members(user.id).unwrap().is_empty());
    }

    #[test]
    fn test_single_default_address() {
        let db = setup_db();
        let user = new_user(&db, "+919876543210");

        let mut home = Address::new(user.id, "home", "12 MG Road", "Mumbai", "MH", "400001");
        home.is_default = true;
        db.add_address(&mut home).unwrap();

        let mut work = Address::new(user.id, "work", "BKC", "Mumbai", "MH", "400051");
        work.is_default = true;
        db.add_address(&mut work).unwrap();

        let addresses = db.list_addresses(user.id).unwrap();
        assert_eq!(addresses.iter().filter(|a| a.is_default).count(), 1);
        assert_eq!(addresses[0].id, work.id);

        db.set_default_address(user.id, home.id).unwrap();
        let addresses = db.list_addresses(user.id).unwrap();
        assert_eq!(addresses.iter().filter(|a| a.is_default).count(), 1);
        assert_eq!(addresses[0].id, home.id);

        // Raw insert of a second default is rejected by the partial unique index
        let err: DbError = db
            .conn()
            .execute(
                "INSERT INTO addresses (user_id, label, address_line1, city, state, pincode, is_default)
                 VALUES (?1, 'x', 'y', 'c', 's', 'p', 1)",
                [user.id],
            )
            .unwrap_err()
            .into();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));
    }

    #[test]
    fn test_set_default_address_wrong_user() {
        let db = setup_db();
        let owner = new_user(&db, "+919876543210");
        let other = new_user(&db, "+919876543211");

        let mut home = Address::new(owner.id, "home", "12 MG Road", "Mumbai", "MH", "400001");
        db.add_address(&mut home).unwrap();

        let result = db.set_default_address(other.id, home.id);
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_notification_preferences() {
        let db = setup_db();
        let user = new_user(&db, "+919876543210");

        let prefs = db.get_notification_preferences(user.id).unwrap();
        assert_eq!(prefs, NotificationPreferences::defaults_for(user.id));

        let mut updated = prefs.clone();
        updated.sms_enabled = false;
        updated.promotional = true;
        db.upsert_notification_preferences(&updated).unwrap();
        db.upsert_notification_preferences(&updated).unwrap();

        assert_eq!(db.get_notification_preferences(user.id).unwrap(), updated);
    }
}
