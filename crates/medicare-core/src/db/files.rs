//! Uploaded file metadata operations.

use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

use super::{Database, DbError, DbResult};
use crate::models::{FileCategory, UploadedFile};

const FILE_COLUMNS: &str = r#"
    id, user_id, appointment_id, filename, stored_filename, file_path, file_url,
    file_size, file_hash, file_type, category, description, is_active, created_at,
    deleted_at
"#;

impl Database {
    /// Record an upload.
    ///
    /// If the user already has an active file with the same content hash the
    /// existing record is returned and nothing is written. Files over the
    /// category's size limit are rejected.
    pub fn record_upload(&self, file: &mut UploadedFile) -> DbResult<i64> {
        let limit = file.category.max_size();
        if file.file_size > limit {
            return Err(DbError::InvalidState(format!(
                "{} bytes exceeds the {} limit of {} bytes",
                file.file_size,
                file.category.as_str(),
                limit
            )));
        }

        if let Some(existing) = self.find_active_duplicate(file.user_id, &file.file_hash)? {
            debug!(file_id = existing.id, "duplicate upload");
            *file = existing;
            return Ok(file.id);
        }

        self.conn.execute(
            r#"
            INSERT INTO uploaded_files (
                user_id, appointment_id, filename, stored_filename, file_path, file_url,
                file_size, file_hash, file_type, category, description, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12)
            "#,
            params![
                file.user_id,
                file.appointment_id,
                file.filename,
                file.stored_filename,
                file.file_path,
                file.file_url,
                file.file_size,
                file.file_hash,
                file.file_type,
                file.category.as_str(),
                file.description,
                file.created_at,
            ],
        )?;
        file.id = self.conn.last_insert_rowid();
        file.is_active = true;
        file.deleted_at = None;
        Ok(file.id)
    }

    pub fn get_file(&self, id: i64) -> DbResult<Option<UploadedFile>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM uploaded_files WHERE id = ?", FILE_COLUMNS),
                [id],
                read_file,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn find_active_duplicate(&self, user_id: i64, file_hash: &str) -> DbResult<Option<UploadedFile>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM uploaded_files WHERE user_id = ?1 AND file_hash = ?2 AND is_active = 1 ORDER BY id LIMIT 1",
                    FILE_COLUMNS
                ),
                params![user_id, file_hash],
                read_file,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Active files for a user, newest first.
    pub fn list_active_files(&self, user_id: i64, category: Option<FileCategory>) -> DbResult<Vec<UploadedFile>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"
            SELECT {} FROM uploaded_files
            WHERE user_id = ?1 AND is_active = 1 AND (?2 IS NULL OR category = ?2)
            ORDER BY created_at DESC, id DESC
            "#,
            FILE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![user_id, category.map(|c| c.as_str())], read_file)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Hide a file from listings. The row is kept.
    pub fn soft_delete_file(&self, id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE uploaded_files SET is_active = 0, deleted_at = datetime('now') WHERE id = ? AND is_active = 1",
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Bring a soft-deleted file back. Refused while the same content is
    /// active under another record, so (user, hash) stays unique among
    /// active files.
    pub fn restore_file(&self, id: i64) -> DbResult<bool> {
        let file = match self.get_file(id)? {
            Some(file) if !file.is_active => file,
            _ => return Ok(false),
        };

        if let Some(existing) = self.find_active_duplicate(file.user_id, &file.file_hash)? {
            return Err(DbError::InvalidState(format!(
                "file {} has the same content as active file {}",
                id, existing.id
            )));
        }

        let rows_affected = self.conn.execute(
            "UPDATE uploaded_files SET is_active = 1, deleted_at = NULL WHERE id = ? AND is_active = 0",
            [id],
        )?;
        Ok(rows_affected > 0)
    }
}

fn read_file(row: &Row<'_>) -> rusqlite::Result<UploadedFile> {
    let category: String = row.get(10)?;
    Ok(UploadedFile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        appointment_id: row.get(2)?,
        filename: row.get(3)?,
        stored_filename: row.get(4)?,
        file_path: row.get(5)?,
        file_url: row.get(6)?,
        file_size: row.get(7)?,
        file_hash: row.get(8)?,
        file_type: row.get(9)?,
        category: FileCategory::parse(&category),
        description: row.get(11)?,
        is_active: row.get(12)?,
        created_at: row.get(13)?,
        deleted_at: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let mut user = User::new("+919876543210");
        db.insert_user(&mut user).unwrap();
        (db, user.id)
    }

    #[test]
    fn test_record_and_list() {
        let (db, user_id) = setup();

        let mut report = UploadedFile::from_contents(user_id, "cbc.pdf", "application/pdf", FileCategory::Report, b"cbc");
        db.record_upload(&mut report).unwrap();
        let mut rx = UploadedFile::from_contents(user_id, "rx.jpg", "image/jpeg", FileCategory::Prescription, b"rx");
        db.record_upload(&mut rx).unwrap();

        assert_eq!(db.list_active_files(user_id, None).unwrap().len(), 2);
        let reports = db.list_active_files(user_id, Some(FileCategory::Report)).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].filename, "cbc.pdf");
    }

    #[test]
    fn test_duplicate_returns_existing() {
        let (db, user_id) = setup();

        let mut first = UploadedFile::from_contents(user_id, "a.pdf", "application/pdf", FileCategory::Report, b"same");
        let first_id = db.record_upload(&mut first).unwrap();

        let mut again = UploadedFile::from_contents(user_id, "b.pdf", "application/pdf", FileCategory::Report, b"same");
        let again_id = db.record_upload(&mut again).unwrap();

        assert_eq!(first_id, again_id);
        assert_eq!(again.filename, "a.pdf");
        assert_eq!(db.list_active_files(user_id, None).unwrap().len(), 1);
    }

    #[test]
    fn test_deleted_file_is_not_a_duplicate() {
        let (db, user_id) = setup();

        let mut first = UploadedFile::from_contents(user_id, "a.pdf", "application/pdf", FileCategory::Report, b"same");
        db.record_upload(&mut first).unwrap();
        assert!(db.soft_delete_file(first.id).unwrap());
        assert!(!db.soft_delete_file(first.id).unwrap());

        let deleted = db.get_file(first.id).unwrap().unwrap();
        assert!(!deleted.is_active);
        assert!(deleted.deleted_at.is_some());

        let mut again = UploadedFile::from_contents(user_id, "a.pdf", "application/pdf", FileCategory::Report, b"same");
        let again_id = db.record_upload(&mut again).unwrap();
        assert_ne!(again_id, first.id);
    }

    #[test]
    fn test_restore() {
        let (db, user_id) = setup();

        let mut file = UploadedFile::from_contents(user_id, "a.pdf", "application/pdf", FileCategory::Report, b"a");
        db.record_upload(&mut file).unwrap();
        assert!(!db.restore_file(file.id).unwrap());
        assert!(!db.restore_file(9999).unwrap());

        db.soft_delete_file(file.id).unwrap();
        assert!(db.restore_file(file.id).unwrap());
        let restored = db.get_file(file.id).unwrap().unwrap();
        assert!(restored.is_active);
        assert!(restored.deleted_at.is_none());
    }

    #[test]
    fn test_restore_refused_when_content_is_active_again() {
        let (db, user_id) = setup();

        let mut first = UploadedFile::from_contents(user_id, "a.pdf", "application/pdf", FileCategory::Report, b"same");
        db.record_upload(&mut first).unwrap();
        db.soft_delete_file(first.id).unwrap();

        let mut again = UploadedFile::from_contents(user_id, "b.pdf", "application/pdf", FileCategory::Report, b"same");
        db.record_upload(&mut again).unwrap();

        assert!(matches!(db.restore_file(first.id), Err(DbError::InvalidState(_))));
        assert!(!db.get_file(first.id).unwrap().unwrap().is_active);

        let active = db.list_active_files(user_id, None).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, again.id);

        // Once the newer copy is gone the old one can come back
        db.soft_delete_file(again.id).unwrap();
        assert!(db.restore_file(first.id).unwrap());
    }

    #[test]
    fn test_size_limit() {
        let (db, user_id) = setup();

        let mut photo = UploadedFile::from_contents(user_id, "me.png", "image/png", FileCategory::Profile, b"png");
        photo.file_size = FileCategory::Profile.max_size() + 1;
        assert!(matches!(db.record_upload(&mut photo), Err(DbError::InvalidState(_))));

        photo.file_size = FileCategory::Profile.max_size();
        assert!(db.record_upload(&mut photo).is_ok());
    }

    #[test]
    fn test_files_follow_user_deletion() {
        let (db, user_id) = setup();
        let mut file = UploadedFile::from_contents(user_id, "x.pdf", "application/pdf", FileCategory::General, b"x");
        db.record_upload(&mut file).unwrap();

        db.delete_user(user_id).unwrap();
        assert!(db.get_file(file.id).unwrap().is_none());
    }
}
