//! Uploaded file metadata.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Upload category. Each has its own size ceiling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Prescription,
    Report,
    Profile,
    Insurance,
    General,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Prescription => "prescription",
            FileCategory::Report => "report",
            FileCategory::Profile => "profile",
            FileCategory::Insurance => "insurance",
            FileCategory::General => "general",
        }
    }

    /// Unknown categories are treated as general.
    pub fn parse(s: &str) -> Self {
        match s {
            "prescription" => FileCategory::Prescription,
            "report" => FileCategory::Report,
            "profile" => FileCategory::Profile,
            "insurance" => FileCategory::Insurance,
            _ => FileCategory::General,
        }
    }

    /// Maximum accepted size in bytes.
    pub fn max_size(&self) -> i64 {
        const MB: i64 = 1024 * 1024;
        match self {
            FileCategory::Report => 20 * MB,
            FileCategory::Profile | FileCategory::Insurance => 5 * MB,
            FileCategory::Prescription | FileCategory::General => 10 * MB,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    pub id: i64,
    pub user_id: i64,
    pub appointment_id: Option<String>,
    /// Name as uploaded
    pub filename: String,
    /// Name on disk
    pub stored_filename: String,
    pub file_path: String,
    pub file_url: String,
    pub file_size: i64,
    /// SHA-256 hex of the contents
    pub file_hash: String,
    /// MIME type
    pub file_type: String,
    pub category: FileCategory,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl UploadedFile {
    /// Build metadata for `contents`; the hash and size come from the bytes.
    pub fn from_contents(
        user_id: i64,
        filename: impl Into<String>,
        file_type: impl Into<String>,
        category: FileCategory,
        contents: &[u8],
    ) -> Self {
        let filename = filename.into();
        let file_hash = hash_contents(contents);
        let now = chrono::Utc::now();
        let extension = std::path::Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();
        let stored_filename = format!("{}_{}{}", now.format("%Y%m%d_%H%M%S"), &file_hash[..12], extension);
        let dir = format!("{}/{}/{}", category.as_str(), user_id, now.format("%Y/%m"));

        Self {
            id: 0,
            user_id,
            appointment_id: None,
            filename,
            file_path: format!("uploads/{}/{}", dir, stored_filename),
            file_url: format!("/api/uploads/{}/{}", dir, stored_filename),
            stored_filename,
            file_size: contents.len() as i64,
            file_hash,
            file_type: file_type.into(),
            category,
            description: None,
            is_active: true,
            created_at: now.format(super::TIMESTAMP_FORMAT).to_string(),
            deleted_at: None,
        }
    }
}

/// SHA-256 hex digest of file contents.
pub fn hash_contents(contents: &[u8]) -> String {
    hex::encode(Sha256::digest(contents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_contents() {
        let file = UploadedFile::from_contents(7, "Report.PDF", "application/pdf", FileCategory::Report, b"%PDF-1.4");
        assert_eq!(file.file_size, 8);
        assert_eq!(file.file_hash, hash_contents(b"%PDF-1.4"));
        assert!(file.stored_filename.ends_with(".pdf"));
        assert!(file.file_path.starts_with("uploads/report/7/"));
        assert!(file.file_url.starts_with("/api/uploads/report/7/"));
    }

    #[test]
    fn test_category_limits() {
        assert_eq!(FileCategory::Report.max_size(), 20 * 1024 * 1024);
        assert_eq!(FileCategory::parse("unknown"), FileCategory::General);
        assert_eq!(FileCategory::parse("profile").max_size(), 5 * 1024 * 1024);
    }
}
