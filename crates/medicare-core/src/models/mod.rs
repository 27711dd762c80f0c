//! Domain models for the MediCare platform.

mod activity;
mod appointment;
mod clinic;
mod emergency;
mod file;
mod lab;
mod order;
mod pharmacy;
mod user;

pub use activity::*;
pub use appointment::*;
pub use clinic::*;
pub use emergency::*;
pub use file::*;
pub use lab::*;
pub use order::*;
pub use pharmacy::*;
pub use user::*;

/// Timestamp format shared with SQLite's `datetime('now')`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Date format used by every `*_date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Current UTC time in the same format SQLite writes.
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Current UTC date.
pub fn today() -> chrono::NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Human-facing reference id: prefix plus 8 uppercase hex characters.
pub fn generate_reference_id(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", prefix, uuid[..8].to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_id_format() {
        let id = generate_reference_id("APT");
        assert_eq!(id.len(), 11);
        assert!(id.starts_with("APT"));
        assert!(id[3..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_reference_ids_differ() {
        assert_ne!(generate_reference_id("ORD"), generate_reference_id("ORD"));
    }

    #[test]
    fn test_now_timestamp_parses() {
        let ts = now_timestamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&ts, TIMESTAMP_FORMAT).is_ok());
    }
}
