use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_DATABASE: &str = "medicare.db";
const DEFAULT_LOG_FILTER: &str = "medicare_core=info,medicare_db=info";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub log_filter: String,
}

impl Settings {
    /// Defaults, then the optional settings file, then `MEDICARE_*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("database_path", DEFAULT_DATABASE)?
            .set_default("log_filter", DEFAULT_LOG_FILTER)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("medicare").required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("MEDICARE"))
            .build()?
            .try_deserialize()
    }

    pub fn with_database(mut self, database: Option<PathBuf>) -> Self {
        if let Some(path) = database {
            self.database_path = path;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "database_path = \"/var/lib/medicare/app.db\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/var/lib/medicare/app.db"));
        assert_eq!(settings.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_flag_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        fs::write(&path, "database_path = \"from-file.db\"\nlog_filter = \"debug\"\n").unwrap();

        let settings = Settings::load(Some(&path))
            .unwrap()
            .with_database(Some(PathBuf::from("from-flag.db")));
        assert_eq!(settings.database_path, PathBuf::from("from-flag.db"));
        assert_eq!(settings.log_filter, "debug");

        let unchanged = settings.clone().with_database(None);
        assert_eq!(unchanged, settings);
    }
}
