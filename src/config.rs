//! Settings read from `epiflow.toml`.
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration. Command line flags take precedence over these values.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flow::{Countries, DEFAULT_BUCKET, DEFAULT_SOURCE_URL};

pub const DEFAULT_CONFIG_FILE: &str = "epiflow.toml";
pub const DEFAULT_CACHE_DIR: &str = ".cache/checkpoints";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// URL of the case distribution document.
    pub source_url: String,
    /// Read the document from this file instead of downloading it.
    pub source_file: Option<Utf8PathBuf>,
    /// Directory holding checkpoints.
    pub cache_dir: Utf8PathBuf,
    /// Worker threads for parallel runs. Defaults to the number of CPUs.
    pub workers: Option<usize>,
    pub country: Countries,
    pub bucket: String,
    pub storage: StorageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            source_file: None,
            cache_dir: DEFAULT_CACHE_DIR.into(),
            workers: None,
            country: Countries::default(),
            bucket: DEFAULT_BUCKET.to_string(),
            storage: StorageSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageSettings {
    /// Buckets are directories under `root`.
    Local { root: Utf8PathBuf },
    /// Objects are `PUT` to `{endpoint}/{bucket}/{object}`.
    Http { endpoint: String },
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::Local {
            root: "buckets".into(),
        }
    }
}

impl Settings {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: &Utf8Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        assert_eq!(Settings::parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_parse_full() {
        let settings = Settings::parse(
            r#"
            source_file = "data/records.json"
            cache_dir = "/tmp/checkpoints"
            workers = 2
            country = ["Germany", "Austria"]
            bucket = "reports"

            [storage]
            kind = "http"
            endpoint = "http://localhost:9000"
            "#,
        )
        .unwrap();

        assert_eq!(settings.source_url, DEFAULT_SOURCE_URL);
        assert_eq!(settings.source_file.as_deref(), Some(Utf8Path::new("data/records.json")));
        assert_eq!(settings.workers, Some(2));
        assert_eq!(
            settings.country,
            Countries::Many(vec!["Germany".into(), "Austria".into()])
        );
        assert_eq!(
            settings.storage,
            StorageSettings::Http {
                endpoint: "http://localhost:9000".into()
            }
        );
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(Settings::parse("colour = 1"), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("epiflow.toml")).unwrap();

        assert_eq!(Settings::load_or_default(&path).unwrap(), Settings::default());
        assert!(matches!(Settings::load(&path), Err(ConfigError::Io(_))));
    }
}
