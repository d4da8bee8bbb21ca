//! Where raw case reports come from.

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::DataSourceError;

/// One raw row object, as found in the `records` array.
pub type Record = Map<String, Value>;

/// Fetches the raw rows of one download. A single attempt, no retries.
pub trait DataSource: Send + Sync {
    fn download_records(&self) -> Result<Vec<Record>, DataSourceError>;
}

/// Extracts the `records` array of a case distribution document, keeping
/// its order. Entries that are not objects are rejected.
pub fn parse_document(document: Value) -> Result<Vec<Record>, DataSourceError> {
    let Value::Object(mut document) = document else {
        return Err(DataSourceError::MissingRecords);
    };

    let Some(Value::Array(records)) = document.remove("records") else {
        return Err(DataSourceError::MissingRecords);
    };

    records
        .into_iter()
        .map(|record| match record {
            Value::Object(map) => Ok(map),
            _ => Err(DataSourceError::MissingRecords),
        })
        .collect()
}

/// Downloads the document over HTTP.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(feature = "http")]
impl DataSource for HttpSource {
    fn download_records(&self) -> Result<Vec<Record>, DataSourceError> {
        debug!(url = %self.url, "Fetching records");

        let document: Value = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?
            .json()?;

        parse_document(document)
    }
}

/// Reads the same document from a local file, for offline runs.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: Utf8PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl DataSource for FileSource {
    fn download_records(&self) -> Result<Vec<Record>, DataSourceError> {
        debug!(path = %self.path, "Reading records");

        let text = std::fs::read_to_string(&self.path)?;
        parse_document(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_document() {
        let records = parse_document(json!({
            "records": [
                { "countriesAndTerritories": "Germany", "cases": 10 },
                { "countriesAndTerritories": "France", "cases": 5 },
            ]
        }))
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["countriesAndTerritories"], json!("France"));
    }

    #[test]
    fn test_parse_document_errors() {
        assert!(matches!(parse_document(json!([])), Err(DataSourceError::MissingRecords)));
        assert!(matches!(
            parse_document(json!({ "rows": [] })),
            Err(DataSourceError::MissingRecords)
        ));
        assert!(matches!(
            parse_document(json!({ "records": [1, 2] })),
            Err(DataSourceError::MissingRecords)
        ));
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{ "records": [ { "year": "2021" } ] }"#).unwrap();

        let source = FileSource::new(Utf8PathBuf::from_path_buf(path).unwrap());
        let records = source.download_records().unwrap();
        assert_eq!(records[0]["year"], json!("2021"));

        let missing = FileSource::new(dir.path().join("nope.json").to_str().unwrap());
        assert!(matches!(missing.download_records(), Err(DataSourceError::Io(_))));
    }
}
