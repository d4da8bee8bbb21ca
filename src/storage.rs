//! Where the finished CSV goes.

use std::borrow::Cow;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::UploadError;

/// The terminal artifact of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub content: String,
    pub object_name: String,
    pub bucket: String,
}

/// An object store. A single attempt, no retries.
pub trait Storage: Send + Sync {
    fn upload(&self, content: &str, object_name: &str, bucket: &str) -> Result<(), UploadError>;
}

/// Names end up in paths and URLs, so they must be a single plain segment.
fn check_name(name: &str) -> Result<(), UploadError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);

    if valid {
        Ok(())
    } else {
        Err(UploadError::InvalidName(name.to_string()))
    }
}

/// Object names carry an ISO timestamp, and `:` is not allowed in Windows
/// file names.
fn file_name(object_name: &str, windows: bool) -> Cow<'_, str> {
    if windows && object_name.contains(':') {
        Cow::Owned(object_name.replace(':', "-"))
    } else {
        Cow::Borrowed(object_name)
    }
}

/// Treats each bucket as a directory under `root`. On Windows `:` in object
/// names is written as `-`.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: Utf8PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl Storage for LocalStorage {
    fn upload(&self, content: &str, object_name: &str, bucket: &str) -> Result<(), UploadError> {
        check_name(bucket)?;
        check_name(object_name)?;

        let dir = self.root.join(bucket);
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(&*file_name(object_name, cfg!(windows)));
        std::fs::write(&path, content)?;

        info!(%path, bytes = content.len(), "Stored object");
        Ok(())
    }
}

/// Sends `PUT {endpoint}/{bucket}/{object}` with the content as body.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpStorage {
    endpoint: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpStorage {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }
}

#[cfg(feature = "http")]
impl Storage for HttpStorage {
    fn upload(&self, content: &str, object_name: &str, bucket: &str) -> Result<(), UploadError> {
        check_name(bucket)?;
        check_name(object_name)?;

        let url = format!("{}/{}/{}", self.endpoint, bucket, object_name);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/csv")
            .body(content.to_string())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                object: object_name.to_string(),
                status: status.as_u16(),
            });
        }

        info!(%url, bytes = content.len(), "Uploaded object");
        Ok(())
    }
}
