//! Checkpoints: persisted task outputs, looked up by a deterministic key.
//!
//! A checkpointed task renders a key from its [`KeyTemplate`] before it runs.
//! If the [`CheckpointCache`] holds an entry for that key, the stored value
//! is used and the task body is skipped. Otherwise the task runs and its
//! output is stored under the key. Entries are never mutated; a new key (for
//! example a new day) simply supersedes them.
//!
//! The cache never fails a run. Read errors are logged and count as a miss,
//! write errors are logged and the freshly computed value is used as is.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::sync::{Arc, RwLock};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{Dynamic, Hash32};
use crate::error::CacheError;
use crate::param::ParamSnapshot;

/// The template used when a checkpointed task does not bring its own.
pub const DEFAULT_KEY_TEMPLATE: &str = "{task_name}-{today}";

/// Values a cache key may depend on.
#[derive(Clone, Copy)]
pub struct CacheContext<'a> {
    /// The calendar day of the run.
    pub today: NaiveDate,
    /// Resolved parameters of the run.
    pub params: Option<&'a ParamSnapshot>,
}

impl<'a> CacheContext<'a> {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            params: None,
        }
    }

    pub fn with_params(mut self, params: &'a ParamSnapshot) -> Self {
        self.params = Some(params);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    TaskName,
    Today,
    Year,
    Month,
    Day,
    Param(String),
}

/// A parsed cache key template such as `{task_name}-{today}`.
///
/// Placeholders: `{task_name}`, `{today}` (`YYYY-MM-DD`), `{year}`,
/// `{month}`, `{day}`, and the name of any declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    segments: Vec<Segment>,
}

impl KeyTemplate {
    /// Parses a template. `is_param` decides whether an unknown placeholder
    /// names a parameter; anything else is rejected.
    pub fn parse(template: &str, is_param: impl Fn(&str) -> bool) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = template;

        while let Some(open) = rest.find(['{', '}']) {
            if rest[open..].starts_with('}') {
                return Err(format!("unmatched '}}' in '{template}'"));
            }

            text.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' in '{template}'"))?;
            let name = &after[..close];

            if name.contains('{') {
                return Err(format!("nested '{{' in '{template}'"));
            }

            let segment = match name {
                "task_name" => Segment::TaskName,
                "today" => Segment::Today,
                "year" => Segment::Year,
                "month" => Segment::Month,
                "day" => Segment::Day,
                other if is_param(other) => Segment::Param(other.to_string()),
                other => return Err(format!("unknown placeholder '{{{other}}}'")),
            };

            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(segment);
            rest = &after[close + 1..];
        }

        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        if segments.is_empty() {
            return Err("template is empty".to_string());
        }

        Ok(Self { segments })
    }

    /// Renders the key for one task in one run.
    pub fn render(&self, task_name: &str, context: &CacheContext<'_>) -> String {
        let mut key = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Text(text) => key.push_str(text),
                Segment::TaskName => key.push_str(task_name),
                Segment::Today => key.push_str(&context.today.format("%Y-%m-%d").to_string()),
                Segment::Year => key.push_str(&format!("{:04}", context.today.year())),
                Segment::Month => key.push_str(&format!("{:02}", context.today.month())),
                Segment::Day => key.push_str(&format!("{:02}", context.today.day())),
                Segment::Param(name) => {
                    match context.params.and_then(|params| params.get(name)) {
                        Some(serde_json::Value::String(s)) => key.push_str(s),
                        Some(value) => key.push_str(&value.to_string()),
                        None => {}
                    }
                }
            }
        }

        key
    }
}

impl Default for KeyTemplate {
    fn default() -> Self {
        Self {
            segments: vec![
                Segment::TaskName,
                Segment::Text("-".to_string()),
                Segment::Today,
            ],
        }
    }
}

/// A stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub value: T,
}

#[derive(Serialize)]
struct CacheEntryRef<'a, T> {
    key: &'a str,
    created_at: DateTime<Utc>,
    value: &'a T,
}

fn encode_entry<T>(key: &str, created_at: DateTime<Utc>, value: &T) -> Result<Vec<u8>, CacheError>
where
    T: Serialize,
{
    let entry = CacheEntryRef {
        key,
        created_at,
        value,
    };

    let mut buffer = Vec::new();
    ciborium::into_writer(&entry, &mut buffer).map_err(|e| CacheError::Encode(e.to_string()))?;
    Ok(buffer)
}

fn decode_entry<T>(key: &str, bytes: &[u8]) -> Result<CacheEntry<T>, CacheError>
where
    T: DeserializeOwned,
{
    let entry: CacheEntry<T> =
        ciborium::from_reader(bytes).map_err(|e| CacheError::Decode(e.to_string()))?;

    // Different keys may share a file name only through a hash collision, but
    // a foreign entry must never be served.
    if entry.key != key {
        return Err(CacheError::KeyMismatch {
            expected: key.to_string(),
            found: entry.key,
        });
    }

    Ok(entry)
}

/// Serialization for one task's output type, captured when the task is added
/// so the engine can persist type-erased values.
#[derive(Clone, Copy)]
pub(crate) struct Codec {
    encode: fn(&str, DateTime<Utc>, &Dynamic) -> Result<Vec<u8>, CacheError>,
    decode: fn(&str, &[u8]) -> Result<Dynamic, CacheError>,
}

impl Codec {
    pub(crate) fn of<T>() -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        fn encode<T: Serialize + 'static>(
            key: &str,
            created_at: DateTime<Utc>,
            value: &Dynamic,
        ) -> Result<Vec<u8>, CacheError> {
            let value = value.downcast_ref::<T>().ok_or(CacheError::TypeMismatch)?;
            encode_entry(key, created_at, value)
        }

        fn decode<T: DeserializeOwned + Send + Sync + 'static>(
            key: &str,
            bytes: &[u8],
        ) -> Result<Dynamic, CacheError> {
            let entry = decode_entry::<T>(key, bytes)?;
            Ok(Arc::new(entry.value))
        }

        Self {
            encode: encode::<T>,
            decode: decode::<T>,
        }
    }
}

/// Durable byte storage behind the cache.
///
/// Implementations must make `write` atomic with respect to `read`: a reader
/// sees either the previous entry or the new one, never a partial write.
/// Concurrent writes to the same key may race; the last one wins.
pub trait CheckpointStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError>;

    /// Removes every entry, returning how many were removed.
    fn clear(&self) -> Result<usize, CacheError>;
}

/// Stores each entry as a CBOR file named after the BLAKE3 hash of its key.
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: Utf8PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Utf8PathBuf {
        self.dir
            .join(Hash32::hash(key).to_hex())
            .with_extension("cbor")
    }
}

impl CheckpointStore for DiskStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;

        // Write next to the target, then rename over it.
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(self.path_for(key)).map_err(|e| e.error)?;

        Ok(())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "cbor") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

/// Keeps entries in process memory. Useful for tests and one-off runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }
}

/// The checkpoint cache shared by all workers of a run, and by runs.
#[derive(Clone)]
pub struct CheckpointCache {
    store: Arc<dyn CheckpointStore>,
}

impl CheckpointCache {
    pub fn new(store: impl CheckpointStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// A cache persisted under `dir`.
    pub fn on_disk(dir: impl Into<Utf8PathBuf>) -> Self {
        Self::new(DiskStore::new(dir))
    }

    /// A cache that lives as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Key of `task_name` under the default template.
    pub fn key_for(&self, task_name: &str, context: &CacheContext<'_>) -> String {
        KeyTemplate::default().render(task_name, context)
    }

    /// Looks up a typed entry. Errors are logged and reported as a miss.
    pub fn get<T>(&self, key: &str) -> Option<CacheEntry<T>>
    where
        T: DeserializeOwned,
    {
        let bytes = self.read(key)?;
        decode_entry(key, &bytes)
            .inspect_err(|e| warn!(key, error = %e, "ignoring unreadable checkpoint"))
            .ok()
    }

    /// Stores a typed entry. Errors are logged and otherwise ignored.
    pub fn put<T>(&self, key: &str, value: &T, created_at: DateTime<Utc>)
    where
        T: Serialize,
    {
        match encode_entry(key, created_at, value) {
            Ok(bytes) => self.write(key, &bytes),
            Err(e) => warn!(key, error = %e, "couldn't encode checkpoint"),
        }
    }

    /// Removes every persisted entry.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.store.clear()
    }

    pub(crate) fn load(&self, key: &str, codec: &Codec) -> Option<Dynamic> {
        let bytes = self.read(key)?;
        (codec.decode)(key, &bytes)
            .inspect_err(|e| warn!(key, error = %e, "ignoring unreadable checkpoint"))
            .ok()
    }

    pub(crate) fn store(&self, key: &str, codec: &Codec, value: &Dynamic, created_at: DateTime<Utc>) {
        match (codec.encode)(key, created_at, value) {
            Ok(bytes) => self.write(key, &bytes),
            Err(e) => warn!(key, error = %e, "couldn't encode checkpoint"),
        }
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        match self.store.read(key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "checkpoint store unavailable; treating as a miss");
                None
            }
        }
    }

    fn write(&self, key: &str, bytes: &[u8]) {
        if let Err(e) = self.store.write(key, bytes) {
            warn!(key, error = %e, "couldn't persist checkpoint");
        }
    }
}

impl std::fmt::Debug for CheckpointCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointCache").finish_non_exhaustive()
    }
}
