use std::sync::Arc;
use std::any::Any;

use chrono::{DateTime, NaiveDate, Utc};

/// A type-erased, thread-safe container.
pub(crate) type Dynamic = Arc<dyn Any + Send + Sync>;

/// Atomic reference-counted string type used for identifiers.
pub(crate) type ArcStr = std::sync::Arc<str>;

/// The BLAKE3 digest of a checkpoint key.
///
/// Checkpoint files are named after it, which keeps names short and free of
/// characters a file system might reject.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Hash32(blake3::Hash);

impl Hash32 {
    pub(crate) fn hash(buffer: impl AsRef<[u8]>) -> Self {
        Hash32(blake3::hash(buffer.as_ref()))
    }

    pub(crate) fn to_hex(self) -> String {
        self.0.to_hex().to_string()
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

/// How the engine walks the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One task at a time, in topological order.
    Sequential,
    /// Ready tasks are dispatched to a bounded pool of worker threads.
    Parallel { workers: usize },
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Parallel {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Facts about the current run that do not come from parameters.
///
/// The clock is never read inside the engine: callers pass `now` in, which
/// keeps checkpoint keys and generated object names reproducible in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunContext {
    pub now: DateTime<Utc>,
}

impl RunContext {
    /// A context stamped with the wall clock.
    pub fn now() -> Self {
        Self { now: Utc::now() }
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// The calendar day checkpoints are keyed by.
    pub fn today(&self) -> NaiveDate {
        self.now.date_naive()
    }
}

/// The context passed to every task execution.
pub struct TaskContext<'a> {
    /// Name of the running task.
    pub name: &'a str,
    /// Run-wide facts (clock).
    pub run: &'a RunContext,
    /// Tracing span assigned to this task. Events logged by the task body
    /// should be recorded inside it.
    pub span: tracing::Span,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hash_hex() {
        let hex = Hash32::hash("download-2021-01-01").to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hex, Hash32::hash("download-2021-01-01").to_hex());
        assert_ne!(hex, Hash32::hash("download-2021-01-02").to_hex());
        assert_eq!(hex, blake3::hash(b"download-2021-01-01").to_hex().as_str());
    }

    #[test]
    fn test_today() {
        let ctx = RunContext::at(Utc.with_ymd_and_hms(2021, 3, 4, 23, 59, 0).unwrap());
        assert_eq!(ctx.today(), NaiveDate::from_ymd_opt(2021, 3, 4).unwrap());
    }
}
