pub use anyhow::Error as RuntimeError;
use thiserror::Error;

/// Errors raised while declaring parameters, adding nodes or freezing the
/// graph. None of these can happen once a run has started.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Parameter '{0}' is already declared")]
    DuplicateParameter(String),

    #[error("Parameter '{0}' was never declared")]
    UnknownParameter(String),

    #[error("Parameter '{name}' has an invalid value:\n{source}")]
    InvalidParameter {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Task '{0}' is already declared")]
    DuplicateNode(String),

    #[error("Task '{node}' refers to {reference}, which is not part of this graph")]
    UnknownReference { node: String, reference: String },

    #[error("Cycle detected in task graph: {}", .cycle.join(" -> "))]
    CyclicGraph { cycle: Vec<String> },

    #[error("Task '{node}' has an invalid cache key template: {reason}")]
    InvalidKeyTemplate { node: String, reason: String },
}

/// Errors that abort a run. Nothing is returned to the caller when one of
/// these happens, checkpoints written earlier in the run stay valid.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Task '{node}':\n{source}")]
    TaskExecution {
        node: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Couldn't start the worker pool.\n{0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("Parameters were resolved for a different graph")]
    ForeignParameters,
}

impl RunError {
    /// Name of the task that failed, if the run failed inside a task.
    pub fn node(&self) -> Option<&str> {
        match self {
            RunError::TaskExecution { node, .. } => Some(node),
            RunError::Pool(_) | RunError::ForeignParameters => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[cfg(feature = "http")]
    #[error("Couldn't fetch records.\n{0}")]
    Transport(#[from] reqwest::Error),

    #[error("Couldn't read records.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse records.\n{0}")]
    Parse(#[from] serde_json::Error),

    #[error("Document has no `records` array")]
    MissingRecords,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[cfg(feature = "http")]
    #[error("Couldn't upload object.\n{0}")]
    Transport(#[from] reqwest::Error),

    #[error("Couldn't write object.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Storage rejected '{object}' with status {status}")]
    Rejected { object: String, status: u16 },

    #[error("Invalid bucket or object name '{0}'")]
    InvalidName(String),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't encode checkpoint: {0}")]
    Encode(String),

    #[error("Couldn't decode checkpoint: {0}")]
    Decode(String),

    #[error("Checkpoint holds key '{found}', expected '{expected}'")]
    KeyMismatch { expected: String, found: String },

    #[error("Checkpoint value has an unexpected type")]
    TypeMismatch,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file.\n{0}")]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse config file.\n{0}")]
    Toml(#[from] toml::de::Error),
}
