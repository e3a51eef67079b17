use std::path::PathBuf;

/// Result alias that carries the custom [`StageError`] type.
pub type Result<T> = std::result::Result<T, StageError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// A prop, song or config file that was expected to exist is missing.
    #[error("{kind} `{name}` does not exist")]
    NotFound { kind: &'static str, name: String },
    /// A mapping being deserialized lacks a required key.
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },
    /// The file exists but does not hold a JSON object.
    #[error("failed to parse `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A dotted key path walked off the edge of the document.
    #[error("key `{0}` not found")]
    KeyNotFound(String),
    #[error("invalid key path `{0}`")]
    InvalidKeyPath(String),
    #[error("`{0}` is not a mapping")]
    NotAMapping(String),
    /// A directory that was about to be removed still holds other files.
    #[error("`{}` still contains {}", .path.display(), .entries.join(", "))]
    DirectoryNotEmpty { path: PathBuf, entries: Vec<String> },
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl StageError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// True for the missing-entity/missing-file family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
