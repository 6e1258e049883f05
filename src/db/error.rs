use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::config::ConfigError;

/// Result alias for store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while opening a store.
#[derive(Debug)]
pub enum OpenError {
    /// `Mode::New` was requested but a store already exists at the path.
    AlreadyExists(PathBuf),
    /// `Mode::Read` was requested but no store exists at the path.
    NotFound(PathBuf),
    /// The path exists but is not a directory.
    NotADirectory(PathBuf),
    /// The store options were rejected before reaching the engine.
    InvalidOptions(ConfigError),
    /// The engine refused to open the store.
    Engine { path: PathBuf, message: String },
    /// An I/O error occurred while inspecting the path.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenError::AlreadyExists(path) => {
                write!(f, "store already exists at '{}'", path.display())
            }
            OpenError::NotFound(path) => write!(f, "no store found at '{}'", path.display()),
            OpenError::NotADirectory(path) => {
                write!(f, "store path '{}' is not a directory", path.display())
            }
            OpenError::InvalidOptions(e) => write!(f, "invalid store options: {e}"),
            OpenError::Engine { path, message } => {
                write!(f, "failed to open store '{}': {message}", path.display())
            }
            OpenError::Io { path, source } => {
                write!(f, "I/O error at '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OpenError::InvalidOptions(e) => Some(e),
            OpenError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for OpenError {
    fn from(err: ConfigError) -> Self {
        OpenError::InvalidOptions(err)
    }
}

/// A batch write was rejected by the engine.
///
/// The failed writes stay staged in the transaction; `pending` reports how
/// many there are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitError {
    /// Status text reported by the engine.
    pub message: String,
    /// Number of writes still staged after the failure.
    pub pending: usize,
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to write batch of {} entries: {}",
            self.pending, self.message
        )
    }
}

impl std::error::Error for CommitError {}

/// Errors raised while building a [`DbRegistry`](super::DbRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A backend with this name is already registered.
    Duplicate(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Duplicate(name) => {
                write!(f, "backend '{name}' is already registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Errors returned by store operations.
#[derive(Debug)]
pub enum DbError {
    /// The store could not be opened.
    Open(OpenError),
    /// A transaction failed to commit.
    Commit(CommitError),
    /// The store has been closed.
    Closed,
    /// The store was opened with `Mode::Read`.
    ReadOnly,
    /// No backend is registered under this name.
    UnknownBackend(String),
    /// A mode string did not name a known mode.
    InvalidMode(String),
    /// The engine reported an error while reading or persisting.
    Engine(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::Open(e) => write!(f, "{e}"),
            DbError::Commit(e) => write!(f, "{e}"),
            DbError::Closed => write!(f, "store is closed"),
            DbError::ReadOnly => write!(f, "store was opened read-only"),
            DbError::UnknownBackend(name) => write!(f, "unknown store backend '{name}'"),
            DbError::InvalidMode(mode) => write!(f, "invalid store mode '{mode}'"),
            DbError::Engine(message) => write!(f, "engine error: {message}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Open(e) => Some(e),
            DbError::Commit(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OpenError> for DbError {
    fn from(err: OpenError) -> Self {
        DbError::Open(err)
    }
}

impl From<CommitError> for DbError {
    fn from(err: CommitError) -> Self {
        DbError::Commit(err)
    }
}
