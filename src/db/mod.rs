//! Key-value store adapters.
//!
//! This module defines the interface the dataset readers and writers program
//! against and one implementation of it over the `fjall` LSM-tree engine:
//!
//! - [`Db`] - an open store, created in one of three [`Mode`]s
//! - [`Cursor`] - ordered iteration over the store's keys
//! - [`Transaction`] - a batch of upserts applied atomically on commit
//!
//! Backends are looked up by name in a [`DbRegistry`], which is built once at
//! start-up and passed to whichever component picks the backend.
//!
//! # Lifetimes
//!
//! Cursors and transactions borrow the store they were created from, so a
//! store cannot be closed or dropped while either is alive.
//!
//! # Example
//!
//! ```ignore
//! use tensorkv::db::{FjallDb, Mode, StoreOptions};
//!
//! let db = FjallDb::open("/tmp/labels", Mode::Write, &StoreOptions::default())?;
//!
//! let mut txn = db.new_transaction()?;
//! txn.put(b"a", b"1");
//! txn.put(b"b", b"2");
//! txn.commit()?;
//! drop(txn);
//!
//! let mut cursor = db.new_cursor()?;
//! cursor.seek(b"b")?;
//! assert_eq!(cursor.value(), Some(&b"2"[..]));
//! ```

mod error;
mod lsm;
mod options;
mod registry;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::{CommitError, DbError, DbResult, OpenError, RegistryError};
pub use lsm::{FjallCursor, FjallDb, FjallTransaction};
pub use options::{DEFAULT_MAX_OPEN_FILES, DEFAULT_WRITE_BUFFER_SIZE, StoreOptions};
pub use registry::{DbFactory, DbRegistry};

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// The store must already exist.
    Read,
    /// The store is created if it does not exist.
    Write,
    /// The store must not exist yet and is created.
    New,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Read => write!(f, "read"),
            Mode::Write => write!(f, "write"),
            Mode::New => write!(f, "new"),
        }
    }
}

impl FromStr for Mode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(Mode::Read),
            "write" => Ok(Mode::Write),
            "new" => Ok(Mode::New),
            _ => Err(DbError::InvalidMode(s.to_string())),
        }
    }
}

/// An open key-value store.
pub trait Db: Send {
    /// Path the store was opened from.
    fn source(&self) -> &Path;

    /// Mode the store was opened with.
    fn mode(&self) -> Mode;

    /// Releases the engine handle.
    ///
    /// Closing an already closed store does nothing.
    fn close(&mut self) -> DbResult<()>;

    /// Returns true once [`Db::close`] has been called.
    fn is_closed(&self) -> bool;

    /// Creates a cursor positioned at the first entry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Closed`] if the store has been closed.
    fn new_cursor(&self) -> DbResult<Box<dyn Cursor + '_>>;

    /// Creates an empty transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Closed`] if the store has been closed and
    /// [`DbError::ReadOnly`] if it was opened with [`Mode::Read`].
    fn new_transaction(&self) -> DbResult<Box<dyn Transaction + '_>>;
}

/// Ordered iteration over the entries of a store.
///
/// Keys are visited in lexicographic byte order.
pub trait Cursor {
    /// Positions the cursor at the smallest key, or makes it invalid if the
    /// store is empty.
    fn seek_to_first(&mut self) -> DbResult<()>;

    /// Positions the cursor at the smallest key greater than or equal to `key`.
    fn seek(&mut self, key: &[u8]) -> DbResult<()>;

    /// Returns true if [`Cursor::seek`] is supported.
    fn supports_seek(&self) -> bool;

    /// Advances to the next key. Past the last key the cursor becomes invalid;
    /// calling this on an invalid cursor does nothing.
    fn next(&mut self) -> DbResult<()>;

    /// Returns true if the cursor is positioned at an entry.
    fn valid(&self) -> bool;

    /// Key of the current entry, or `None` if the cursor is invalid.
    fn key(&self) -> Option<&[u8]>;

    /// Value of the current entry, or `None` if the cursor is invalid.
    fn value(&self) -> Option<&[u8]>;
}

/// A batch of upserts applied atomically.
///
/// Dropping a transaction commits whatever is still staged, so writes are
/// never lost because a caller forgot to call [`Transaction::commit`].
pub trait Transaction {
    /// Stages an upsert of `key` to `value`.
    fn put(&mut self, key: &[u8], value: &[u8]);

    /// Applies every staged write in a single batch.
    ///
    /// On success the batch is cleared and the transaction accepts new writes.
    /// On failure the staged writes are kept so the commit can be retried.
    fn commit(&mut self) -> Result<(), CommitError>;

    /// Number of writes staged since the last successful commit.
    fn pending(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        for mode in [Mode::Read, Mode::Write, Mode::New] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert_eq!("WRITE".parse::<Mode>().unwrap(), Mode::Write);
    }

    #[test]
    fn test_mode_parse_error() {
        match "append".parse::<Mode>() {
            Err(DbError::InvalidMode(mode)) => assert_eq!(mode, "append"),
            other => panic!("expected InvalidMode, got {other:?}"),
        }
    }
}
