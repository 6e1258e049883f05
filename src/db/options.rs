use serde::{Deserialize, Serialize};

use crate::config::{self, ConfigError, Flags};

/// Size of the in-memory write buffer before it is flushed to disk (256 MiB).
pub const DEFAULT_WRITE_BUFFER_SIZE: u64 = 268_435_456;

/// Upper bound on file descriptors the engine keeps open.
pub const DEFAULT_MAX_OPEN_FILES: usize = 100;

/// Options applied when a store is opened.
///
/// # Example
///
/// ```ignore
/// use tensorkv::{Flags, StoreOptions};
///
/// let options = StoreOptions::from_flags(&Flags::from_env()?)
///     .max_open_files(256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Block size in bytes for newly written tables.
    ///
    /// Default: 65536, or [`Flags::block_size`] when built with [`StoreOptions::from_flags`]
    pub block_size: u32,

    /// Maximum bytes buffered in memtables before a flush.
    ///
    /// Default: 256 MiB
    pub write_buffer_size: u64,

    /// Maximum number of table files kept open at once.
    ///
    /// Default: 100
    pub max_open_files: usize,

    /// Fsync the journal after every commit.
    ///
    /// Default: false
    pub sync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            block_size: config::DEFAULT_BLOCK_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            sync_writes: false,
        }
    }
}

impl StoreOptions {
    /// Options with the defaults above.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options taking the block size and commit durability from `flags`.
    pub fn from_flags(flags: &Flags) -> Self {
        Self {
            block_size: flags.block_size,
            sync_writes: flags.sync_writes,
            ..Self::default()
        }
    }

    /// Sets the block size.
    #[must_use]
    pub const fn block_size(mut self, bytes: u32) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets the write buffer size.
    #[must_use]
    pub const fn write_buffer_size(mut self, bytes: u64) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    /// Sets the open file limit.
    #[must_use]
    pub const fn max_open_files(mut self, n: usize) -> Self {
        self.max_open_files = n;
        self
    }

    /// Enables or disables fsync on commit.
    #[must_use]
    pub const fn sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    /// Checks the options against the limits the engine enforces.
    pub fn validate(&self) -> Result<(), ConfigError> {
        config::check_block_size(self.block_size)?;

        if self.max_open_files < 2 {
            return Err(ConfigError::OutOfRange {
                name: "max_open_files".to_string(),
                value: self.max_open_files as u64,
                min: 2,
                max: u64::MAX,
            });
        }

        Ok(())
    }
}
