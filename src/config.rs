//! Process-wide tunables.
//!
//! [`Flags`] is read once during start-up (usually with [`Flags::from_env`]) and
//! then handed to the components that need it. Nothing in this crate consults the
//! environment after that point.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment variable overriding [`Flags::block_size`].
pub const BLOCK_SIZE_VAR: &str = "TENSORKV_BLOCK_SIZE";

/// Environment variable overriding [`Flags::cpu_allocator_zero_fill`].
pub const ZERO_FILL_VAR: &str = "TENSORKV_CPU_ALLOCATOR_ZERO_FILL";

/// Environment variable overriding [`Flags::sync_writes`].
pub const SYNC_WRITES_VAR: &str = "TENSORKV_SYNC_WRITES";

/// Default block size used when writing a store (64 KiB).
pub const DEFAULT_BLOCK_SIZE: u32 = 65536;

/// Smallest block size the LSM engine accepts.
pub const MIN_BLOCK_SIZE: u32 = 1024;

/// Largest block size the LSM engine accepts.
pub const MAX_BLOCK_SIZE: u32 = 512 * 1024;

/// Errors produced while parsing [`Flags`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The value could not be parsed.
    Invalid { name: String, value: String },
    /// The value parsed but lies outside the accepted range.
    OutOfRange {
        name: String,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { name, value } => {
                write!(f, "invalid value '{value}' for {name}")
            }
            ConfigError::OutOfRange {
                name,
                value,
                min,
                max,
            } => {
                write!(f, "{name}={value} is outside the range {min}..={max}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Tunables shared by the memory context and the store adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// Block size in bytes used when writing a store.
    ///
    /// Default: 65536
    pub block_size: u32,

    /// Zero-initialise every CPU allocation.
    ///
    /// Default: false
    pub cpu_allocator_zero_fill: bool,

    /// Fsync the journal on every transaction commit.
    ///
    /// Default: false
    pub sync_writes: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cpu_allocator_zero_fill: false,
            sync_writes: false,
        }
    }
}

impl Flags {
    /// Reads the flags from the process environment, falling back to defaults
    /// for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parses the flags from an arbitrary lookup function.
    ///
    /// `lookup` is called with each variable name and returns `None` when the
    /// variable is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut flags = Self::default();

        if let Some(raw) = lookup(BLOCK_SIZE_VAR) {
            let block_size: u32 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: BLOCK_SIZE_VAR.to_string(),
                value: raw.clone(),
            })?;
            flags.block_size = check_block_size(block_size)?;
        }

        if let Some(raw) = lookup(ZERO_FILL_VAR) {
            flags.cpu_allocator_zero_fill = parse_bool(ZERO_FILL_VAR, &raw)?;
        }

        if let Some(raw) = lookup(SYNC_WRITES_VAR) {
            flags.sync_writes = parse_bool(SYNC_WRITES_VAR, &raw)?;
        }

        Ok(flags)
    }
}

/// Validates a block size against the range the engine accepts.
pub(crate) fn check_block_size(block_size: u32) -> Result<u32, ConfigError> {
    if (MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
        Ok(block_size)
    } else {
        Err(ConfigError::OutOfRange {
            name: BLOCK_SIZE_VAR.to_string(),
            value: u64::from(block_size),
            min: u64::from(MIN_BLOCK_SIZE),
            max: u64::from(MAX_BLOCK_SIZE),
        })
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}
