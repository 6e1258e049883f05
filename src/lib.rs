//! # tensorkv
//!
//! Two small building blocks used by the tensor runtime:
//!
//! - [`context`]: device contexts that hand out memory aligned to [`ALIGNMENT`]
//!   and copy typed data between buffers.
//! - [`db`]: a uniform [`Db`] / [`Cursor`] / [`Transaction`] interface over an
//!   embedded LSM-tree store, with backends selected by name through a
//!   [`DbRegistry`].
//!
//! Process-wide tunables live in [`config::Flags`] and are read once at start-up.
//!
//! # Example
//!
//! ```ignore
//! use tensorkv::{DbRegistry, Mode, StoreOptions};
//!
//! let registry = DbRegistry::with_defaults();
//! let db = registry.open("fjall", "/tmp/train_db", Mode::Write, &StoreOptions::default())?;
//!
//! {
//!     let mut txn = db.new_transaction()?;
//!     txn.put(b"00000001", b"image bytes");
//!     txn.commit()?;
//! }
//!
//! let mut cursor = db.new_cursor()?;
//! while cursor.valid() {
//!     println!("{:?}", cursor.key());
//!     cursor.next()?;
//! }
//! ```

pub mod config;
pub mod context;
pub mod db;

pub use config::{ConfigError, Flags};
pub use context::{
    ALIGNMENT, AlignedBuffer, ContextError, CpuContext, Deallocator, DeviceContext, DeviceOption,
    DeviceType,
};
pub use db::{
    CommitError, Cursor, Db, DbError, DbFactory, DbRegistry, DbResult, FjallCursor, FjallDb,
    FjallTransaction, Mode, OpenError, RegistryError, StoreOptions, Transaction,
};
