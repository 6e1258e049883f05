use std::collections::BTreeMap;
use std::path::Path;

use super::error::{DbError, DbResult, OpenError, RegistryError};
use super::lsm::FjallDb;
use super::options::StoreOptions;
use super::{Db, Mode};

/// Opens a store for one backend.
pub type DbFactory = fn(&Path, Mode, &StoreOptions) -> Result<Box<dyn Db>, OpenError>;

/// Maps backend names to the factories that open them.
///
/// A registry is built once during start-up and then passed by reference to
/// whatever selects backends from configuration. It is not mutated after
/// that, so sharing `&DbRegistry` across threads needs no locking.
///
/// # Example
///
/// ```ignore
/// use tensorkv::{DbRegistry, Mode, StoreOptions};
///
/// let registry = DbRegistry::with_defaults();
/// let db = registry.open("fjall", "/tmp/train", Mode::Read, &StoreOptions::default())?;
/// ```
#[derive(Clone, Default)]
pub struct DbRegistry {
    factories: BTreeMap<String, DbFactory>,
}

fn open_fjall(path: &Path, mode: Mode, options: &StoreOptions) -> Result<Box<dyn Db>, OpenError> {
    Ok(Box::new(FjallDb::open(path, mode, options)?))
}

impl DbRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in backends.
    ///
    /// The `fjall` adapter is available as both `"Fjall"` and `"fjall"`.
    pub fn with_defaults() -> Self {
        let mut factories: BTreeMap<String, DbFactory> = BTreeMap::new();
        factories.insert("Fjall".to_string(), open_fjall);
        factories.insert("fjall".to_string(), open_fjall);
        Self { factories }
    }

    /// Registers `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if `name` is already registered.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: DbFactory,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Returns true if a backend is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered backend names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Opens the store at `path` with the backend registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownBackend`] if no backend has that name, or
    /// [`DbError::Open`] if the backend fails to open the store.
    pub fn open(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        mode: Mode,
        options: &StoreOptions,
    ) -> DbResult<Box<dyn Db>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DbError::UnknownBackend(name.to_string()))?;
        Ok(factory(path.as_ref(), mode, options)?)
    }
}
