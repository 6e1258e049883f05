//! Store adapter over the `fjall` LSM-tree engine.
//!
//! Each store is a `fjall` keyspace directory holding a single partition. The
//! adapter maps the three open modes onto directory checks made before the
//! engine is started, since the engine itself always creates missing stores.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use super::error::{CommitError, DbError, DbResult, OpenError};
use super::options::StoreOptions;
use super::{Cursor, Db, Mode, Transaction};

/// Partition that holds every entry of a store.
const PARTITION_NAME: &str = "default";

/// File the engine writes at the root of every keyspace directory.
const STORE_MARKER: &str = "version";

type EntryIter<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), String>> + 'a>;

struct StoreHandle {
    keyspace: Keyspace,
    partition: PartitionHandle,
    #[cfg(test)]
    failing_commits: AtomicUsize,
}

#[cfg(test)]
impl StoreHandle {
    fn take_failing_commit(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A store backed by `fjall`.
///
/// The store exclusively owns its engine handle. [`Db::close`] persists the
/// journal and releases the handle; dropping an open store does the same.
pub struct FjallDb {
    source: PathBuf,
    mode: Mode,
    sync_writes: bool,
    handle: Option<StoreHandle>,
}

impl FjallDb {
    /// Opens the store at `path`.
    ///
    /// - [`Mode::Read`] fails if no store exists at `path`.
    /// - [`Mode::Write`] creates the store if it is missing.
    /// - [`Mode::New`] fails if a store already exists at `path`.
    ///
    /// A directory counts as a store once the engine has written its marker
    /// file there. Other files in the directory are ignored. In `Mode::Read`
    /// the store must also hold the data partition, and nothing is created.
    ///
    /// # Errors
    ///
    /// Returns an [`OpenError`] describing the conflict or the engine failure.
    /// No handle is kept on failure.
    pub fn open(
        path: impl AsRef<Path>,
        mode: Mode,
        options: &StoreOptions,
    ) -> Result<Self, OpenError> {
        let path = path.as_ref().to_path_buf();
        options.validate()?;

        let exists = store_exists(&path)?;
        match mode {
            Mode::Read if !exists => return Err(OpenError::NotFound(path)),
            Mode::New if exists => return Err(OpenError::AlreadyExists(path)),
            _ => {}
        }

        let engine_error = |e: fjall::Error| OpenError::Engine {
            path: path.clone(),
            message: e.to_string(),
        };

        let keyspace = fjall::Config::new(&path)
            .max_write_buffer_size(options.write_buffer_size)
            .max_open_files(options.max_open_files)
            .open()
            .map_err(engine_error)?;

        if mode == Mode::Read && !keyspace.partition_exists(PARTITION_NAME) {
            return Err(OpenError::NotFound(path.clone()));
        }

        let partition = keyspace
            .open_partition(
                PARTITION_NAME,
                PartitionCreateOptions::default().block_size(options.block_size),
            )
            .map_err(engine_error)?;

        #[cfg(feature = "logging")]
        log::debug!("Opened store {} in {mode} mode", path.display());

        Ok(Self {
            source: path,
            mode,
            sync_writes: options.sync_writes,
            handle: Some(StoreHandle {
                keyspace,
                partition,
                #[cfg(test)]
                failing_commits: AtomicUsize::new(0),
            }),
        })
    }

    /// Makes the next `n` batch writes fail before reaching the engine.
    #[cfg(test)]
    fn fail_next_commits(&self, n: usize) {
        if let Some(handle) = &self.handle {
            handle.failing_commits.store(n, Ordering::SeqCst);
        }
    }

    fn handle(&self) -> DbResult<&StoreHandle> {
        self.handle.as_ref().ok_or(DbError::Closed)
    }

    /// Creates a cursor positioned at the first entry.
    pub fn cursor(&self) -> DbResult<FjallCursor<'_>> {
        FjallCursor::new(&self.handle()?.partition)
    }

    /// Creates an empty transaction.
    pub fn transaction(&self) -> DbResult<FjallTransaction<'_>> {
        if self.mode == Mode::Read {
            return Err(DbError::ReadOnly);
        }
        Ok(FjallTransaction::new(self.handle()?, self.sync_writes))
    }
}

/// Returns true if `path` holds a store.
fn store_exists(path: &Path) -> Result<bool, OpenError> {
    let io_error = |source: io::Error| OpenError::Io {
        path: path.to_path_buf(),
        source,
    };

    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => match fs::metadata(path.join(STORE_MARKER)) {
            Ok(marker) => Ok(marker.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e)),
        },
        Ok(_) => Err(OpenError::NotADirectory(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(e)),
    }
}

impl Db for FjallDb {
    fn source(&self) -> &Path {
        &self.source
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn close(&mut self) -> DbResult<()> {
        let Some(StoreHandle {
            keyspace,
            partition,
            ..
        }) = self.handle.take()
        else {
            return Ok(());
        };

        drop(partition);
        let result = keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| DbError::Engine(e.to_string()));
        drop(keyspace);

        #[cfg(feature = "logging")]
        log::debug!("Closed store {}", self.source.display());

        result
    }

    fn is_closed(&self) -> bool {
        self.handle.is_none()
    }

    fn new_cursor(&self) -> DbResult<Box<dyn Cursor + '_>> {
        Ok(Box::new(self.cursor()?))
    }

    fn new_transaction(&self) -> DbResult<Box<dyn Transaction + '_>> {
        Ok(Box::new(self.transaction()?))
    }
}

impl Drop for FjallDb {
    fn drop(&mut self) {
        if let Err(_e) = self.close() {
            #[cfg(feature = "logging")]
            log::error!("Failed to persist store {}: {_e}", self.source.display());
        }
    }
}

/// Cursor over a [`FjallDb`].
///
/// Every seek starts a fresh engine iterator, so a seek observes all writes
/// committed before it.
pub struct FjallCursor<'a> {
    partition: &'a PartitionHandle,
    iter: EntryIter<'a>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl<'a> FjallCursor<'a> {
    fn new(partition: &'a PartitionHandle) -> DbResult<Self> {
        let mut cursor = Self {
            partition,
            iter: Box::new(std::iter::empty()),
            current: None,
        };
        cursor.seek_to_first()?;
        Ok(cursor)
    }

    fn advance(&mut self) -> DbResult<()> {
        match self.iter.next() {
            Some(Ok(entry)) => {
                self.current = Some(entry);
                Ok(())
            }
            Some(Err(message)) => {
                self.current = None;
                Err(DbError::Engine(message))
            }
            None => {
                self.current = None;
                Ok(())
            }
        }
    }
}

impl Cursor for FjallCursor<'_> {
    fn seek_to_first(&mut self) -> DbResult<()> {
        self.iter = Box::new(self.partition.iter().map(|item| {
            item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(|e| e.to_string())
        }));
        self.advance()
    }

    fn seek(&mut self, key: &[u8]) -> DbResult<()> {
        self.iter = Box::new(self.partition.range(key.to_vec()..).map(|item| {
            item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                .map_err(|e| e.to_string())
        }));
        self.advance()
    }

    fn supports_seek(&self) -> bool {
        true
    }

    fn next(&mut self) -> DbResult<()> {
        if self.current.is_none() {
            return Ok(());
        }
        self.advance()
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }
}

/// Write batch over a [`FjallDb`].
///
/// Staged writes are committed when the transaction is dropped. If that
/// implicit commit fails the drop panics instead of discarding the writes,
/// unless the thread is already unwinding.
pub struct FjallTransaction<'a> {
    handle: &'a StoreHandle,
    sync_writes: bool,
    staged: Vec<(Vec<u8>, Vec<u8>)>,
}

impl<'a> FjallTransaction<'a> {
    fn new(handle: &'a StoreHandle, sync_writes: bool) -> Self {
        Self {
            handle,
            sync_writes,
            staged: Vec::new(),
        }
    }

    fn write_batch(&self) -> Result<(), String> {
        #[cfg(test)]
        if self.handle.take_failing_commit() {
            return Err("simulated write failure".to_string());
        }

        // Entries in one batch share a sequence number, so collapse repeated
        // keys to their last staged value first.
        let latest: BTreeMap<&[u8], &[u8]> = self
            .staged
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
            .collect();

        let mut batch = self.handle.keyspace.batch();
        for (key, value) in latest {
            batch.insert(&self.handle.partition, key, value);
        }
        batch.commit().map_err(|e| e.to_string())?;

        if self.sync_writes {
            self.handle
                .keyspace
                .persist(PersistMode::SyncAll)
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

impl Transaction for FjallTransaction<'_> {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.staged.push((key.to_vec(), value.to_vec()));
    }

    fn commit(&mut self) -> Result<(), CommitError> {
        if self.staged.is_empty() {
            return Ok(());
        }

        self.write_batch().map_err(|message| CommitError {
            message,
            pending: self.staged.len(),
        })?;

        #[cfg(feature = "logging")]
        log::trace!("Committed batch of {} entries", self.staged.len());

        self.staged.clear();
        Ok(())
    }

    fn pending(&self) -> usize {
        self.staged.len()
    }
}

impl Drop for FjallTransaction<'_> {
    fn drop(&mut self) {
        if self.staged.is_empty() {
            return;
        }

        if let Err(e) = self.commit() {
            #[cfg(feature = "logging")]
            log::error!("Implicit commit on drop failed: {e}");

            if !std::thread::panicking() {
                panic!("staged writes could not be committed on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use tempfile::TempDir;

    fn open_write(dir: &TempDir) -> FjallDb {
        FjallDb::open(dir.path().join("store"), Mode::Write, &StoreOptions::default()).unwrap()
    }

    #[test]
    fn test_empty_store_cursor_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let cursor = db.cursor().unwrap();
        assert!(!cursor.valid());
        assert_eq!(cursor.key(), None);
        assert_eq!(cursor.value(), None);
        assert!(cursor.supports_seek());
    }

    #[test]
    fn test_next_on_invalid_cursor_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let mut cursor = db.cursor().unwrap();
        cursor.next().unwrap();
        assert!(!cursor.valid());
    }

    #[test]
    fn test_commit_clears_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let mut txn = db.transaction().unwrap();
        txn.put(b"k1", b"v1");
        txn.put(b"k2", b"v2");
        assert_eq!(txn.pending(), 2);

        txn.commit().unwrap();
        assert_eq!(txn.pending(), 0);

        txn.put(b"k3", b"v3");
        assert_eq!(txn.pending(), 1);
        txn.commit().unwrap();
        drop(txn);

        let mut cursor = db.cursor().unwrap();
        let mut keys = Vec::new();
        while let Some(key) = cursor.key() {
            keys.push(key.to_vec());
            cursor.next().unwrap();
        }
        assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec(), b"k3".to_vec()]);
    }

    #[test]
    fn test_empty_commit_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let mut txn = db.transaction().unwrap();
        txn.commit().unwrap();
        assert_eq!(txn.pending(), 0);
    }

    #[test]
    fn test_later_put_overwrites_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        {
            let mut txn = db.transaction().unwrap();
            txn.put(b"key", b"first");
            txn.put(b"key", b"second");
        }

        let mut cursor = db.cursor().unwrap();
        cursor.seek(b"key").unwrap();
        assert_eq!(cursor.value(), Some(&b"second"[..]));
        cursor.next().unwrap();
        assert!(!cursor.valid());
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = open_write(&dir);

        db.close().unwrap();
        assert!(db.is_closed());
        db.close().unwrap();

        assert!(matches!(db.cursor(), Err(DbError::Closed)));
        assert!(matches!(db.transaction(), Err(DbError::Closed)));
    }

    #[test]
    fn test_failed_commit_keeps_batch() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let mut txn = db.transaction().unwrap();
        txn.put(b"k1", b"v1");
        txn.put(b"k2", b"v2");

        db.fail_next_commits(1);
        let err = txn.commit().unwrap_err();
        assert_eq!(err.pending, 2);
        assert!(err.message.contains("simulated write failure"));
        assert_eq!(txn.pending(), 2);
        assert!(!db.cursor().unwrap().valid());

        txn.commit().unwrap();
        assert_eq!(txn.pending(), 0);
        drop(txn);

        let mut cursor = db.cursor().unwrap();
        assert_eq!(cursor.key(), Some(&b"k1"[..]));
        cursor.next().unwrap();
        assert_eq!(cursor.key(), Some(&b"k2"[..]));
    }

    #[test]
    fn test_failed_implicit_commit_panics() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut txn = db.transaction().unwrap();
            txn.put(b"lost", b"value");
            db.fail_next_commits(1);
        }));

        let payload = result.unwrap_err();
        let message = payload.downcast_ref::<String>().unwrap();
        assert!(message.contains("could not be committed on drop"));
        assert!(!db.cursor().unwrap().valid());
    }

    #[test]
    fn test_failed_implicit_commit_during_unwind_keeps_panic() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_write(&dir);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut txn = db.transaction().unwrap();
            txn.put(b"lost", b"value");
            db.fail_next_commits(1);
            panic!("worker failed");
        }));

        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"worker failed"));
        assert!(!db.cursor().unwrap().valid());
    }

    #[test]
    fn test_read_requires_data_partition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store");
        drop(fjall::Config::new(&path).open().unwrap());

        let err = FjallDb::open(&path, Mode::Read, &StoreOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::NotFound(_)));

        let db = FjallDb::open(&path, Mode::Write, &StoreOptions::default()).unwrap();
        assert!(!db.cursor().unwrap().valid());
    }

    #[test]
    fn test_file_path_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = FjallDb::open(file.path(), Mode::Write, &StoreOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::NotADirectory(_)));
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions::default().block_size(10);
        let err = FjallDb::open(dir.path().join("store"), Mode::Write, &options)
            .err()
            .unwrap();
        assert!(matches!(err, OpenError::InvalidOptions(_)));
        assert!(!dir.path().join("store").exists());
    }
}
