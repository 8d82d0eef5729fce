//! Byte store trait definition.

use crate::error::StoreResult;
use std::path::PathBuf;

/// A mountable store of named blobs.
///
/// A byte store is where a database file lives. The engine reads and writes
/// the blob through its own file layer, using the path returned by
/// [`ByteStore::locate`]; the binding layer only ever creates, reads back or
/// deletes a blob as a whole.
///
/// # Invariants
///
/// - `create` replaces any existing blob with the same name
/// - `read_all` returns exactly the bytes currently stored under the name
/// - `remove` deletes the blob and any sidecar files the engine left behind
///   (journal, WAL); removing a missing blob is not an error
///
/// # Implementors
///
/// - [`super::DirStore`] - Directory-backed store
pub trait ByteStore {
    /// Returns the path the engine should open for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid blob name.
    fn locate(&self, name: &str) -> StoreResult<PathBuf>;

    /// Creates (or truncates) the blob `name`, optionally filling it with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be written.
    fn create(&self, name: &str, data: Option<&[u8]>) -> StoreResult<()>;

    /// Reads the whole blob `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the blob does not exist.
    fn read_all(&self, name: &str) -> StoreResult<Vec<u8>>;

    /// Deletes the blob `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing blob cannot be deleted.
    fn remove(&self, name: &str) -> StoreResult<()>;

    /// Returns true if the blob `name` exists.
    fn exists(&self, name: &str) -> bool;
}
