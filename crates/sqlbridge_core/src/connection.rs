//! Shared connection state behind a [`crate::Database`].
//!
//! The connection handle, the map of open statements and the function
//! registry live here so that statements and iterators can hold a weak
//! back-reference without borrowing the database.

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::function::FunctionRegistry;
use rusqlite::ffi;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CStr;
use std::rc::Rc;

/// Copies a NUL-terminated engine string, empty if null.
pub(crate) fn c_text(ptr: *const std::ffi::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: the engine hands out NUL-terminated strings.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// One prepared statement handle plus the arena of its current bind cycle.
#[derive(Debug)]
pub(crate) struct StatementCell {
    handle: Cell<*mut ffi::sqlite3_stmt>,
    arena: RefCell<Arena>,
}

impl StatementCell {
    pub(crate) fn new(handle: *mut ffi::sqlite3_stmt) -> Rc<Self> {
        Rc::new(Self {
            handle: Cell::new(handle),
            arena: RefCell::new(Arena::new()),
        })
    }

    /// The live handle; `StatementClosed` once finalized.
    pub(crate) fn raw(&self) -> Result<*mut ffi::sqlite3_stmt> {
        let handle = self.handle.get();
        if handle.is_null() {
            Err(Error::StatementClosed)
        } else {
            Ok(handle)
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.handle.get().is_null()
    }

    /// Map key of this statement inside its connection.
    pub(crate) fn key(&self) -> usize {
        self.handle.get() as usize
    }

    pub(crate) fn arena(&self) -> &RefCell<Arena> {
        &self.arena
    }

    /// Releases the arena, finalizes the handle and nulls it.
    ///
    /// Returns whether finalization reported OK; a second call is a no-op
    /// returning `false`.
    pub(crate) fn finalize(&self) -> bool {
        self.arena.borrow_mut().release_all();
        let handle = self.handle.replace(std::ptr::null_mut());
        if handle.is_null() {
            return false;
        }
        tracing::trace!(handle = ?handle, "finalizing statement");
        // SAFETY: `handle` was live and is now detached from the cell.
        unsafe { ffi::sqlite3_finalize(handle) == ffi::SQLITE_OK }
    }
}

impl Drop for StatementCell {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// The connection handle and everything registered against it.
#[derive(Debug)]
pub(crate) struct Connection {
    handle: Cell<*mut ffi::sqlite3>,
    statements: RefCell<HashMap<usize, Rc<StatementCell>>>,
    functions: RefCell<FunctionRegistry>,
}

impl Connection {
    pub(crate) fn new(handle: *mut ffi::sqlite3) -> Rc<Self> {
        Rc::new(Self {
            handle: Cell::new(handle),
            statements: RefCell::new(HashMap::new()),
            functions: RefCell::new(FunctionRegistry::default()),
        })
    }

    /// The live handle; `DatabaseClosed` once closed.
    pub(crate) fn raw(&self) -> Result<*mut ffi::sqlite3> {
        let handle = self.handle.get();
        if handle.is_null() {
            Err(Error::DatabaseClosed)
        } else {
            Ok(handle)
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.handle.get().is_null()
    }

    /// Swaps in a freshly opened handle.
    pub(crate) fn set_handle(&self, handle: *mut ffi::sqlite3) {
        self.handle.set(handle);
    }

    /// The connection's current error message.
    pub(crate) fn last_error(&self) -> String {
        let handle = self.handle.get();
        if handle.is_null() {
            return Error::DatabaseClosed.to_string();
        }
        // SAFETY: `handle` is an open connection.
        c_text(unsafe { ffi::sqlite3_errmsg(handle) })
    }

    /// Translates an engine status: OK passes, anything else becomes an
    /// engine error carrying the current message.
    pub(crate) fn check(&self, status: i32) -> Result<()> {
        if status == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::engine(self.last_error()))
        }
    }

    pub(crate) fn register(&self, cell: &Rc<StatementCell>) {
        self.statements
            .borrow_mut()
            .insert(cell.key(), Rc::clone(cell));
    }

    pub(crate) fn forget(&self, key: usize) {
        self.statements.borrow_mut().remove(&key);
    }

    /// Number of statements currently registered.
    #[cfg(test)]
    pub(crate) fn open_statements(&self) -> usize {
        self.statements.borrow().len()
    }

    pub(crate) fn functions(&self) -> &RefCell<FunctionRegistry> {
        &self.functions
    }

    /// Frees every open statement and unregisters every host function.
    pub(crate) fn quiesce(&self) {
        let statements = std::mem::take(&mut *self.statements.borrow_mut());
        for cell in statements.into_values() {
            cell.finalize();
        }
        let handle = self.handle.get();
        self.functions.borrow_mut().clear(handle);
    }

    /// Closes the handle after quiescing; a closed connection is left alone.
    pub(crate) fn close(&self) -> Result<()> {
        if !self.is_open() {
            return Ok(());
        }
        self.quiesce();
        let handle = self.raw()?;
        // SAFETY: `handle` is open and no statement of ours is still live.
        let status = unsafe { ffi::sqlite3_close_v2(handle) };
        self.check(status)?;
        self.handle.set(std::ptr::null_mut());
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close connection on drop");
        }
    }
}
