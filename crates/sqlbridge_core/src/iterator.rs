//! Lazy compilation of multi-statement SQL text.

use crate::arena::Arena;
use crate::connection::{c_text, Connection, StatementCell};
use crate::error::{Error, Result};
use crate::statement::Statement;
use rusqlite::ffi;
use std::ffi::c_char;
use std::iter::FusedIterator;
use std::rc::{Rc, Weak};

/// Compiles the statements of a SQL text one at a time.
///
/// Each call to `next` frees the statement yielded before it, so at most
/// one statement from this iterator is live at any time. The iterator ends
/// when only whitespace or comments remain; after a compile error it yields
/// the error once and then ends. Its private copy of the SQL text is
/// released exactly once, when it ends or is dropped.
///
/// # Example
///
/// ```rust
/// use sqlbridge_core::Database;
///
/// let db = Database::open(None).unwrap();
/// let mut it = db.iterate_statements("SELECT 1; SELECT 2;").unwrap();
/// let mut seen = Vec::new();
/// for stmt in &mut it {
///     let stmt = stmt.unwrap();
///     seen.push(stmt.get_sql().unwrap().trim().to_string());
/// }
/// assert_eq!(seen, ["SELECT 1;", "SELECT 2;"]);
/// assert_eq!(it.get_remaining_sql(), "");
/// ```
#[derive(Debug)]
pub struct StatementIterator {
    conn: Weak<Connection>,
    text: Arena,
    tail: *const c_char,
    current: Option<Rc<StatementCell>>,
    remainder: Option<String>,
}

impl StatementIterator {
    pub(crate) fn new(conn: &Rc<Connection>, sql: &str) -> Result<Self> {
        if sql.contains('\0') {
            return Err(Error::InvalidString(sql.to_string()));
        }
        let mut text = Arena::new();
        let tail = text.alloc_str(sql)?.as_ptr().cast::<c_char>().cast_const();
        Ok(Self {
            conn: Rc::downgrade(conn),
            text,
            tail,
            current: None,
            remainder: None,
        })
    }

    /// The SQL text not consumed yet.
    #[must_use]
    pub fn get_remaining_sql(&self) -> String {
        match &self.remainder {
            Some(rest) => rest.clone(),
            None => c_text(self.tail),
        }
    }

    fn is_finished(&self) -> bool {
        self.text.is_empty()
    }

    /// Records `rest` as the final remainder and releases the text copy.
    fn finish(&mut self, rest: String) {
        self.remainder = Some(rest);
        self.tail = std::ptr::null();
        self.text.release_all();
    }

    fn free_current(&mut self) {
        if let Some(cell) = self.current.take() {
            if cell.is_live() {
                let key = cell.key();
                cell.finalize();
                if let Some(conn) = self.conn.upgrade() {
                    conn.forget(key);
                }
            }
        }
    }
}

impl Iterator for StatementIterator {
    type Item = Result<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_finished() {
            return None;
        }
        self.free_current();

        let rest = c_text(self.tail);
        let Some(conn) = self.conn.upgrade().filter(|conn| conn.is_open()) else {
            self.finish(rest);
            return Some(Err(Error::DatabaseClosed));
        };
        if rest.is_empty() {
            self.finish(rest);
            return None;
        }

        let db = match conn.raw() {
            Ok(db) => db,
            Err(e) => return Some(Err(e)),
        };
        let mut stmt = std::ptr::null_mut();
        let mut next_tail = std::ptr::null();
        // SAFETY: `db` is open and `self.tail` points into the live,
        // NUL-terminated text copy.
        let status =
            unsafe { ffi::sqlite3_prepare_v2(db, self.tail, -1, &mut stmt, &mut next_tail) };
        if status != ffi::SQLITE_OK {
            let err = Error::engine(conn.last_error());
            self.finish(rest);
            return Some(Err(err));
        }
        if stmt.is_null() {
            self.finish(rest);
            return None;
        }

        self.tail = next_tail;
        tracing::trace!(handle = ?stmt, "prepared statement from iterator");
        let cell = StatementCell::new(stmt);
        conn.register(&cell);
        self.current = Some(Rc::clone(&cell));
        Some(Ok(Statement::new(cell, &conn)))
    }
}

impl FusedIterator for StatementIterator {}
