//! Prepared statements.

use crate::arena::ArenaStats;
use crate::codec;
use crate::config::ReadOptions;
use crate::connection::{c_text, Connection, StatementCell};
use crate::error::{Error, Result};
use crate::value::{Params, Row, Value};
use rusqlite::ffi;
use std::ffi::{c_int, CString};
use std::rc::{Rc, Weak};

/// One prepared statement of a [`crate::Database`].
///
/// A statement moves through `prepared -> bound -> stepped -> reset` any
/// number of times and ends when it is freed, either explicitly with
/// [`Statement::free`], on drop, or when its database is closed or
/// exported. After that every operation fails with
/// [`Error::StatementClosed`].
///
/// Text and blob parameters are copied into memory owned by the statement
/// and released on every [`Statement::reset`] and on free.
///
/// # Example
///
/// ```rust
/// use sqlbridge_core::{Database, Params, ReadOptions, Value};
///
/// let db = Database::open(None).unwrap();
/// let mut stmt = db.prepare("SELECT ?1 + 1 AS n", None).unwrap();
/// let row = stmt
///     .get_as_object(Some(&Params::from(vec![Value::from(41)])), ReadOptions::default())
///     .unwrap();
/// assert_eq!(row["n"], Value::Number(42.0));
/// ```
#[derive(Debug)]
pub struct Statement {
    cell: Rc<StatementCell>,
    conn: Weak<Connection>,
    next_index: c_int,
}

impl Statement {
    pub(crate) fn new(cell: Rc<StatementCell>, conn: &Rc<Connection>) -> Self {
        Self {
            cell,
            conn: Rc::downgrade(conn),
            next_index: 1,
        }
    }

    pub(crate) fn cell(&self) -> &Rc<StatementCell> {
        &self.cell
    }

    fn conn(&self) -> Result<Rc<Connection>> {
        self.conn.upgrade().ok_or(Error::DatabaseClosed)
    }

    /// Binds `params`, resetting the statement first.
    ///
    /// Positional values go to placeholders 1, 2, 3 and so on; named values
    /// go to the placeholder with exactly that name (prefix included), and
    /// names the statement does not contain are skipped.
    ///
    /// Returns `Ok(true)` once every value is bound.
    pub fn bind(&mut self, params: &Params) -> Result<bool> {
        self.cell.raw()?;
        self.reset()?;
        match params {
            Params::Positional(values) => self.bind_positional(values)?,
            Params::Named(pairs) => self.bind_named(pairs)?,
        }
        Ok(true)
    }

    fn bind_positional(&mut self, values: &[Value]) -> Result<()> {
        for value in values {
            let index = self.next_index;
            self.next_index += 1;
            self.bind_at(index, value)?;
        }
        Ok(())
    }

    fn bind_named(&mut self, pairs: &[(String, Value)]) -> Result<()> {
        let stmt = self.cell.raw()?;
        for (name, value) in pairs {
            let c_name = CString::new(name.as_str()).map_err(|_| Error::InvalidString(name.clone()))?;
            // SAFETY: `stmt` is live and `c_name` is NUL-terminated.
            let index = unsafe { ffi::sqlite3_bind_parameter_index(stmt, c_name.as_ptr()) };
            if index != 0 {
                self.bind_at(index, value)?;
            }
        }
        Ok(())
    }

    fn bind_at(&mut self, index: c_int, value: &Value) -> Result<()> {
        let stmt = self.cell.raw()?;
        let status = {
            let mut arena = self.cell.arena().borrow_mut();
            codec::bind_value(stmt, &mut arena, index, value)?
        };
        self.conn()?.check(status)
    }

    /// Executes one step.
    ///
    /// Returns `true` when a row is available and `false` once the
    /// statement is done.
    pub fn step(&mut self) -> Result<bool> {
        let stmt = self.cell.raw()?;
        self.next_index = 1;
        // SAFETY: `stmt` is live.
        let status = unsafe { ffi::sqlite3_step(stmt) };
        match status {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            _ => Err(Error::engine(self.conn()?.last_error())),
        }
    }

    /// Reads the current row.
    ///
    /// With `params`, binds them and steps once before reading.
    pub fn get(&mut self, params: Option<&Params>, options: ReadOptions) -> Result<Vec<Value>> {
        if let Some(params) = params {
            if self.bind(params)? {
                self.step()?;
            }
        }
        let stmt = self.cell.raw()?;
        // SAFETY: `stmt` is live.
        let count = unsafe { ffi::sqlite3_data_count(stmt) };
        Ok((0..count)
            .map(|index| codec::read_column(stmt, index, options))
            .collect())
    }

    /// Names of the result columns, available before the first step.
    pub fn get_column_names(&self) -> Result<Vec<String>> {
        let stmt = self.cell.raw()?;
        // SAFETY: `stmt` is live.
        let count = unsafe { ffi::sqlite3_column_count(stmt) };
        Ok((0..count)
            // SAFETY: `index` is below the column count.
            .map(|index| c_text(unsafe { ffi::sqlite3_column_name(stmt, index) }))
            .collect())
    }

    /// Reads the current row keyed by column name.
    ///
    /// When two columns share a name the later one wins.
    pub fn get_as_object(&mut self, params: Option<&Params>, options: ReadOptions) -> Result<Row> {
        let values = self.get(params, options)?;
        let names = self.get_column_names()?;
        Ok(names.into_iter().zip(values).collect())
    }

    /// Binds `params` if given, steps once and resets.
    pub fn run(&mut self, params: Option<&Params>) -> Result<bool> {
        self.cell.raw()?;
        if let Some(params) = params {
            self.bind(params)?;
        }
        self.step()?;
        self.reset()
    }

    /// Clears bindings, rewinds the statement and releases parameter memory.
    ///
    /// Returns whether both engine calls reported OK.
    pub fn reset(&mut self) -> Result<bool> {
        let stmt = self.cell.raw()?;
        self.next_index = 1;
        // SAFETY: `stmt` is live.
        let ok = unsafe {
            ffi::sqlite3_clear_bindings(stmt) == ffi::SQLITE_OK
                && ffi::sqlite3_reset(stmt) == ffi::SQLITE_OK
        };
        // Bindings are cleared, so the engine no longer points into the arena.
        self.cell.arena().borrow_mut().release_all();
        Ok(ok)
    }

    /// Frees the statement.
    ///
    /// Returns whether finalization reported OK. Freeing twice fails with
    /// [`Error::StatementClosed`].
    pub fn free(&mut self) -> Result<bool> {
        self.cell.raw()?;
        let key = self.cell.key();
        let ok = self.cell.finalize();
        if let Some(conn) = self.conn.upgrade() {
            conn.forget(key);
        }
        Ok(ok)
    }

    /// Returns true until the statement is freed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.cell.is_live()
    }

    /// The SQL text this statement was compiled from.
    pub fn get_sql(&self) -> Result<String> {
        let stmt = self.cell.raw()?;
        // SAFETY: `stmt` is live.
        Ok(c_text(unsafe { ffi::sqlite3_sql(stmt) }))
    }

    /// Number of result columns.
    pub fn column_count(&self) -> Result<usize> {
        let stmt = self.cell.raw()?;
        // SAFETY: `stmt` is live.
        let count = unsafe { ffi::sqlite3_column_count(stmt) };
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn column(&self, index: usize) -> Result<(*mut ffi::sqlite3_stmt, c_int)> {
        let stmt = self.cell.raw()?;
        let index = c_int::try_from(index).map_err(|_| Error::engine("column index out of range"))?;
        Ok((stmt, index))
    }

    /// Reads column `index` of the current row as a number.
    pub fn get_number(&self, index: usize) -> Result<f64> {
        let (stmt, index) = self.column(index)?;
        // SAFETY: `stmt` is live; out-of-range columns read as 0.
        Ok(unsafe { ffi::sqlite3_column_double(stmt, index) })
    }

    /// Reads column `index` of the current row as an exact integer,
    /// parsed from the column's text form.
    pub fn get_big_int(&self, index: usize) -> Result<i64> {
        let (stmt, index) = self.column(index)?;
        // SAFETY: `stmt` is live.
        let text = unsafe { codec::column_string(stmt, index) };
        text.trim()
            .parse()
            .map_err(|_| Error::engine(format!("cannot read {text:?} as an integer")))
    }

    /// Reads column `index` of the current row as text.
    pub fn get_string(&self, index: usize) -> Result<String> {
        let (stmt, index) = self.column(index)?;
        // SAFETY: `stmt` is live.
        Ok(unsafe { codec::column_string(stmt, index) })
    }

    /// Reads column `index` of the current row as bytes.
    pub fn get_blob(&self, index: usize) -> Result<Vec<u8>> {
        let (stmt, index) = self.column(index)?;
        // SAFETY: `stmt` is live.
        Ok(unsafe { codec::column_bytes(stmt, index) })
    }

    /// Allocation counters of the parameter memory.
    #[must_use]
    pub fn arena_stats(&self) -> ArenaStats {
        self.cell.arena().borrow().stats()
    }

    /// Parameter allocations not yet released.
    #[must_use]
    pub fn pending_allocations(&self) -> usize {
        self.cell.arena().borrow().len()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if self.cell.is_live() {
            if let Err(e) = self.free() {
                tracing::warn!(error = %e, "failed to free statement on drop");
            }
        }
    }
}
