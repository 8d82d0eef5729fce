//! Database handle.

use crate::config::{Config, ReadOptions};
use crate::connection::{c_text, Connection, StatementCell};
use crate::error::{Error, Result};
use crate::extensions;
use crate::function::FunctionResult;
use crate::iterator::StatementIterator;
use crate::statement::Statement;
use crate::value::{Params, Row, Value};
use rusqlite::ffi;
use serde::{Deserialize, Serialize};
use sqlbridge_store::{ByteStore, DirStore};
use std::cell::Cell;
use std::ffi::CString;
use std::path::Path;
use std::rc::Rc;
use uuid::Uuid;

/// Rows produced by one statement of [`Database::exec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultGroup {
    /// Column names, in result order.
    pub columns: Vec<String>,
    /// One entry per row, values in column order.
    pub values: Vec<Vec<Value>>,
}

fn c_string(text: &str) -> Result<CString> {
    CString::new(text).map_err(|_| Error::InvalidString(text.to_string()))
}

fn open_handle(path: &Path) -> Result<*mut ffi::sqlite3> {
    let c_path = c_string(&path.to_string_lossy())?;
    let mut handle = std::ptr::null_mut();
    // SAFETY: `c_path` is NUL-terminated and `handle` is a valid out pointer.
    let status = unsafe { ffi::sqlite3_open(c_path.as_ptr(), &mut handle) };
    if status == ffi::SQLITE_OK {
        return Ok(handle);
    }
    let message = if handle.is_null() {
        format!("unable to open database (status {status})")
    } else {
        // SAFETY: the engine returns a handle even on failure; it must be
        // closed after reading its message.
        unsafe {
            let message = c_text(ffi::sqlite3_errmsg(handle));
            ffi::sqlite3_close_v2(handle);
            message
        }
    };
    Err(Error::engine(message))
}

/// An open database backed by a file in a byte store.
///
/// The database owns its connection, every statement prepared through it
/// and every host function registered on it. Closing (explicitly or on
/// drop) frees all of them before the connection and deletes the backing
/// file.
///
/// A `Database` and its statements must stay on one thread.
///
/// # Example
///
/// ```rust
/// use sqlbridge_core::{Database, ReadOptions, Value};
///
/// let db = Database::open(None).unwrap();
/// let groups = db
///     .exec(
///         "CREATE TABLE t(a); INSERT INTO t VALUES (1); SELECT * FROM t;",
///         None,
///         ReadOptions::default(),
///     )
///     .unwrap();
/// assert_eq!(groups.len(), 1);
/// assert_eq!(groups[0].columns, ["a"]);
/// assert_eq!(groups[0].values, [[Value::Number(1.0)]]);
/// ```
pub struct Database {
    conn: Rc<Connection>,
    store: Box<dyn ByteStore>,
    filename: String,
    config: Config,
    // Set once the backing file is gone; `export` can leave the connection
    // closed while the file still exists.
    removed: Cell<bool>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("filename", &self.filename)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a fresh database, optionally from the bytes of an existing
    /// database file.
    pub fn open(data: Option<&[u8]>) -> Result<Self> {
        Self::open_with_config(Config::default(), data)
    }

    /// Opens a fresh database with the given configuration.
    pub fn open_with_config(config: Config, data: Option<&[u8]>) -> Result<Self> {
        let store: Box<dyn ByteStore> = match &config.store_dir {
            Some(dir) => Box::new(DirStore::open(dir)?),
            None => Box::new(DirStore::temporary()?),
        };
        Self::open_in_store(config, store, data)
    }

    fn open_in_store(
        config: Config,
        store: Box<dyn ByteStore>,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        let filename = format!("{}{}", config.file_prefix, Uuid::new_v4().simple());
        store.create(&filename, data)?;

        let path = store.locate(&filename)?;
        let handle = match open_handle(&path) {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(remove_err) = store.remove(&filename) {
                    tracing::warn!(error = %remove_err, filename, "failed to remove store file");
                }
                return Err(e);
            }
        };

        let db = Self {
            conn: Connection::new(handle),
            store,
            filename,
            config,
            removed: Cell::new(false),
        };
        db.after_open()?;
        tracing::debug!(
            filename = %db.filename,
            bytes = data.map_or(0, <[u8]>::len),
            "opened database"
        );
        Ok(db)
    }

    fn after_open(&self) -> Result<()> {
        if self.config.register_extensions {
            extensions::register(&self.conn)?;
        }
        Ok(())
    }

    /// Name of the backing file inside the store.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The configuration this database was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns true until the database is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    /// Executes `sql`.
    ///
    /// With `params` the text must hold a single statement, which is
    /// prepared, bound, stepped once and freed. Without, every statement in
    /// the text runs and results are discarded.
    pub fn run(&self, sql: &str, params: Option<&Params>) -> Result<&Self> {
        match params {
            Some(params) => {
                let mut stmt = self.prepare(sql, Some(params))?;
                stmt.step()?;
                stmt.free()?;
            }
            None => {
                let db = self.conn.raw()?;
                let c_sql = c_string(sql)?;
                // SAFETY: `db` is open and `c_sql` is NUL-terminated.
                let status = unsafe {
                    ffi::sqlite3_exec(
                        db,
                        c_sql.as_ptr(),
                        None,
                        std::ptr::null_mut(),
                        std::ptr::null_mut(),
                    )
                };
                self.handle_error(status)?;
            }
        }
        Ok(self)
    }

    /// Executes every statement in `sql` and collects the rows.
    ///
    /// Statements that return no rows contribute no group. `params` are
    /// bound to the first statement only.
    pub fn exec(
        &self,
        sql: &str,
        params: Option<&Params>,
        options: ReadOptions,
    ) -> Result<Vec<ResultGroup>> {
        let mut params = params;
        let mut results = Vec::new();
        for stmt in self.iterate_statements(sql)? {
            let mut stmt = stmt?;
            if let Some(params) = params.take() {
                stmt.bind(params)?;
            }
            let mut group: Option<ResultGroup> = None;
            while stmt.step()? {
                if group.is_none() {
                    group = Some(ResultGroup {
                        columns: stmt.get_column_names()?,
                        values: Vec::new(),
                    });
                }
                let row = stmt.get(None, options)?;
                if let Some(group) = group.as_mut() {
                    group.values.push(row);
                }
            }
            stmt.free()?;
            results.extend(group);
        }
        Ok(results)
    }

    /// Runs one statement and calls `callback` with every row.
    ///
    /// The statement is freed whether or not the callback fails.
    pub fn each<F, E>(
        &self,
        sql: &str,
        params: Option<&Params>,
        options: ReadOptions,
        callback: F,
    ) -> std::result::Result<&Self, E>
    where
        F: FnMut(Row) -> std::result::Result<(), E>,
        E: From<Error>,
    {
        self.each_with_done(sql, params, options, callback, || Ok(()))
    }

    /// Like [`Database::each`], then calls `done` after the last row.
    pub fn each_with_done<F, D, E>(
        &self,
        sql: &str,
        params: Option<&Params>,
        options: ReadOptions,
        mut callback: F,
        done: D,
    ) -> std::result::Result<&Self, E>
    where
        F: FnMut(Row) -> std::result::Result<(), E>,
        D: FnOnce() -> std::result::Result<(), E>,
        E: From<Error>,
    {
        let mut stmt = self.prepare(sql, params)?;
        while stmt.step()? {
            callback(stmt.get_as_object(None, options)?)?;
        }
        stmt.free()?;
        done()?;
        Ok(self)
    }

    /// Compiles the first statement of `sql`, binding `params` if given.
    ///
    /// The statement stays registered with the database until it is
    /// freed.
    pub fn prepare(&self, sql: &str, params: Option<&Params>) -> Result<Statement> {
        let db = self.conn.raw()?;
        let c_sql = c_string(sql)?;
        let mut handle = std::ptr::null_mut();
        // SAFETY: `db` is open and `c_sql` is NUL-terminated.
        let status = unsafe {
            ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &mut handle, std::ptr::null_mut())
        };
        self.handle_error(status)?;
        if handle.is_null() {
            return Err(Error::NothingToPrepare);
        }
        tracing::trace!(handle = ?handle, "prepared statement");

        let cell = StatementCell::new(handle);
        self.conn.register(&cell);
        let mut stmt = Statement::new(cell, &self.conn);
        if let Some(params) = params {
            stmt.bind(params)?;
        }
        Ok(stmt)
    }

    /// Iterates over the statements of `sql`, compiling them one by one.
    pub fn iterate_statements(&self, sql: &str) -> Result<StatementIterator> {
        StatementIterator::new(&self.conn, sql)
    }

    /// Returns the bytes of the database file.
    ///
    /// Every open statement is freed and every host function unregistered
    /// before the connection is closed; the database is then reopened on
    /// the same file and stays usable.
    pub fn export(&self) -> Result<Vec<u8>> {
        self.conn.raw()?;
        self.conn.close()?;
        let bytes = self.store.read_all(&self.filename)?;
        let handle = open_handle(&self.store.locate(&self.filename)?)?;
        self.conn.set_handle(handle);
        self.after_open()?;
        tracing::debug!(filename = %self.filename, bytes = bytes.len(), "exported database");
        Ok(bytes)
    }

    /// Closes the database and deletes its backing file.
    ///
    /// Closing an already closed database does nothing. A database left
    /// closed by a failed [`Database::export`] still has its file removed.
    pub fn close(&self) -> Result<()> {
        if self.conn.is_open() {
            self.conn.close()?;
        }
        if !self.removed.get() {
            self.store.remove(&self.filename)?;
            self.removed.set(true);
            tracing::debug!(filename = %self.filename, "closed database");
        }
        Ok(())
    }

    /// Rows changed by the most recent insert, update or delete.
    pub fn get_rows_modified(&self) -> Result<u64> {
        let db = self.conn.raw()?;
        // SAFETY: `db` is open.
        let changes = unsafe { ffi::sqlite3_changes(db) };
        Ok(u64::try_from(changes).unwrap_or(0))
    }

    /// Translates an engine status code.
    ///
    /// `SQLITE_OK` passes; anything else becomes [`Error::Engine`] with the
    /// connection's current message.
    pub fn handle_error(&self, status: i32) -> Result<()> {
        self.conn.check(status)
    }

    /// Registers `f` as the SQL function `name`, replacing any host function
    /// already registered under that name.
    ///
    /// The function accepts any number of arguments. Errors returned by `f`
    /// and panics inside it become SQL errors of the calling statement.
    ///
    /// # Example
    ///
    /// ```rust
    /// use sqlbridge_core::{Database, ReadOptions, Value};
    ///
    /// let db = Database::open(None).unwrap();
    /// db.create_function("double", |args: &[Value]| {
    ///     let n = args.first().and_then(Value::as_f64).ok_or("expected a number")?;
    ///     Ok(Value::Number(n * 2.0))
    /// })
    /// .unwrap();
    /// let groups = db.exec("SELECT double(21)", None, ReadOptions::default()).unwrap();
    /// assert_eq!(groups[0].values, [[Value::Number(42.0)]]);
    /// ```
    pub fn create_function<F>(&self, name: &str, f: F) -> Result<&Self>
    where
        F: Fn(&[Value]) -> FunctionResult + 'static,
    {
        let db = self.conn.raw()?;
        let status = self
            .conn
            .functions()
            .borrow_mut()
            .install(db, name, Box::new(f))?;
        self.handle_error(status)?;
        Ok(self)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, filename = %self.filename, "failed to close database on drop");
        }
    }
}
