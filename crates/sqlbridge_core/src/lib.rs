//! # sqlbridge Core
//!
//! Safe database and statement objects over the SQLite C ABI.
//!
//! This crate provides:
//! - [`Value`] and the codec between host values and engine storage classes
//! - [`Arena`], engine-addressable memory for bound text and blobs
//! - [`Statement`], a prepared statement with an explicit lifecycle
//! - [`StatementIterator`], lazy compilation of multi-statement SQL
//! - [`Database`], which owns the connection, its statements and its host
//!   functions
//!
//! Only the raw `ffi` module of `rusqlite` is used; every handle, buffer
//! and callback crossing the boundary is managed here.
//!
//! ## Example
//!
//! ```rust
//! use sqlbridge_core::{Database, Params, ReadOptions, Value};
//!
//! let db = Database::open(None).unwrap();
//! db.run("CREATE TABLE kv(k TEXT, v BLOB)", None).unwrap();
//! db.run(
//!     "INSERT INTO kv VALUES (?, ?)",
//!     Some(&Params::from(vec![Value::from("a"), Value::from(vec![1u8, 2])])),
//! )
//! .unwrap();
//!
//! let mut rows = Vec::new();
//! db.each("SELECT * FROM kv", None, ReadOptions::default(), |row| {
//!     rows.push(row);
//!     Ok::<_, sqlbridge_core::Error>(())
//! })
//! .unwrap();
//! assert_eq!(rows[0]["v"], Value::Blob(vec![1, 2]));
//!
//! let bytes = db.export().unwrap();
//! let copy = Database::open(Some(&bytes)).unwrap();
//! let groups = copy.exec("SELECT k FROM kv", None, ReadOptions::default()).unwrap();
//! assert_eq!(groups[0].values, [[Value::from("a")]]);
//! ```

#![warn(missing_docs)]

mod arena;
mod codec;
mod config;
mod connection;
mod database;
mod error;
mod extensions;
mod function;
mod iterator;
mod statement;
mod value;
mod wire;

pub use arena::{Arena, ArenaStats};
pub use config::{Config, ReadOptions};
pub use database::{Database, ResultGroup};
pub use error::{Error, Result};
pub use function::FunctionResult;
pub use iterator::StatementIterator;
pub use statement::Statement;
pub use value::{Params, Row, SqlType, Value, MAX_SAFE_INTEGER};
