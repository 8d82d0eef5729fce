//! # sqlbridge Store
//!
//! Named byte stores that back sqlbridge database files.
//!
//! The SQL engine opens its database through a file path, so every
//! database needs a place where a named blob can be created, read back in
//! full, and deleted again. Stores are **opaque**: they never look inside the
//! bytes they hold.
//!
//! ## Available Stores
//!
//! - [`DirStore`] - A directory of named files, either caller-provided or a
//!   temporary directory removed on drop
//!
//! ## Example
//!
//! ```rust
//! use sqlbridge_store::{ByteStore, DirStore};
//!
//! let store = DirStore::temporary().unwrap();
//! store.create("dbfile_1", Some(b"hello")).unwrap();
//! assert_eq!(store.read_all("dbfile_1").unwrap(), b"hello");
//! store.remove("dbfile_1").unwrap();
//! assert!(!store.exists("dbfile_1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod dir;
mod error;
mod store;

pub use dir::DirStore;
pub use error::{StoreError, StoreResult};
pub use store::ByteStore;
