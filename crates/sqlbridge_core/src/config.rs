//! Database and read configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the database file.
    ///
    /// `None` gives every database its own temporary directory, deleted
    /// together with the database.
    pub store_dir: Option<PathBuf>,

    /// Whether to install the built-in text extension functions.
    pub register_extensions: bool,

    /// Prefix of the generated database file name.
    pub file_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            register_extensions: true,
            file_prefix: "dbfile_".to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the directory holding database files.
    #[must_use]
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Sets whether to install the built-in extension functions.
    #[must_use]
    pub const fn register_extensions(mut self, value: bool) -> Self {
        self.register_extensions = value;
        self
    }

    /// Sets the prefix of generated database file names.
    #[must_use]
    pub fn file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }
}

/// Options controlling how result columns are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Read integer columns as exact 64-bit integers instead of numbers.
    #[serde(rename = "useBigInt", default)]
    pub use_big_int: bool,
}

impl ReadOptions {
    /// Options that read integer columns exactly.
    #[must_use]
    pub const fn big_int() -> Self {
        Self { use_big_int: true }
    }
}
