//! Worker configuration.

use sqlbridge_core::Config;

/// Configuration for a [`crate::Worker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name of the worker thread.
    pub thread_name: String,
    /// Configuration of every database the worker opens.
    pub database: Config,
}

impl WorkerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Sets the database configuration.
    #[must_use]
    pub fn with_database(mut self, config: Config) -> Self {
        self.database = config;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "sqlbridge-worker".to_string(),
            database: Config::default(),
        }
    }
}
