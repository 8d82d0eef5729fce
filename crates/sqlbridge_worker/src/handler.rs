//! Request dispatch against a single database.

use crate::error::{WorkerError, WorkerResult};
use crate::messages::{Action, Request, Response};
use ciborium::Value as WireValue;
use sqlbridge_core::{Config, Database, Params, ReadOptions};

fn decode_params(params: Option<WireValue>) -> WorkerResult<Option<Params>> {
    match params {
        Some(wire) => Ok(Params::from_wire(wire)?),
        None => Ok(None),
    }
}

/// Executes requests against at most one open database.
///
/// The handler owns the database; it is meant to live on the worker thread.
/// Every failure is answered with an `{id, error}` response instead of
/// being returned.
pub struct RequestHandler {
    db: Option<Database>,
    config: Config,
}

impl RequestHandler {
    /// Creates a handler that opens databases with `config`.
    pub fn new(config: Config) -> Self {
        Self { db: None, config }
    }

    /// Returns true if a database is open.
    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }

    /// Handles one request, passing each response to `emit` in order.
    pub fn handle(&mut self, request: Request, emit: &mut dyn FnMut(Response)) {
        let id = request.id;
        tracing::debug!(id, action = request.action.name(), "handling request");
        if let Err(e) = self.dispatch(id, request.action, emit) {
            tracing::warn!(id, error = %e, "request failed");
            emit(Response::error(id, e.to_string()));
        }
    }

    fn database(&mut self) -> WorkerResult<&Database> {
        if self.db.is_none() {
            self.db = Some(Database::open_with_config(self.config.clone(), None)?);
        }
        self.db
            .as_ref()
            .ok_or(WorkerError::Core(sqlbridge_core::Error::DatabaseClosed))
    }

    fn dispatch(
        &mut self,
        id: u64,
        action: Action,
        emit: &mut dyn FnMut(Response),
    ) -> WorkerResult<()> {
        match action {
            Action::Open { buffer } => {
                self.close_database()?;
                let data = buffer.as_ref().map(AsRef::as_ref);
                self.db = Some(Database::open_with_config(self.config.clone(), data)?);
                emit(Response::ready(id));
            }
            Action::Exec {
                sql,
                params,
                config,
            } => {
                let sql = sql
                    .filter(|s| !s.is_empty())
                    .ok_or(WorkerError::MissingArgument("exec: Missing query string"))?;
                let params = decode_params(params)?;
                let options = config.unwrap_or_default();
                let results = self.database()?.exec(&sql, params.as_ref(), options)?;
                emit(Response::results(id, results));
            }
            Action::Each {
                sql,
                params,
                config,
            } => {
                let sql = sql
                    .filter(|s| !s.is_empty())
                    .ok_or(WorkerError::MissingArgument("each: Missing query string"))?;
                let params = decode_params(params)?;
                let options: ReadOptions = config.unwrap_or_default();
                self.database()?
                    .each(&sql, params.as_ref(), options, |row| {
                        emit(Response::row(id, row));
                        Ok::<_, WorkerError>(())
                    })?;
                emit(Response::finished(id));
            }
            Action::Export => {
                let db = self
                    .db
                    .as_ref()
                    .ok_or(WorkerError::Core(sqlbridge_core::Error::DatabaseClosed))?;
                emit(Response::buffer(id, db.export()?));
            }
            Action::Close => {
                self.close_database()?;
                emit(Response::empty(id));
            }
        }
        Ok(())
    }

    fn close_database(&mut self) -> WorkerResult<()> {
        if let Some(db) = self.db.take() {
            db.close()?;
        }
        Ok(())
    }

    /// Closes the open database, if any.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.close_database() {
            tracing::warn!(error = %e, "failed to close database on shutdown");
        }
    }
}
