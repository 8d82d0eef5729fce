//! # sqlbridge Worker
//!
//! Runs one [`sqlbridge_core::Database`] on a dedicated thread and talks to
//! it through `{id, action, ...}` request messages.
//!
//! This crate provides:
//! - [`Request`] and [`Response`], serde messages with CBOR framing
//! - [`RequestHandler`], which turns requests into responses against one
//!   database
//! - [`Worker`], the thread that owns the database and an async client for it
//!
//! Every response carries the id of the request it answers. Failures are
//! answered with `{id, error}`; only transport failures surface as
//! [`WorkerError`].

#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod messages;
mod worker;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use handler::RequestHandler;
pub use messages::{Action, Buffer, Request, Response, ResponseBody, ACTIONS};
pub use worker::Worker;
