//! The worker thread and its client handle.

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::handler::RequestHandler;
use crate::messages::{Request, Response};
use parking_lot::Mutex;
use sqlbridge_core::Config;
use std::collections::VecDeque;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Responses read from the worker but not yet handed out.
struct Inbox {
    rx: UnboundedReceiver<Response>,
    stash: VecDeque<Response>,
}

impl Inbox {
    async fn next(&mut self) -> WorkerResult<Response> {
        if let Some(response) = self.stash.pop_front() {
            return Ok(response);
        }
        self.rx.recv().await.ok_or(WorkerError::Disconnected)
    }
}

/// A database running on its own thread.
///
/// Requests are queued and handled one at a time in arrival order. The
/// database never leaves the worker thread.
///
/// ```rust
/// use sqlbridge_worker::{Request, ResponseBody, Worker, WorkerConfig};
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let worker = Worker::spawn(WorkerConfig::default()).unwrap();
///     let responses = worker.request(Request::exec(1, "SELECT 40 + 2 AS n")).await.unwrap();
///     assert!(matches!(responses[0].body, ResponseBody::Results { .. }));
///     worker.shutdown().unwrap();
/// });
/// ```
pub struct Worker {
    name: String,
    requests: Mutex<Option<UnboundedSender<Request>>>,
    inbox: tokio::sync::Mutex<Inbox>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    /// Starts a worker thread.
    pub fn spawn(config: WorkerConfig) -> WorkerResult<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let database = config.database;

        let thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run(request_rx, response_tx, database))?;

        Ok(Self {
            name: config.thread_name,
            requests: Mutex::new(Some(request_tx)),
            inbox: tokio::sync::Mutex::new(Inbox {
                rx: response_rx,
                stash: VecDeque::new(),
            }),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true until [`Worker::shutdown`] is called.
    pub fn is_running(&self) -> bool {
        self.requests.lock().is_some()
    }

    /// Queues a request without waiting for its responses.
    pub fn post(&self, request: Request) -> WorkerResult<()> {
        let requests = self.requests.lock();
        let tx = requests.as_ref().ok_or(WorkerError::Disconnected)?;
        tx.send(request).map_err(|_| WorkerError::Disconnected)
    }

    /// Decodes a CBOR request and queues it.
    ///
    /// Undecodable requests, including unknown actions, are returned to the
    /// caller and never reach the worker.
    pub fn post_bytes(&self, bytes: &[u8]) -> WorkerResult<()> {
        self.post(Request::decode(bytes)?)
    }

    /// Waits for the next response.
    pub async fn recv(&self) -> WorkerResult<Response> {
        self.inbox.lock().await.next().await
    }

    /// Sends a request and collects every response to it.
    ///
    /// The last element is the terminal response. Responses to other
    /// requests that arrive meanwhile stay queued for [`Worker::recv`].
    pub async fn request(&self, request: Request) -> WorkerResult<Vec<Response>> {
        let id = request.id;
        let mut inbox = self.inbox.lock().await;
        self.post(request)?;

        let mut collected = Vec::new();
        loop {
            let response = inbox.rx.recv().await.ok_or(WorkerError::Disconnected)?;
            if response.id != id {
                inbox.stash.push_back(response);
                continue;
            }
            let terminal = response.is_terminal();
            collected.push(response);
            if terminal {
                return Ok(collected);
            }
        }
    }

    /// Stops accepting requests and waits for queued ones to finish.
    ///
    /// Calling it again does nothing.
    pub fn shutdown(&self) -> WorkerResult<()> {
        self.requests.lock().take();
        let Some(thread) = self.thread.lock().take() else {
            return Ok(());
        };
        thread.join().map_err(|_| {
            tracing::warn!(worker = %self.name, "worker thread panicked");
            WorkerError::Disconnected
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(worker = %self.name, error = %e, "failed to stop worker");
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn run(
    mut requests: UnboundedReceiver<Request>,
    responses: UnboundedSender<Response>,
    config: Config,
) {
    tracing::info!("worker started");
    let mut handler = RequestHandler::new(config);
    while let Some(request) = requests.blocking_recv() {
        handler.handle(request, &mut |response| {
            if responses.send(response).is_err() {
                tracing::trace!("response dropped, client is gone");
            }
        });
    }
    handler.shutdown();
    tracing::info!("worker stopped");
}
