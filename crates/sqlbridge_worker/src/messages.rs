//! Request and response messages.
//!
//! Messages are plain serde types shaped like `{ "id": .., "action": .., .. }`
//! objects, so any self-describing format carries them. The worker's own
//! framing is CBOR.

use crate::error::{WorkerError, WorkerResult};
use ciborium::Value as WireValue;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlbridge_core::{ReadOptions, ResultGroup, Row};
use std::fmt;

/// Raw bytes of a database file.
///
/// Serialized as a byte string; sequences of small integers are accepted
/// when decoding so formats without a bytes type still work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer(pub Vec<u8>);

impl Buffer {
    /// Consumes the buffer, returning the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Buffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

struct BufferVisitor;

impl<'de> Visitor<'de> for BufferVisitor {
    type Value = Buffer;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte string or a sequence of bytes")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Buffer, E> {
        Ok(Buffer(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Buffer, E> {
        Ok(Buffer(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Buffer, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(Buffer(bytes))
    }
}

impl<'de> Deserialize<'de> for Buffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_byte_buf(BufferVisitor)
    }
}

/// Actions a request can name.
pub const ACTIONS: [&str; 5] = ["open", "exec", "each", "export", "close"];

/// What a request asks the worker to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Open a database, replacing any open one.
    Open {
        /// Bytes of an existing database file.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer: Option<Buffer>,
    },
    /// Run every statement of `sql` and collect the rows.
    Exec {
        /// SQL text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
        /// Parameters: an array (positional) or a map (named).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<WireValue>,
        /// Read options.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<ReadOptions>,
    },
    /// Run one statement and stream its rows.
    Each {
        /// SQL text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sql: Option<String>,
        /// Parameters: an array (positional) or a map (named).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<WireValue>,
        /// Read options.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        config: Option<ReadOptions>,
    },
    /// Return the bytes of the open database.
    Export,
    /// Close the open database.
    Close,
}

impl Action {
    /// The wire name of this action.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Open { .. } => "open",
            Action::Exec { .. } => "exec",
            Action::Each { .. } => "each",
            Action::Export => "export",
            Action::Close => "close",
        }
    }
}

/// A request to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen identifier echoed in every response.
    pub id: u64,
    /// The requested action and its fields.
    #[serde(flatten)]
    pub action: Action,
}

impl Request {
    /// Creates an `open` request.
    pub fn open(id: u64, buffer: Option<Vec<u8>>) -> Self {
        Self {
            id,
            action: Action::Open {
                buffer: buffer.map(Buffer),
            },
        }
    }

    /// Creates an `exec` request.
    pub fn exec(id: u64, sql: impl Into<String>) -> Self {
        Self {
            id,
            action: Action::Exec {
                sql: Some(sql.into()),
                params: None,
                config: None,
            },
        }
    }

    /// Creates an `each` request.
    pub fn each(id: u64, sql: impl Into<String>) -> Self {
        Self {
            id,
            action: Action::Each {
                sql: Some(sql.into()),
                params: None,
                config: None,
            },
        }
    }

    /// Creates an `export` request.
    pub fn export(id: u64) -> Self {
        Self {
            id,
            action: Action::Export,
        }
    }

    /// Creates a `close` request.
    pub fn close(id: u64) -> Self {
        Self {
            id,
            action: Action::Close,
        }
    }

    /// Sets the parameters of an `exec` or `each` request.
    #[must_use]
    pub fn with_params(mut self, value: WireValue) -> Self {
        if let Action::Exec { params, .. } | Action::Each { params, .. } = &mut self.action {
            *params = Some(value);
        }
        self
    }

    /// Sets the read options of an `exec` or `each` request.
    #[must_use]
    pub fn with_options(mut self, options: ReadOptions) -> Self {
        if let Action::Exec { config, .. } | Action::Each { config, .. } = &mut self.action {
            *config = Some(options);
        }
        self
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> WorkerResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    ///
    /// A request naming an unknown action fails with
    /// [`WorkerError::UnknownAction`].
    pub fn decode(bytes: &[u8]) -> WorkerResult<Self> {
        let raw: WireValue = ciborium::from_reader(bytes).map_err(WorkerError::codec)?;
        Self::from_wire(&raw)
    }

    /// Converts a decoded CBOR item into a request.
    pub fn from_wire(raw: &WireValue) -> WorkerResult<Self> {
        let WireValue::Map(entries) = raw else {
            return Err(WorkerError::protocol("request must be a map"));
        };
        let action = entries
            .iter()
            .find_map(|(key, value)| match (key, value) {
                (WireValue::Text(key), WireValue::Text(value)) if key == "action" => {
                    Some(value.as_str())
                }
                _ => None,
            })
            .ok_or_else(|| WorkerError::protocol("request has no action"))?;
        if !ACTIONS.contains(&action) {
            return Err(WorkerError::UnknownAction(action.to_string()));
        }
        raw.deserialized().map_err(WorkerError::codec)
    }
}

/// The payload of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// A database was opened.
    Ready {
        /// Always true.
        ready: bool,
    },
    /// Rows of every row-producing statement of an `exec`.
    Results {
        /// One group per statement.
        results: Vec<ResultGroup>,
    },
    /// One row of an `each`.
    Row {
        /// The row keyed by column name.
        row: Row,
        /// Always false.
        finished: bool,
    },
    /// End of an `each`.
    Finished {
        /// Always true.
        finished: bool,
    },
    /// Bytes of an exported database.
    Buffer {
        /// The database file.
        buffer: Buffer,
    },
    /// The request failed.
    Error {
        /// Error message.
        error: String,
    },
    /// The request succeeded with nothing to report.
    Empty {},
}

/// A response from the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Identifier of the request this answers.
    pub id: u64,
    /// The payload.
    #[serde(flatten)]
    pub body: ResponseBody,
}

impl Response {
    fn new(id: u64, body: ResponseBody) -> Self {
        Self { id, body }
    }

    /// `{id, ready: true}`
    pub fn ready(id: u64) -> Self {
        Self::new(id, ResponseBody::Ready { ready: true })
    }

    /// `{id, results}`
    pub fn results(id: u64, results: Vec<ResultGroup>) -> Self {
        Self::new(id, ResponseBody::Results { results })
    }

    /// `{id, row, finished: false}`
    pub fn row(id: u64, row: Row) -> Self {
        Self::new(
            id,
            ResponseBody::Row {
                row,
                finished: false,
            },
        )
    }

    /// `{id, finished: true}`
    pub fn finished(id: u64) -> Self {
        Self::new(id, ResponseBody::Finished { finished: true })
    }

    /// `{id, buffer}`
    pub fn buffer(id: u64, bytes: Vec<u8>) -> Self {
        Self::new(
            id,
            ResponseBody::Buffer {
                buffer: Buffer(bytes),
            },
        )
    }

    /// `{id, error}`
    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self::new(
            id,
            ResponseBody::Error {
                error: message.into(),
            },
        )
    }

    /// `{id}`
    pub fn empty(id: u64) -> Self {
        Self::new(id, ResponseBody::Empty {})
    }

    /// Returns true if no further response follows for this id.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.body, ResponseBody::Row { .. })
    }

    /// The error message, if the request failed.
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Error { error } => Some(error),
            _ => None,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> WorkerResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> WorkerResult<Self> {
        ciborium::from_reader(bytes).map_err(WorkerError::codec)
    }
}

fn encode<T: Serialize>(message: &T) -> WorkerResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(message, &mut buf).map_err(WorkerError::codec)?;
    Ok(buf)
}
