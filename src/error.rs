//! Error types for the nREPL client.
//!
//! Transport-kind failures (`ClientError`) are kept apart from evaluation
//! failures, which are not errors at this layer: they come back as
//! [`Outcome::EvalError`](crate::client::Outcome::EvalError).

use thiserror::Error;

use crate::transport::protocol::Op;

/// Errors raised while building a request, before anything is sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Unknown op: '{0}' (expected eval, clone, close or format-code)")]
    UnknownOp(String),

    #[error("Op '{0}' requires a code string")]
    MissingCode(Op),
}

/// Bencode framing errors found while scanning for a value boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid byte 0x{byte:02x} at offset {offset}")]
    InvalidToken { byte: u8, offset: usize },

    #[error("Unexpected end marker at offset {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("Invalid integer at offset {offset}")]
    InvalidInteger { offset: usize },

    #[error("Invalid string length at offset {offset}")]
    InvalidLength { offset: usize },

    #[error("Nesting deeper than {max} at offset {offset}")]
    TooDeep { offset: usize, max: usize },
}

/// Failures reading one response record off the connection.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The server closed the connection between records.
    #[error("Connection closed by server")]
    ConnectionClosed,

    /// The server closed the connection partway through a record.
    #[error("Connection closed mid-response ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    #[error("Response exceeds max size: {size} > {max}")]
    TooLarge { size: usize, max: usize },

    #[error("Malformed framing: {0}")]
    Frame(#[from] FrameError),

    #[error("Malformed response: {0}")]
    Malformed(#[source] serde_bencode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the protocol driver.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Error connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error encoding request: {0}")]
    Encode(#[source] serde_bencode::Error),

    #[error("Error writing request: {0}")]
    Write(#[source] std::io::Error),

    #[error("Error decoding response: {0}")]
    Decode(#[from] DecodeError),

    /// A previous exchange failed; the connection state is unknown.
    #[error("Connection is unusable after an earlier failure")]
    Unusable,

    #[error("Server response is missing '{0}'")]
    MissingField(&'static str),
}
