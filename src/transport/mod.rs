//! Transport layer for client ↔ nREPL server communication.
//!
//! Provides the `Connector` trait (connection factory) and `Connection`,
//! which encodes requests onto a byte stream and decodes response records
//! off it one at a time. Records are bencode dictionaries written back to
//! back; `framing` finds where each one ends.

pub mod framing;
pub mod protocol;

pub use protocol::{Op, Request, Response};

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::error::{ClientError, DecodeError};

/// Maximum response size (64 MB). Safety valve against malformed streams.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Factory for byte-stream connections to a `host:port` address.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, addr: &str) -> io::Result<Self::Stream>;
}

/// Plain TCP connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: &str) -> io::Result<TcpStream> {
        debug!(addr = %addr, "Connecting");
        TcpStream::connect(addr).await
    }
}

/// A byte stream plus the read-ahead buffer for response decoding.
///
/// Bytes read past the end of one record stay buffered, so the next
/// `recv_response` starts exactly at the following record.
#[derive(Debug)]
pub struct Connection<S> {
    stream: S,
    buf: Vec<u8>,
    max_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub const fn new(stream: S) -> Self {
        Self::with_max_size(stream, MAX_MESSAGE_SIZE)
    }

    /// Like `new`, with a custom cap on a single buffered response.
    pub const fn with_max_size(stream: S, max_size: usize) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            max_size,
        }
    }

    /// Encode a request and write it to the stream.
    pub async fn send_request(&mut self, req: &Request) -> Result<(), ClientError> {
        let payload = serde_bencode::to_bytes(req).map_err(ClientError::Encode)?;
        trace!(bytes = payload.len(), "Writing request");

        self.stream
            .write_all(&payload)
            .await
            .map_err(ClientError::Write)?;
        self.stream.flush().await.map_err(ClientError::Write)?;
        Ok(())
    }

    /// Read and decode exactly one response record.
    pub async fn recv_response(&mut self) -> Result<Response, DecodeError> {
        let frame = self.next_frame().await?;
        serde_bencode::from_bytes(&frame).map_err(DecodeError::Malformed)
    }

    async fn next_frame(&mut self) -> Result<Vec<u8>, DecodeError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(len) = framing::value_len(&self.buf)? {
                return Ok(self.buf.drain(..len).collect());
            }

            if self.buf.len() > self.max_size {
                return Err(DecodeError::TooLarge {
                    size: self.buf.len(),
                    max: self.max_size,
                });
            }

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(if self.buf.is_empty() {
                    DecodeError::ConnectionClosed
                } else {
                    DecodeError::Truncated {
                        buffered: self.buf.len(),
                    }
                });
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Best-effort close of the write side. The socket itself is released
    /// when the `Connection` is dropped.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Error shutting down connection");
        }
    }
}
