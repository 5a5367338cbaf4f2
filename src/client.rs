//! nREPL protocol driver.
//!
//! A `Client` owns one connection and runs one request at a time: the
//! request is written, then response records are pulled off the stream
//! until one whose *first* status token is `"done"` arrives.
//!
//! State machine per exchange: `Idle → Sent → Streaming → {Done, Failed}`.
//! `Failed` is sticky: after any encode, write or decode failure the
//! connection is shut down and dropped, and every later call returns
//! [`ClientError::Unusable`]. The same goes for starting a new request
//! while an earlier `Exchange` was dropped before reaching `Done`.
//!
//! Note that only the first status token drives the loop. A record with
//! `status = ["eval-error", "done"]` flags an evaluation error but does not
//! end the exchange; the server is expected to follow with a record whose
//! status starts with `"done"`.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, trace, warn};

use crate::error::ClientError;
use crate::transport::protocol::{Request, Response};
use crate::transport::{Connection, Connector, TcpConnector};

/// Final result of a completed exchange.
///
/// Transport-kind failures are not outcomes; they come back as
/// `Err(ClientError)` from [`Client::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server finished the request without reporting an evaluation error.
    Success,
    /// The server reported `eval-error`. Carries the code that was sent
    /// (empty for ops without code).
    EvalError { code: String },
}

impl Outcome {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Sent,
    Streaming,
    Done,
    Failed,
}

/// Client for a single nREPL connection.
#[derive(Debug)]
pub struct Client<S> {
    /// `None` once the client has failed; the stream is released then.
    conn: Option<Connection<S>>,
    state: State,
}

impl Client<tokio::net::TcpStream> {
    /// Connect over TCP to `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        Self::connect_with(&TcpConnector, addr).await
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Client<S> {
    /// Wrap an already-open byte stream.
    pub const fn new(stream: S) -> Self {
        Self {
            conn: Some(Connection::new(stream)),
            state: State::Idle,
        }
    }

    /// Open a connection through `connector`.
    pub async fn connect_with<C>(connector: &C, addr: &str) -> Result<Self, ClientError>
    where
        C: Connector<Stream = S>,
    {
        let stream = connector
            .connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self::new(stream))
    }

    pub const fn state(&self) -> State {
        self.state
    }

    /// Send `req` and return the lazy sequence of its responses.
    #[instrument(skip(self, req), fields(op = %req.op))]
    pub async fn begin<'a>(&'a mut self, req: &'a Request) -> Result<Exchange<'a, S>, ClientError> {
        match self.state {
            State::Idle | State::Done => self.state = State::Idle,
            // An abandoned exchange leaves unread responses on the stream.
            State::Sent | State::Streaming | State::Failed => return Err(ClientError::Unusable),
        }

        debug!(
            session = req.session.as_deref().unwrap_or(""),
            code_len = req.code_text().len(),
            "Sending request"
        );

        let Some(conn) = self.conn.as_mut() else {
            return Err(ClientError::Unusable);
        };
        if let Err(e) = conn.send_request(req).await {
            warn!(error = %e, "Failed to send request");
            self.fail().await;
            return Err(e);
        }
        self.state = State::Sent;

        Ok(Exchange {
            client: self,
            code: req.code_text(),
            eval_error: false,
        })
    }

    /// Send `req`, calling `handler` once per response record in stream
    /// order, and classify the result once the server reports `done`.
    pub async fn send<F>(&mut self, req: &Request, mut handler: F) -> Result<Outcome, ClientError>
    where
        F: FnMut(Response),
    {
        let mut exchange = self.begin(req).await?;
        while let Some(resp) = exchange.next_response().await? {
            handler(resp);
        }
        exchange.into_outcome().await
    }

    /// Shut down the connection.
    pub async fn close(mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
    }

    /// Mark the client failed and release the socket in both directions.
    async fn fail(&mut self) {
        self.state = State::Failed;
        if let Some(mut conn) = self.conn.take() {
            conn.shutdown().await;
        }
        debug!("Connection marked unusable");
    }
}

/// The responses to one request, pulled one at a time.
///
/// Finite and consumed once. The record that completes the exchange is
/// yielded before the sequence ends.
#[derive(Debug)]
pub struct Exchange<'a, S> {
    client: &'a mut Client<S>,
    code: &'a str,
    eval_error: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Exchange<'_, S> {
    /// Next response record, or `None` once the exchange is done.
    pub async fn next_response(&mut self) -> Result<Option<Response>, ClientError> {
        match self.client.state {
            State::Done => return Ok(None),
            State::Failed => return Err(ClientError::Unusable),
            State::Idle | State::Sent | State::Streaming => {}
        }
        self.client.state = State::Streaming;

        let Some(conn) = self.client.conn.as_mut() else {
            return Err(ClientError::Unusable);
        };
        let resp = match conn.recv_response().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, "Failed to decode response");
                self.client.fail().await;
                return Err(e.into());
            }
        };

        trace!(status = ?resp.status, "Response");
        if resp.is_done() {
            self.client.state = State::Done;
            debug!(eval_error = self.eval_error, "Exchange done");
        } else if resp.is_eval_error() {
            self.eval_error = true;
        }
        Ok(Some(resp))
    }

    /// Whether an `eval-error` status has been seen so far.
    pub const fn saw_eval_error(&self) -> bool {
        self.eval_error
    }

    /// Finish the exchange, discarding any responses not yet pulled.
    pub async fn into_outcome(mut self) -> Result<Outcome, ClientError> {
        while self.next_response().await?.is_some() {}

        Ok(if self.eval_error {
            Outcome::EvalError {
                code: self.code.to_string(),
            }
        } else {
            Outcome::Success
        })
    }
}
