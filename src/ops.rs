//! Session lifecycle and formatting helpers built on [`Client::send`].
//!
//! Sessions live on the server. These helpers only pass session ids
//! through; nothing here caches or validates them.
//!
//! An evaluation error reported by the server is an answer, not a
//! transport failure, so the helpers return it as [`OpOutcome::EvalError`].

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::client::{Client, Outcome};
use crate::error::ClientError;
use crate::transport::protocol::Request;

/// What a helper op produced once the server reported `done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome<T> {
    Value(T),
    /// The server flagged `eval-error`; `code` is what was sent.
    EvalError { code: String },
}

impl<T> OpOutcome<T> {
    /// The value, or `None` after an evaluation error.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::EvalError { .. } => None,
        }
    }
}

/// Ask the server for a new session, optionally cloned from `parent`.
///
/// A successful reply without `new-session` is [`ClientError::MissingField`].
pub async fn clone_session<S>(
    client: &mut Client<S>,
    parent: Option<&str>,
) -> Result<OpOutcome<String>, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut req = Request::clone_session();
    if let Some(parent) = parent {
        req = req.with_session(parent);
    }

    let mut new_session = None;
    let outcome = client
        .send(&req, |resp| {
            if !resp.new_session.is_empty() {
                new_session = Some(resp.new_session);
            }
        })
        .await?;

    if let Outcome::EvalError { code } = outcome {
        warn!(parent = parent.unwrap_or(""), "Clone reported an evaluation error");
        return Ok(OpOutcome::EvalError { code });
    }

    let id = new_session.ok_or(ClientError::MissingField("new-session"))?;
    info!(session = %id, "Cloned session");
    Ok(OpOutcome::Value(id))
}

/// Close the session `id`.
pub async fn close_session<S>(client: &mut Client<S>, id: &str) -> Result<Outcome, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let outcome = client.send(&Request::close().with_session(id), |_| {}).await?;
    info!(session = %id, "Closed session");
    Ok(outcome)
}

/// Reformat `code` on the server, joining `formatted-code` fragments.
///
/// Code the server cannot read comes back as [`OpOutcome::EvalError`].
pub async fn format_code<S>(
    client: &mut Client<S>,
    code: &str,
) -> Result<OpOutcome<String>, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut formatted = String::new();
    let mut seen = false;
    let outcome = client
        .send(&Request::format_code(code), |resp| {
            if !resp.formatted_code.is_empty() {
                seen = true;
                formatted.push_str(&resp.formatted_code);
            }
        })
        .await?;

    match outcome {
        Outcome::EvalError { code } => Ok(OpOutcome::EvalError { code }),
        Outcome::Success if seen => Ok(OpOutcome::Value(formatted)),
        Outcome::Success => Err(ClientError::MissingField("formatted-code")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

    use crate::transport::framing;
    use crate::transport::protocol::{Op, Response};

    fn done() -> Response {
        Response {
            status: vec!["done".to_string()],
            ..Response::default()
        }
    }

    fn eval_error() -> Vec<Response> {
        vec![
            Response {
                ex: "class clojure.lang.ExceptionInfo".to_string(),
                status: vec!["eval-error".to_string()],
                ..Response::default()
            },
            done(),
        ]
    }

    /// Answer exactly one request with `records`, returning the request.
    fn serve_once(records: Vec<Response>) -> (DuplexStream, tokio::task::JoinHandle<Request>) {
        let (client, mut server) = duplex(64 * 1024);
        let handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 512];
            let len = loop {
                if let Some(len) = framing::value_len(&buf).unwrap() {
                    break len;
                }
                let n = server.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            };
            for record in &records {
                let bytes = serde_bencode::to_bytes(record).unwrap();
                server.write_all(&bytes).await.unwrap();
            }
            serde_bencode::from_bytes(&buf[..len]).unwrap()
        });
        (client, handle)
    }

    #[tokio::test]
    async fn clone_returns_new_session() {
        let (stream, server) = serve_once(vec![Response {
            new_session: "abc123".to_string(),
            ..done()
        }]);
        let mut client = Client::new(stream);

        let id = clone_session(&mut client, None).await.unwrap();
        assert_eq!(id, OpOutcome::Value("abc123".to_string()));

        let req = server.await.unwrap();
        assert_eq!(req.op, Op::Clone);
        assert!(req.session.is_none());
    }

    #[tokio::test]
    async fn clone_from_parent_passes_session_through() {
        let (stream, server) = serve_once(vec![Response {
            new_session: "child".to_string(),
            ..done()
        }]);
        let mut client = Client::new(stream);

        clone_session(&mut client, Some("parent")).await.unwrap();
        assert_eq!(server.await.unwrap().session.as_deref(), Some("parent"));
    }

    #[tokio::test]
    async fn clone_without_new_session_is_error() {
        let (stream, _server) = serve_once(vec![done()]);
        let mut client = Client::new(stream);

        let err = clone_session(&mut client, None).await.unwrap_err();
        assert!(matches!(err, ClientError::MissingField("new-session")));
    }

    #[tokio::test]
    async fn clone_eval_error_is_reported() {
        let (stream, _server) = serve_once(eval_error());
        let mut client = Client::new(stream);

        let outcome = clone_session(&mut client, Some("gone")).await.unwrap();
        assert_eq!(
            outcome,
            OpOutcome::EvalError {
                code: String::new()
            }
        );
        assert_eq!(client.state(), crate::client::State::Done);
    }

    #[tokio::test]
    async fn close_sends_session_id() {
        let (stream, server) = serve_once(vec![Response {
            status: vec!["done".to_string(), "session-closed".to_string()],
            ..Response::default()
        }]);
        let mut client = Client::new(stream);

        let outcome = close_session(&mut client, "abc123").await.unwrap();
        assert_eq!(outcome, Outcome::Success);

        let req = server.await.unwrap();
        assert_eq!(req, Request::close().with_session("abc123"));
    }

    #[tokio::test]
    async fn format_code_joins_fragments() {
        let (stream, server) = serve_once(vec![
            Response {
                formatted_code: "(defn f [x]\n".to_string(),
                ..Response::default()
            },
            Response {
                formatted_code: "  x)".to_string(),
                ..done()
            },
        ]);
        let mut client = Client::new(stream);

        let formatted = format_code(&mut client, "(defn f [x] x)").await.unwrap();
        assert_eq!(formatted.value().as_deref(), Some("(defn f [x]\n  x)"));
        assert_eq!(server.await.unwrap().op, Op::FormatCode);
    }

    #[tokio::test]
    async fn format_code_eval_error_is_reported() {
        let (stream, _server) = serve_once(eval_error());
        let mut client = Client::new(stream);

        let outcome = format_code(&mut client, "(defn f [").await.unwrap();
        assert_eq!(
            outcome,
            OpOutcome::EvalError {
                code: "(defn f [".to_string()
            }
        );
    }

    #[tokio::test]
    async fn format_code_without_fragments_is_error() {
        let (stream, _server) = serve_once(vec![done()]);
        let mut client = Client::new(stream);

        let err = format_code(&mut client, "(a)").await.unwrap_err();
        assert!(matches!(err, ClientError::MissingField("formatted-code")));
    }
}
