//! nREPL message types.
//!
//! Requests and responses are bencode dictionaries. A request carries an
//! `op` and, depending on the op, `code` and `session`. The server answers
//! with one or more response dictionaries; the last carries `status`
//! starting with `"done"`.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RequestError;

/// Status token marking the final response for a request.
pub const STATUS_DONE: &str = "done";

/// Status token reporting that the submitted code failed to evaluate.
pub const STATUS_EVAL_ERROR: &str = "eval-error";

/// Operations this client knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Evaluate `code`.
    Eval,
    /// Create a new session (optionally from `session`).
    Clone,
    /// Close `session`.
    Close,
    /// Reformat `code` without evaluating it.
    FormatCode,
}

impl Op {
    /// Wire name of the op.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eval => "eval",
            Self::Clone => "clone",
            Self::Close => "close",
            Self::FormatCode => "format-code",
        }
    }

    /// Whether requests with this op must carry a `code` string.
    pub const fn takes_code(self) -> bool {
        matches!(self, Self::Eval | Self::FormatCode)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Op {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eval" => Ok(Self::Eval),
            "clone" => Ok(Self::Clone),
            "close" => Ok(Self::Close),
            "format-code" => Ok(Self::FormatCode),
            other => Err(RequestError::UnknownOp(other.to_string())),
        }
    }
}

impl Serialize for Op {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// A single request sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub op: Op,

    /// Program text, sent as one opaque blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Opaque server-side session id, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl Request {
    /// Build a request, checking that code-carrying ops have code.
    ///
    /// `clone` and `close` discard any code they are given.
    pub fn new(op: Op, code: Option<String>) -> Result<Self, RequestError> {
        let code = if op.takes_code() {
            Some(code.ok_or(RequestError::MissingCode(op))?)
        } else {
            None
        };
        Ok(Self {
            op,
            code,
            session: None,
        })
    }

    /// Build a request from a wire op name.
    pub fn from_op_name(name: &str, code: Option<String>) -> Result<Self, RequestError> {
        Self::new(name.parse()?, code)
    }

    pub fn eval(code: impl Into<String>) -> Self {
        Self {
            op: Op::Eval,
            code: Some(code.into()),
            session: None,
        }
    }

    pub fn format_code(code: impl Into<String>) -> Self {
        Self {
            op: Op::FormatCode,
            code: Some(code.into()),
            session: None,
        }
    }

    pub const fn clone_session() -> Self {
        Self {
            op: Op::Clone,
            code: None,
            session: None,
        }
    }

    pub const fn close() -> Self {
        Self {
            op: Op::Close,
            code: None,
            session: None,
        }
    }

    /// Attach a session id. Empty ids are treated as "no session".
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        let session = session.into();
        self.session = (!session.is_empty()).then_some(session);
        self
    }

    /// The code text, or `""` for ops that carry none.
    pub fn code_text(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }
}

/// One response record. Every field is optional on the wire.
///
/// Responses are incremental: output, value and status may each arrive
/// in separate records for the same request. Text fields carry whatever
/// bytes the evaluated program produced; invalid UTF-8 is replaced with
/// U+FFFD rather than failing the record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    /// Exception class or message.
    #[serde(deserialize_with = "lossy_string", skip_serializing_if = "String::is_empty")]
    pub ex: String,

    /// Captured standard output.
    #[serde(deserialize_with = "lossy_string", skip_serializing_if = "String::is_empty")]
    pub out: String,

    /// Captured standard error.
    #[serde(deserialize_with = "lossy_string", skip_serializing_if = "String::is_empty")]
    pub err: String,

    /// Printed result of an evaluation.
    #[serde(deserialize_with = "lossy_string", skip_serializing_if = "String::is_empty")]
    pub value: String,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,

    /// Set in reply to `clone`.
    #[serde(
        rename = "new-session",
        deserialize_with = "lossy_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub new_session: String,

    /// Set in reply to `format-code`.
    #[serde(
        rename = "formatted-code",
        deserialize_with = "lossy_string",
        skip_serializing_if = "String::is_empty"
    )]
    pub formatted_code: String,
}

impl Response {
    /// First status token, the only one consulted for loop control.
    ///
    /// Later tokens in the same list (e.g. `["eval-error", "done"]`) are
    /// visible to handlers but never end or flag an exchange.
    pub fn first_status(&self) -> Option<&str> {
        self.status.first().map(String::as_str)
    }

    pub fn is_done(&self) -> bool {
        self.first_status() == Some(STATUS_DONE)
    }

    pub fn is_eval_error(&self) -> bool {
        self.first_status() == Some(STATUS_EVAL_ERROR)
    }
}

/// Decode a bencode byte string as text, replacing invalid UTF-8.
fn lossy_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct LossyString;

    impl Visitor<'_> for LossyString {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<String, E> {
            Ok(String::from_utf8_lossy(v).into_owned())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<String, E> {
            Ok(String::from_utf8(v)
                .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
        }
    }

    deserializer.deserialize_bytes(LossyString)
}
