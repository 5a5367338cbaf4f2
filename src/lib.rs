//! nREPL client library
//!
//! This crate provides the pieces behind the `nrepl` command:
//! - Bencode transport and message types for the nREPL wire protocol
//! - A protocol driver that sends one request and streams its responses
//! - Session and formatting helpers, address resolution and output rendering

pub mod client;
pub mod config;
pub mod error;
pub mod ops;
pub mod output;
pub mod transport;

pub use client::{Client, Exchange, Outcome, State};
pub use error::{ClientError, DecodeError, RequestError};
pub use transport::protocol::{Op, Request, Response};
