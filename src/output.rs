//! Rendering of response records for the command-line client.
//!
//! Exceptions and captured stderr/stdout go to the error stream; values,
//! new session ids and formatted code go to the output stream.

use std::io::{self, Write};

use crate::transport::protocol::Response;

/// Writes each response's fields to an output and an error stream as
/// records arrive.
#[derive(Debug)]
pub struct Printer<O, E> {
    out: O,
    err: E,
}

impl Printer<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Printer<O, E> {
    pub const fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    /// Write one record. Empty fields are skipped.
    pub fn print(&mut self, resp: &Response) -> io::Result<()> {
        for text in [&resp.ex, &resp.err, &resp.out] {
            if !text.is_empty() {
                self.err.write_all(text.as_bytes())?;
            }
        }
        if !resp.value.is_empty() {
            writeln!(self.out, "{}", resp.value)?;
        }
        if !resp.new_session.is_empty() {
            writeln!(self.out, "{}", resp.new_session)?;
        }
        if !resp.formatted_code.is_empty() {
            self.out.write_all(resp.formatted_code.as_bytes())?;
            if !resp.formatted_code.ends_with('\n') {
                self.out.write_all(b"\n")?;
            }
        }
        self.err.flush()?;
        self.out.flush()
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}
