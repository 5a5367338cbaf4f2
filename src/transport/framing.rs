//! Bencode value boundaries.
//!
//! nREPL has no framing of its own: responses are bencode dictionaries
//! written back to back. `serde_bencode` wants a complete value as a
//! slice, so the reader scans its buffer for where the first value ends
//! before handing those bytes over.

use crate::error::FrameError;

/// Longest accepted string-length prefix, in digits.
const MAX_LENGTH_DIGITS: usize = 20;

/// Deepest list/dict nesting accepted. The deserializer recurses once per
/// level, so this bounds its stack use.
pub const MAX_DEPTH: usize = 64;

/// Length of the first complete bencode value in `buf`.
///
/// Returns `Ok(None)` when `buf` is a valid but incomplete prefix. Only
/// structure is checked here (tokens, nesting, integer and length syntax);
/// dictionary key ordering and types are left to the deserializer.
pub fn value_len(buf: &[u8]) -> Result<Option<usize>, FrameError> {
    let mut pos = 0;
    let mut depth = 0usize;

    loop {
        let Some(&byte) = buf.get(pos) else {
            return Ok(None);
        };

        match byte {
            b'd' | b'l' => {
                if depth == MAX_DEPTH {
                    return Err(FrameError::TooDeep {
                        offset: pos,
                        max: MAX_DEPTH,
                    });
                }
                depth += 1;
                pos += 1;
                continue;
            }
            b'e' => {
                if depth == 0 {
                    return Err(FrameError::UnexpectedEnd { offset: pos });
                }
                depth -= 1;
                pos += 1;
            }
            b'i' => match scan_integer(buf, pos)? {
                Some(end) => pos = end,
                None => return Ok(None),
            },
            b'0'..=b'9' => match scan_string(buf, pos)? {
                Some(end) => pos = end,
                None => return Ok(None),
            },
            other => {
                return Err(FrameError::InvalidToken {
                    byte: other,
                    offset: pos,
                })
            }
        }

        if depth == 0 {
            return Ok(Some(pos));
        }
    }
}

/// Scan `i<digits>e` starting at `start`; returns the offset past `e`.
fn scan_integer(buf: &[u8], start: usize) -> Result<Option<usize>, FrameError> {
    let body_start = start + 1;
    let invalid = || FrameError::InvalidInteger { offset: start };

    for (i, &b) in buf[body_start..].iter().enumerate() {
        match b {
            b'e' if i == 0 => return Err(invalid()),
            b'e' => return Ok(Some(body_start + i + 1)),
            b'-' if i == 0 => {}
            b'0'..=b'9' => {}
            _ => return Err(invalid()),
        }
    }
    Ok(None)
}

/// Scan `<len>:<bytes>` starting at `start`; returns the offset past the bytes.
fn scan_string(buf: &[u8], start: usize) -> Result<Option<usize>, FrameError> {
    let invalid = || FrameError::InvalidLength { offset: start };

    let Some(colon) = buf[start..].iter().position(|&b| b == b':') else {
        let digits = &buf[start..];
        if digits.len() > MAX_LENGTH_DIGITS || !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        return Ok(None);
    };

    let digits = &buf[start..start + colon];
    if digits.len() > MAX_LENGTH_DIGITS || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    let len: usize = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;

    let end = (start + colon + 1).checked_add(len).ok_or_else(invalid)?;
    if end > buf.len() {
        return Ok(None);
    }
    Ok(Some(end))
}
