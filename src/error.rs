//! Error taxonomy (spec.md §7).
//!
//! The teacher crate hand-rolls its `Error` type rather than pulling in
//! `thiserror`; this crate follows the same approach so `crate::Result<T>`
//! reads the same way across both.

use std::fmt;

use crate::codec::Encoding;

/// Top-level error type returned by every fallible operation in this crate.
#[derive(Debug)]
pub enum Error {
    /// Unparsable flag value, empty path template, conflicting options.
    Config(String),

    /// Open/seek/read/write failure.
    Io(std::io::Error),

    /// A miniSEED record could not be parsed during ingest.
    Codec(String),

    /// `trim()` could not repack a record because its encoding is not one
    /// of the five supported for sample-level trimming (spec.md §4.6).
    UnsupportedEncoding(Encoding),

    /// The pruner produced a `TrimBound` that would invert or fall outside
    /// its record's source interval.
    CoverageInvariantBreach(String),

    /// Allocation or file-descriptor pressure the process cannot recover
    /// from.
    ResourceExhaustion(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Codec(msg) => write!(f, "codec error: {msg}"),
            Self::UnsupportedEncoding(enc) => write!(f, "unsupported encoding for trim: {enc:?}"),
            Self::CoverageInvariantBreach(msg) => write!(f, "coverage invariant breach: {msg}"),
            Self::ResourceExhaustion(msg) => write!(f, "resource exhaustion: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Writes the `ERROR:`-prefixed single line spec.md §6/§7 requires for
/// critical failures, to the given sink (stderr in the binary).
pub fn print_critical<W: std::io::Write>(mut w: W, err: &Error) {
    let _ = writeln!(w, "ERROR: {err}");
}
