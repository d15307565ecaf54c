//! Crate-wide error type for the journal cache codec.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while reading or writing a cache file.
///
/// `test`/`parse` style gating (magic mismatch, staleness) is represented
/// separately via [`crate::codec::LoadOutcome`] — those are not errors, they
/// are "the cache cannot be used right now" signals. `CodecError` is reserved
/// for genuine structural corruption and I/O failure.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("string length {0} exceeds the configured maximum")]
    StringTooLong(usize),

    #[error("string is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("debug guard mismatch before string: expected 0x{expected:04x}, found 0x{found:04x}")]
    DebugGuardMismatch { expected: u16, found: u16 },

    #[error("string pool cursor ended at {actual} bytes, expected exactly {expected}")]
    StringPoolOverrun { expected: u64, actual: u64 },

    #[error("account identifier {0} is out of range")]
    AccountIdOutOfRange(u32),

    #[error("commodity identifier {0} is out of range")]
    CommodityIdOutOfRange(u32),

    #[error("commodity symbol {0:?} already exists in the target commodity table")]
    DuplicateCommoditySymbol(String),

    #[error("pool overrun: tried to construct more than the declared {kind} count ({count})")]
    PoolOverrun { kind: &'static str, count: u64 },

    #[error("{what} count mismatch: header declared {expected}, stream contained {actual}")]
    CountMismatch {
        what: &'static str,
        expected: u64,
        actual: u64,
    },

    #[error("account tree is structurally inconsistent: {0}")]
    AccountTreeCorrupt(String),

    #[error("entry record is structurally inconsistent: {0}")]
    MalformedEntry(String),

    #[error("source file {path:?} is missing from disk")]
    MissingSourceFile { path: PathBuf },

    #[error("bigint payload is malformed")]
    MalformedBigint,
}

/// Result alias used by every fallible codec operation except `test`, which
/// keeps the original `io::Result<bool>` "rewind and say no" contract.
pub type Result<T> = std::result::Result<T, CodecError>;
