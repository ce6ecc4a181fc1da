//! Error types for the echo-kv engine.
//!
//! Every command-level failure is a variant of [`EngineError`]. The
//! `Display` text of a variant is exactly what goes on the wire after the
//! `-` marker, so the evaluator can turn any error into a reply without
//! further formatting.

use std::io;

use thiserror::Error;

/// The main error type for engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Decode was called on an empty buffer.
    #[error("no data")]
    NoData,

    /// The buffer ends in the middle of a value; more bytes are needed.
    #[error("incomplete frame")]
    Incomplete,

    /// The buffer holds bytes that are not valid RESP.
    #[error("ERR Protocol error: {0}")]
    Protocol(String),

    /// A command was called with the wrong number of arguments.
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// An argument that must be an integer is not one.
    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    /// Options of a command could not be parsed.
    #[error("ERR syntax error")]
    Syntax,

    /// The stored value is of a type the operation does not support.
    #[error("ERR the operation is not permitted on this type")]
    WrongType,

    /// The stored value has an encoding the operation does not support.
    #[error("ERR the operation is not permitted on this encoding")]
    WrongEncoding,

    #[error("ERR EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("ERR DISCARD without MULTI")]
    DiscardWithoutMulti,

    /// The key is not present (expired keys are reported the same way).
    #[error("ERR Key doesn't exist")]
    KeyNotFound,

    /// An I/O error occurred (network, snapshot file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Whether this error only means "wait for more bytes".
    pub fn is_incomplete(&self) -> bool {
        matches!(self, EngineError::Incomplete)
    }
}

/// A specialized Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_wire_text() {
        let err = EngineError::WrongArity("get".to_string());
        assert_eq!(
            err.to_string(),
            "ERR wrong number of arguments for 'get' command"
        );

        assert_eq!(EngineError::ExecWithoutMulti.to_string(), "ERR EXEC without MULTI");
        assert_eq!(
            EngineError::DiscardWithoutMulti.to_string(),
            "ERR DISCARD without MULTI"
        );
        assert_eq!(
            EngineError::Protocol("bad length".to_string()).to_string(),
            "ERR Protocol error: bad length"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn test_incomplete_is_distinct() {
        assert!(EngineError::Incomplete.is_incomplete());
        assert!(!EngineError::NoData.is_incomplete());
    }
}
