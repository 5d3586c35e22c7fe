//! Error handling for the telemetry gateway
//!
//! This module defines the error taxonomy of the ingestion core and a
//! Result alias for use throughout the crate.
//!
//! - [`CodecError`] and [`ParseError`] are isolated per datagram: the
//!   ingestion loop logs them and moves on to the next packet.
//! - [`PersistenceError`] is reported to the caller but never reverts the
//!   in-memory state update.
//! - [`GatewayError::Bind`] is the only fatal condition and is raised once,
//!   at startup.

use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the wire cipher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Key is not 16, 24 or 32 bytes long
    #[error("invalid key length {0} (expected 16, 24 or 32 bytes)")]
    InvalidKeyLength(usize),

    /// Ciphertext is empty or not a whole number of blocks
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    InvalidLength(usize),

    /// Padding bytes after decryption do not form a valid PKCS#7 trailer
    #[error("invalid padding")]
    InvalidPadding,
}

/// Errors raised while decoding a plaintext payload into a sample
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Payload is not valid UTF-8
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(String),

    /// Payload is not a structured JSON object
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A required field is absent
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present but carries the wrong type
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// `node_id` is present but empty
    #[error("node_id must not be empty")]
    EmptyNodeId,
}

/// Errors raised by the durable reading log
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not prepare the on-disk location
    #[error("storage location error: {0}")]
    Io(#[from] std::io::Error),

    /// The log could not be opened at startup; every write is refused
    #[error("reading log unavailable: {0}")]
    Unavailable(String),
}

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Datagram could not be decrypted
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Decrypted payload could not be parsed into a sample
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Durable write failed
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Listening endpoint unavailable
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        GatewayError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// True for errors that only affect the datagram they came from
    pub fn is_packet_local(&self) -> bool {
        match self {
            GatewayError::Codec(_) | GatewayError::Parse(_) => true,
            GatewayError::WithContext { source, .. } => source.is_packet_local(),
            _ => false,
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<GatewayError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Parse(ParseError::MissingField("temp"));
        assert_eq!(err.to_string(), "Parse error: missing required field 'temp'");
    }

    #[test]
    fn test_error_with_context() {
        let err = GatewayError::Codec(CodecError::InvalidPadding);
        let with_ctx = err.with_context("Dropping datagram from 10.0.0.7:5005");
        assert!(with_ctx.to_string().contains("Dropping datagram"));
        assert!(with_ctx.is_packet_local());
    }

    #[test]
    fn test_bind_error_is_not_packet_local() {
        let err = GatewayError::Bind {
            addr: "127.0.0.1:5005".parse().unwrap(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:5005"));
        assert!(!err.is_packet_local());
    }

    #[test]
    fn test_result_ext_converts_component_errors() {
        let res: std::result::Result<(), CodecError> = Err(CodecError::InvalidLength(17));
        let err = res.context("decrypt").unwrap_err();
        assert!(err.to_string().starts_with("decrypt: Codec error"));
    }
}
