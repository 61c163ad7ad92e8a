//! Error type for the encoder/iterator boundary
//!
//! The value layer itself never errors: bad data comes back as the Invalid
//! sentinel and callers decide. The encoder and iterator face an external
//! sink, so they surface failures as real errors, and the encoder latches
//! into a failed state until reset so a broken stream cannot be extended.

use std::fmt;

/// Failure reported by an event sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event sink failed: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

/// Error kinds surfaced by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Arena could not satisfy a request; the value involved is Invalid.
    AllocationFailure,
    /// A constructor or encoder argument was Invalid or malformed.
    InvalidInput(&'static str),
    /// Mapping construction saw equal keys under duplicate-key rejection.
    DuplicateKey,
    /// The downstream event sink failed; the encoder is now error-sticky.
    Encoder(SinkError),
    /// The iterator was driven from a state that does not admit the step.
    Iterator(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllocationFailure => f.write_str("arena allocation failed"),
            Self::InvalidInput(what) => write!(f, "invalid input: {what}"),
            Self::DuplicateKey => f.write_str("duplicate mapping key"),
            Self::Encoder(err) => write!(f, "{err}"),
            Self::Iterator(what) => write!(f, "iterator state error: {what}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encoder(err) => Some(err),
            _ => None,
        }
    }
}
