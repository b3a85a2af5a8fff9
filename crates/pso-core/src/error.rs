//! The error taxonomy shared by every component in this crate.

use thiserror::Error;

/// Unified error type returned by every `pso-core` operation.
///
/// Handlers and codecs never catch their own errors; they propagate with
/// `?` up to the dispatcher or the download session driver, which decide
/// the recovery policy (see crate-level docs).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Header malformed, declared size out of bounds, or the byte pump
    /// ran out of input mid-frame.
    #[error("framing error: {0}")]
    Framed(String),

    /// Block-size mismatch against a cipher, or a key file with the wrong
    /// shape.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A codec (PRS, AFS, GCI/VMS, text archive) rejected its input.
    #[error("codec error: {0}")]
    Codec(String),

    /// Unexpected opcode, size-band violation, or a state machine that
    /// received a command it doesn't recognise in its current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote peer rejected credentials.
    #[error("auth error: {0}")]
    Auth(String),

    /// A transient I/O condition: EOF on recv, a failed write, a reset
    /// connection. The caller may choose to reconnect.
    #[error("transient error: {0}")]
    Transient(String),
}

impl CoreError {
    pub fn framed(msg: impl Into<String>) -> Self {
        Self::Framed(msg.into())
    }
    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
