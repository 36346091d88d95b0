//! Domain-specific error types for the VPS relay protocol.
//!
//! All fallible operations return `Result<T, VpsError>`.
//! No panics on invalid input — every error is typed and recoverable,
//! and every failure is contained to the connection or frame that
//! produced it.

use thiserror::Error;

/// The canonical error type for the VPS relay.
#[derive(Debug, Error)]
pub enum VpsError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// START/END markers of a control frame did not match.
    #[error("frame marker mismatch: start {start:#04x}, end {end:#04x}")]
    MarkerMismatch { start: u8, end: u8 },

    /// The device number field lies outside the configured range.
    ///
    /// No resynchronization strategy exists at the codec layer; the
    /// owning connection must be closed.
    #[error("device number {value} out of range (max {max})")]
    DeviceOutOfRange { value: u8, max: u8 },

    /// The declared body length exceeds the configured maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A mirroring frame body is shorter than its fixed info block.
    #[error("mirroring body too short: {len} bytes")]
    TruncatedMirrorBody { len: usize },

    /// A touch/input payload is shorter than its fixed layout.
    #[error("touch payload too short: {len} bytes")]
    TruncatedTouchPayload { len: usize },

    // ── Transform Errors ─────────────────────────────────────────
    /// The external image transform failed; the frame is dropped.
    #[error("image transform failed: {0}")]
    Transform(String),

    /// The external animation composer failed.
    #[error("animation composition failed: {0}")]
    Compose(String),

    // ── Topology Errors ──────────────────────────────────────────
    /// A message was addressed to a device worker that is not running.
    #[error("no device worker running for device {device}")]
    WorkerUnavailable { device: u8 },

    // ── Socket / Channel Errors ──────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Serialization Errors ─────────────────────────────────────
    /// UTF-8 conversion of a payload failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for VpsError {
    fn from(s: String) -> Self {
        VpsError::Other(s)
    }
}

impl From<&str> for VpsError {
    fn from(s: &str) -> Self {
        VpsError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VpsError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VpsError::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = VpsError::DeviceOutOfRange { value: 42, max: 10 };
        assert!(e.to_string().contains("42"));
        assert!(e.to_string().contains("10"));

        let e = VpsError::MarkerMismatch {
            start: 0x00,
            end: 0xEF,
        };
        assert!(e.to_string().contains("marker"));
    }

    #[test]
    fn from_string() {
        let e: VpsError = "something broke".into();
        assert!(matches!(e, VpsError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: VpsError = io_err.into();
        assert!(matches!(e, VpsError::Io(_)));
    }
}
