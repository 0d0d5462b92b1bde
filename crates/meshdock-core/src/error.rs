// ── Core error types ──
//
// Lifecycle-level errors from meshdock-core. Boundary errors with a
// lifecycle meaning are mapped onto their own variants; the rest are kept
// whole under `Api`.

use thiserror::Error;

use crate::storage::StorageError;
use crate::storage::codec::CodecError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Fatal ────────────────────────────────────────────────────────
    #[error("Network stack failed to boot: {reason}")]
    Boot { reason: String },

    #[error("No current profile could be resolved after the stack reported Running")]
    ProfileUnresolved,

    #[error("Network stack panicked: {detail}")]
    StackPanic { detail: String },

    #[error("Controller has stopped and accepts no further calls")]
    Halted,

    // ── Recoverable ──────────────────────────────────────────────────
    #[error("Cannot connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Channel is closed")]
    ChannelClosed,

    // ── Transient ────────────────────────────────────────────────────
    #[error("Malformed network map: {message}")]
    NetMapDecode { message: String },

    #[error("Invalid connection link: {message}")]
    Link { message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── API errors (wrapped) ─────────────────────────────────────────
    #[error("Network stack error: {0}")]
    Api(#[source] meshdock_api::Error),
}

impl CoreError {
    /// Fatal errors stop the controller; everything else is reported and
    /// processing continues.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Boot { .. } | Self::ProfileUnresolved | Self::StackPanic { .. } | Self::Halted
        )
    }
}

// ── Conversion from boundary errors ──────────────────────────────────

impl From<meshdock_api::Error> for CoreError {
    fn from(err: meshdock_api::Error) -> Self {
        match err {
            meshdock_api::Error::Connect { host, port, reason } => {
                CoreError::ConnectFailed { host, port, reason }
            }
            meshdock_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            meshdock_api::Error::SessionClosed => CoreError::ChannelClosed,
            meshdock_api::Error::Boot(reason) => CoreError::Boot { reason },
            other => CoreError::Api(other),
        }
    }
}
