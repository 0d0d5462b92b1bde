use thiserror::Error;

/// Top-level error type for the `meshdock-api` crate.
///
/// Covers every failure the network stack boundary can report to a caller:
/// session establishment, I/O on an open session, the fetch bridge, and
/// stack boot. `meshdock-core` maps these into lifecycle-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Sessions ────────────────────────────────────────────────────
    /// The stack could not establish a TCP-like session.
    #[error("Cannot connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    /// Session establishment did not complete in time.
    #[error("Connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Write or close issued against a session that is already closed.
    #[error("Session closed")]
    SessionClosed,

    /// Underlying I/O failure on an open session.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── SSH ─────────────────────────────────────────────────────────
    /// SSH session could not be started.
    #[error("SSH session failed: {0}")]
    Ssh(String),

    // ── Fetch bridge ────────────────────────────────────────────────
    /// HTTP transport error from the fetch bridge.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request carried a method the bridge does not understand.
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    // ── Stack ───────────────────────────────────────────────────────
    /// The stack module failed to load or initialize.
    #[error("Network stack failed to boot: {0}")]
    Boot(String),

    /// Operation not offered by this stack implementation.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Returns `true` if a fresh attempt by the user might succeed.
    ///
    /// Nothing at this layer retries; callers use this to word prompts.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::Connect { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the error came from an already-closed session.
    pub fn is_session_closed(&self) -> bool {
        match self {
            Self::SessionClosed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn connect_errors_are_transient() {
        let err = Error::Connect {
            host: "10.0.0.5".into(),
            port: 22,
            reason: "refused".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "Cannot connect to 10.0.0.5:22: refused");
    }

    #[test]
    fn broken_pipe_counts_as_closed_session() {
        let err = Error::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.is_session_closed());
        assert!(!Error::Boot("wasm".into()).is_session_closed());
    }
}
