//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use meshdock_config::ConfigError;
use meshdock_core::{CoreError, StorageError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {host}:{port}")]
    #[diagnostic(
        code(meshdock::connection_failed),
        help(
            "Check that the host is reachable from this machine.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connection timed out after {seconds}s")]
    #[diagnostic(
        code(meshdock::timeout),
        help("Increase the timeout with --timeout or `channels.connect_timeout_secs`.")
    )]
    Timeout { seconds: u64 },

    #[error("Channel closed: {reason}")]
    #[diagnostic(code(meshdock::channel_closed))]
    ChannelClosed { reason: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(meshdock::not_found),
        help("Run: meshdock {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{what} already exists at {path}")]
    #[diagnostic(code(meshdock::conflict), help("Pass --force to overwrite it."))]
    AlreadyExists { what: String, path: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(meshdock::validation))]
    Validation { field: String, reason: String },

    #[error("Invalid network map: {message}")]
    #[diagnostic(
        code(meshdock::netmap),
        help("Expected the JSON payload of a net-map notification.")
    )]
    NetMap { message: String },

    // ── Configuration / storage ──────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(meshdock::config),
        help("Inspect the file with: meshdock config show")
    )]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(
        code(meshdock::storage),
        help("Point --state at the console's state file, or set state_file in config.")
    )]
    Storage(#[from] StorageError),

    #[error(transparent)]
    #[diagnostic(code(meshdock::core))]
    Core(CoreError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(meshdock::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::ChannelClosed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::AlreadyExists { .. } => exit_code::CONFLICT,
            Self::Validation { .. } | Self::NetMap { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectFailed { host, port, reason } => {
                CliError::ConnectionFailed { host, port, reason }
            }

            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },

            CoreError::ChannelClosed => CliError::ChannelClosed {
                reason: "closed before use".into(),
            },

            CoreError::NetMapDecode { message } => CliError::NetMap { message },

            CoreError::Link { message } => CliError::Validation {
                field: "link".into(),
                reason: message,
            },

            CoreError::Storage(source) => CliError::Storage(source),

            other => CliError::Core(other),
        }
    }
}

impl From<meshdock_api::Error> for CliError {
    fn from(err: meshdock_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
