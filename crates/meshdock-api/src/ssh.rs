// ── Interactive SSH sessions ──
//
// The stack runs the SSH client itself; the console only wires terminal
// I/O into it through callbacks.

use std::fmt;
use std::time::Duration;

/// Terminal output sink (stdout or stderr of the remote shell).
pub type TermWriter = Box<dyn FnMut(String) + Send + 'static>;

/// Hook the stack hands back so the console can feed keyboard input.
pub type TermReader = Box<dyn FnMut(String) + Send + 'static>;

/// Installer for the input hook, called once the session is ready.
pub type SetReader = Box<dyn FnOnce(TermReader) + Send + 'static>;

/// Lifecycle callback without payload.
pub type TermSignal = Box<dyn FnMut() + Send + 'static>;

/// Default connection timeout used by the stack when none is supplied.
pub const DEFAULT_SSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Terminal wiring for [`NetworkStack::open_ssh`](crate::NetworkStack::open_ssh).
pub struct SshTermConfig {
    pub rows: u16,
    pub cols: u16,
    pub timeout: Duration,
    pub write: TermWriter,
    pub write_error: TermWriter,
    pub set_read: SetReader,
    pub on_progress: TermWriter,
    pub on_connected: TermSignal,
    pub on_done: TermSignal,
}

impl SshTermConfig {
    /// Config with the given geometry and output sink; every other callback
    /// is a no-op and the timeout is [`DEFAULT_SSH_TIMEOUT`].
    pub fn new(rows: u16, cols: u16, write: TermWriter) -> Self {
        Self {
            rows,
            cols,
            timeout: DEFAULT_SSH_TIMEOUT,
            write,
            write_error: Box::new(|_| {}),
            set_read: Box::new(|_| {}),
            on_progress: Box::new(|_| {}),
            on_connected: Box::new(|| {}),
            on_done: Box::new(|| {}),
        }
    }
}

impl fmt::Debug for SshTermConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTermConfig")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A running SSH session.
pub trait SshSession: Send + Sync + 'static {
    /// Propagate a terminal resize. Returns `false` if the stack refused it.
    fn resize(&self, rows: u16, cols: u16) -> bool;

    /// Tear the session down. Returns `false` if it was already closed.
    fn close(&self) -> bool;
}
