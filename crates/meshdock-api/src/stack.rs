// ── Network stack handle ──
//
// Traits describing what the console consumes from the in-process network
// stack. The stack is an external actor: it is driven through imperative
// calls and answers through the `Notifier` it was given.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use secrecy::SecretString;
use url::Url;

use crate::error::Error;
use crate::fetch::Fetcher;
use crate::notify::Notifier;
use crate::ssh::{SshSession, SshTermConfig};

// ── Raw TCP sessions ────────────────────────────────────────────────

/// Inbound event delivered by the stack's read callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// A chunk of bytes, at most the configured read-buffer size.
    Data(Bytes),
    /// The remote end closed the stream.
    Eof,
    /// The session failed mid-stream.
    Error(String),
}

/// Read callback installed at open time. Invoked synchronously, in arrival
/// order, from whatever context the stack delivers reads on.
pub type ReadCallback = Box<dyn FnMut(ReadEvent) + Send + 'static>;

/// Parameters for [`TcpDialer::open_tcp`].
pub struct TcpOptions {
    pub hostname: String,
    pub port: u16,
    pub read_callback: ReadCallback,
    pub read_buffer_size: usize,
    pub connect_timeout: Option<Duration>,
    pub write_buffer_size: Option<usize>,
}

impl fmt::Debug for TcpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpOptions")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("read_buffer_size", &self.read_buffer_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("write_buffer_size", &self.write_buffer_size)
            .finish_non_exhaustive()
    }
}

/// An open TCP-like session multiplexed over the stack.
pub trait TcpSession: Send + Sync + 'static {
    /// Remote address as reported by the stack.
    fn remote_addr(&self) -> &str;

    /// Write a buffer, resolving to the number of bytes accepted.
    fn write(&self, data: Bytes) -> impl Future<Output = Result<usize, Error>> + Send;

    /// Close the session. Resolves once the stack confirms teardown.
    fn close(&self) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Anything that can open raw TCP sessions.
pub trait TcpDialer: Send + Sync {
    type Session: TcpSession;

    fn open_tcp(
        &self,
        options: TcpOptions,
    ) -> impl Future<Output = Result<Self::Session, Error>> + Send;
}

impl<T: TcpDialer> TcpDialer for Arc<T> {
    type Session = T::Session;

    fn open_tcp(
        &self,
        options: TcpOptions,
    ) -> impl Future<Output = Result<Self::Session, Error>> + Send {
        (**self).open_tcp(options)
    }
}

// ── Stack-side state storage ────────────────────────────────────────

/// Key/value storage the stack persists its own state into.
///
/// Missing ids read as the empty string, as the stack expects.
pub trait StateStorage: Send + Sync {
    fn get_state(&self, id: &str) -> String;
    fn set_state(&self, id: &str, value: &str);
}

// ── Boot ────────────────────────────────────────────────────────────

/// Connection parameters handed to the stack factory at boot.
#[derive(Clone)]
pub struct BootParams {
    pub control_url: Url,
    pub auth_key: Option<SecretString>,
    pub route_all: bool,
    pub advertise_tags: Vec<String>,
    pub hostname: Option<String>,
    pub state_storage: Arc<dyn StateStorage>,
}

impl BootParams {
    /// Tags in the comma-separated form the stack's config accepts.
    pub fn advertise_tags_arg(&self) -> Option<String> {
        if self.advertise_tags.is_empty() {
            None
        } else {
            Some(self.advertise_tags.join(","))
        }
    }
}

impl fmt::Debug for BootParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootParams")
            .field("control_url", &self.control_url.as_str())
            .field("auth_key", &self.auth_key.as_ref().map(|_| "<redacted>"))
            .field("route_all", &self.route_all)
            .field("advertise_tags", &self.advertise_tags)
            .field("hostname", &self.hostname)
            .finish_non_exhaustive()
    }
}

// ── NetworkStack ────────────────────────────────────────────────────

/// The in-process network stack handle.
///
/// Exactly one instance exists per running console. Imperative calls are
/// fire-and-forget; their effects are observed only through notifications.
pub trait NetworkStack: TcpDialer + Fetcher + Send + Sync + 'static {
    type Ssh: SshSession;

    /// Register the callback sink and run the stack. Long-lived: under
    /// normal operation the returned future never completes.
    fn run(&self, notifier: Notifier) -> impl Future<Output = ()> + Send;

    /// Start interactive login. The URL arrives as a browse-to-URL notification.
    fn login(&self);

    /// Log the current identity out. Observed as a `Stopped`/`NeedsLogin` state.
    fn logout(&self);

    /// Open an interactive SSH session to a mesh peer.
    fn open_ssh(
        &self,
        host: &str,
        username: &str,
        config: SshTermConfig,
    ) -> Result<Self::Ssh, Error>;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct MapStorage(Mutex<HashMap<String, String>>);

    impl StateStorage for MapStorage {
        fn get_state(&self, id: &str) -> String {
            self.0
                .lock()
                .ok()
                .and_then(|m| m.get(id).cloned())
                .unwrap_or_default()
        }

        fn set_state(&self, id: &str, value: &str) {
            if let Ok(mut m) = self.0.lock() {
                m.insert(id.to_owned(), value.to_owned());
            }
        }
    }

    fn params(tags: &[&str]) -> BootParams {
        BootParams {
            control_url: Url::parse("https://hs.example.net/").expect("static url"),
            auth_key: Some(SecretString::from("tskey-auth-123".to_owned())),
            route_all: true,
            advertise_tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            hostname: None,
            state_storage: Arc::new(MapStorage::default()),
        }
    }

    #[test]
    fn advertise_tags_join_with_commas() {
        assert_eq!(params(&[]).advertise_tags_arg(), None);
        assert_eq!(
            params(&["tag:web", "tag:admin"]).advertise_tags_arg().as_deref(),
            Some("tag:web,tag:admin")
        );
    }

    #[test]
    fn debug_output_redacts_auth_key() {
        let rendered = format!("{:?}", params(&[]));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("tskey-auth-123"));
    }

    #[test]
    fn state_storage_reads_missing_as_empty() {
        let storage = MapStorage::default();
        assert_eq!(storage.get_state("_current-profile"), "");
        storage.set_state("_current-profile", "abc");
        assert_eq!(storage.get_state("_current-profile"), "abc");
    }
}
