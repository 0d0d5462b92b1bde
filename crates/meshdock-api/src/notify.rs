// ── Stack notification surface ──
//
// The network stack reports everything asynchronously through four
// callbacks. `Notifier` is the callback sink handed to the stack; it
// funnels every callback into a single ordered channel of `Notification`s
// that the lifecycle controller consumes.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use tokio::sync::mpsc;
use tracing::{debug, trace};

// ── IpnState ────────────────────────────────────────────────────────

/// Backend state reported by the stack. Names mirror the upstream values.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
pub enum IpnState {
    NoState,
    InUseOtherUser,
    NeedsLogin,
    NeedsMachineAuth,
    Stopped,
    Starting,
    Running,
}

// ── Notification ────────────────────────────────────────────────────

/// One notification emitted by the network stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "camelCase")]
pub enum Notification {
    /// Backend state change.
    State(IpnState),
    /// JSON-encoded network map, decoded by the consumer.
    NetMap(String),
    /// Interactive authentication URL the user must visit.
    BrowseToUrl(String),
    /// The stack hit a fatal error and recovered only far enough to report it.
    PanicRecover(String),
}

impl Notification {
    /// Short, stable name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::State(_) => "state",
            Self::NetMap(_) => "netMap",
            Self::BrowseToUrl(_) => "browseToURL",
            Self::PanicRecover(_) => "panicRecover",
        }
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// Callback sink handed to [`NetworkStack::run`](crate::NetworkStack::run)
/// and to the boot factory.
///
/// Cheaply cloneable. Every clone feeds the same unbounded channel, so
/// notifications reach the single consumer in the order they were emitted.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    /// Create a notifier and the receiving half consumed by the controller.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn notify_state(&self, state: IpnState) {
        self.emit(Notification::State(state));
    }

    pub fn notify_net_map(&self, net_map: impl Into<String>) {
        self.emit(Notification::NetMap(net_map.into()));
    }

    pub fn notify_browse_to_url(&self, url: impl Into<String>) {
        self.emit(Notification::BrowseToUrl(url.into()));
    }

    pub fn notify_panic_recover(&self, err: impl Into<String>) {
        self.emit(Notification::PanicRecover(err.into()));
    }

    /// Forward an already-built notification.
    pub fn emit(&self, notification: Notification) {
        trace!(kind = notification.kind(), "stack notification");
        if self.tx.send(notification).is_err() {
            debug!("notification dropped: consumer is gone");
        }
    }

    /// Returns `true` once the consuming side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
