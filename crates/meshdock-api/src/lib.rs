// meshdock-api: boundary types for the in-process mesh network stack
//
// Everything the console needs from the network stack host lives here:
// the handle traits, the notification surface the stack reports through,
// TCP/SSH session shapes, the fetch bridge, and the wire form of the
// network map. `host` provides a passthrough implementation that reaches
// hosts directly over the local network.

pub mod error;
pub mod fetch;
pub mod host;
pub mod netmap;
pub mod notify;
pub mod ssh;
pub mod stack;

pub use error::Error;
pub use fetch::{FetchRequest, FetchResponse, Fetcher};
pub use host::{HostDialer, HostFetcher, TransportConfig};
pub use netmap::{MachineStatus, NetMapPayload, NetMapPeerNode, NetMapSelfNode, NetMapUser};
pub use notify::{IpnState, Notification, Notifier};
pub use ssh::{SshSession, SshTermConfig};
pub use stack::{
    BootParams, NetworkStack, ReadCallback, ReadEvent, StateStorage, TcpDialer, TcpOptions,
    TcpSession,
};
