//! Session lifecycle core between `meshdock-api` and console front-ends.
//!
//! - **[`Controller`]**: owns the single network stack instance. It boots the
//!   stack, consumes its notifications in order, reconciles persisted
//!   profiles and tells a [`Navigator`] which [`Surface`] to mount. Fatal
//!   conditions (boot failure, stack panic, `Running` without a resolvable
//!   profile) halt it for good.
//!
//! - **[`RawChannel`]**: one stack TCP session presented as a duplex
//!   push-event byte channel ([`ByteChannel`]) for remote-desktop protocol
//!   clients. Opened directly or through the controller's
//!   [`ChannelFactory`]; [`ChannelStream`] wraps one as a `tokio::io` stream
//!   for clients that expect a socket.
//!
//! - **[`storage`]**: the flat key/value namespace the stack persists into,
//!   the byte-pair hex codec and the profile loader.
//!
//! - **[`NetMapStream`]**: subscription to the published [`NetworkMap`],
//!   replaced wholesale on every update.
//!
//! - **[`ConnectParams`]**: remote-access targets as URL-safe tokens.

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod link;
pub mod model;
pub mod navigator;
pub mod storage;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use channel::{
    ByteChannel, ChannelFactory, ChannelMessage, ChannelOptions, ChannelStream, CloseHandler,
    CloseReason, RawChannel, ReceiveHandler,
};
pub use config::{ChannelConfig, ConsoleConfig, DEFAULT_READ_BUFFER, Protocol};
pub use controller::{Controller, UNEXPECTED_SHUTDOWN};
pub use error::CoreError;
pub use link::ConnectParams;
pub use navigator::{NavEvent, Navigator, RecordingNavigator};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StackStateStorage, StorageError};
pub use stream::{NetMapSnapshot, NetMapStream};

pub use model::{
    LifecycleState, NetworkMap, Peer, Profile, ProfileId, ProfileSet, SelfNode, Surface,
    SurfaceKind, Toast, ToastLevel, User,
};
