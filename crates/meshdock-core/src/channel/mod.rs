// ── Raw channel adapter ──
//
// Presents one stack TCP session as a duplex push-event channel for
// remote-desktop protocol clients: fire-and-forget `send`, a single
// receive handler fed straight from the stack's read callback, and a close
// signal that fires once.

mod stream;

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use meshdock_api::{ReadEvent, TcpDialer, TcpOptions, TcpSession};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::{ChannelConfig, DEFAULT_READ_BUFFER, Protocol};
use crate::error::CoreError;

pub use stream::ChannelStream;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

// ── Messages and handlers ───────────────────────────────────────────

/// Payload handed to [`ByteChannel::send`].
///
/// Protocol libraries sometimes emit text frames; raw channels only
/// carry bytes, so `Text` is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Binary(Bytes),
    Text(String),
}

impl From<Bytes> for ChannelMessage {
    fn from(b: Bytes) -> Self {
        Self::Binary(b)
    }
}

impl From<Vec<u8>> for ChannelMessage {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl From<&[u8]> for ChannelMessage {
    fn from(s: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(s))
    }
}

impl From<String> for ChannelMessage {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ChannelMessage {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Why a channel closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called.
    Local,
    /// The remote end closed the stream.
    RemoteClosed,
    ReadError(String),
    WriteError(String),
}

impl CloseReason {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::ReadError(_) | Self::WriteError(_))
    }
}

pub type ReceiveHandler = Box<dyn FnMut(Bytes) + Send + 'static>;
pub type CloseHandler = Box<dyn FnOnce(CloseReason) + Send + 'static>;

/// Narrow duplex byte-channel interface protocol clients depend on.
pub trait ByteChannel: Send + Sync {
    /// Queue bytes for writing. Never fails; errors surface through the
    /// close handler.
    fn send(&self, message: ChannelMessage);

    /// Install the receive handler, replacing any previous one.
    fn on_receive(&self, handler: ReceiveHandler);

    /// Install the close handler. Fires once; immediately if the channel
    /// has already closed.
    fn on_close(&self, handler: CloseHandler);

    /// Close the channel and its session. Idempotent.
    fn close(&self) -> impl Future<Output = ()> + Send;

    fn is_closed(&self) -> bool;
}

// ── Options ─────────────────────────────────────────────────────────

/// Per-open tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub read_buffer_size: usize,
    pub connect_timeout: Option<Duration>,
    pub write_buffer_size: Option<usize>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER,
            connect_timeout: None,
            write_buffer_size: None,
        }
    }
}

// ── Shared state between the read callback, writer and handle ───────

#[derive(Default)]
struct CloseSlot {
    handler: Option<CloseHandler>,
    reason: Option<CloseReason>,
    fired: bool,
}

struct Shared {
    id: u64,
    closed: AtomicBool,
    receive: Mutex<Option<ReceiveHandler>>,
    close: Mutex<CloseSlot>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn new(receive: Option<ReceiveHandler>) -> Self {
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
            receive: Mutex::new(receive),
            close: Mutex::new(CloseSlot::default()),
            outbound: Mutex::new(None),
        }
    }

    fn on_read(&self, event: ReadEvent) {
        match event {
            ReadEvent::Data(chunk) => self.deliver(chunk),
            ReadEvent::Eof => self.finish(CloseReason::RemoteClosed),
            ReadEvent::Error(e) => self.finish(CloseReason::ReadError(e)),
        }
    }

    /// Hand a chunk to the receive handler on the caller's context.
    fn deliver(&self, chunk: Bytes) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // Taken out of the slot for the call so the handler may replace
        // itself without deadlocking.
        let taken = lock(&self.receive).take();
        let Some(mut handler) = taken else {
            trace!(channel = self.id, len = chunk.len(), "no receive handler, chunk dropped");
            return;
        };
        handler(chunk);
        let mut slot = lock(&self.receive);
        // A close during the call already dropped the slot's contents.
        if slot.is_none() && !self.closed.load(Ordering::Acquire) {
            *slot = Some(handler);
        }
    }

    /// Mark the channel closed and fire the close handler once.
    fn finish(&self, reason: CloseReason) {
        let handler = {
            let mut slot = lock(&self.close);
            if slot.reason.is_some() {
                return;
            }
            slot.reason = Some(reason.clone());
            let handler = slot.handler.take();
            slot.fired = handler.is_some();
            handler
        };

        self.closed.store(true, Ordering::Release);
        lock(&self.outbound).take();
        lock(&self.receive).take();

        match &reason {
            CloseReason::Local => debug!(channel = self.id, "channel closed"),
            CloseReason::RemoteClosed => debug!(channel = self.id, "remote closed channel"),
            CloseReason::ReadError(e) | CloseReason::WriteError(e) => {
                warn!(channel = self.id, error = %e, "channel failed");
            }
        }

        if let Some(handler) = handler {
            handler(reason);
        }
    }

    fn register_close(&self, handler: CloseHandler) {
        let fire_now = {
            let mut guard = lock(&self.close);
            let slot = &mut *guard;
            match (&slot.reason, slot.fired) {
                (Some(reason), false) => {
                    slot.fired = true;
                    Some(reason.clone())
                }
                (Some(_), true) => None,
                (None, _) => {
                    slot.handler = Some(handler);
                    return;
                }
            }
        };
        if let Some(reason) = fire_now {
            handler(reason);
        }
    }
}

// ── RawChannel ──────────────────────────────────────────────────────

/// One raw channel bound 1:1 to a stack TCP session.
pub struct RawChannel<S: TcpSession> {
    shared: Arc<Shared>,
    session: Arc<S>,
    hostname: String,
    port: u16,
    read_buffer_size: usize,
    writer: Mutex<Option<JoinHandle<()>>>,
    torn_down: AtomicBool,
}

impl<S: TcpSession> RawChannel<S> {
    /// Open a session to `hostname:port`. Connect errors are returned as
    /// the stack reported them; there is no retry.
    ///
    /// Chunks that arrive before [`on_receive`](ByteChannel::on_receive)
    /// is called are dropped. Use [`open_with_receiver`](Self::open_with_receiver)
    /// for protocols where the server speaks first.
    pub async fn open<D>(
        dialer: &D,
        hostname: impl Into<String>,
        port: u16,
        options: ChannelOptions,
    ) -> Result<Self, meshdock_api::Error>
    where
        D: TcpDialer<Session = S> + ?Sized,
    {
        Self::open_with_receiver(dialer, hostname, port, options, None).await
    }

    /// Like [`open`](Self::open), with the receive handler installed
    /// before the session starts reading.
    pub async fn open_with_receiver<D>(
        dialer: &D,
        hostname: impl Into<String>,
        port: u16,
        options: ChannelOptions,
        receiver: Option<ReceiveHandler>,
    ) -> Result<Self, meshdock_api::Error>
    where
        D: TcpDialer<Session = S> + ?Sized,
    {
        let hostname = hostname.into();
        let shared = Arc::new(Shared::new(receiver));

        let reader = Arc::clone(&shared);
        let tcp = TcpOptions {
            hostname: hostname.clone(),
            port,
            read_callback: Box::new(move |event| reader.on_read(event)),
            read_buffer_size: options.read_buffer_size,
            connect_timeout: options.connect_timeout,
            write_buffer_size: options.write_buffer_size,
        };

        debug!(
            channel = shared.id,
            host = %hostname,
            port,
            read_buffer = options.read_buffer_size,
            "opening raw channel"
        );
        let session = Arc::new(dialer.open_tcp(tcp).await?);

        let (tx, rx) = mpsc::unbounded_channel();
        // A remote close may already have happened during open.
        if !shared.closed.load(Ordering::Acquire) {
            *lock(&shared.outbound) = Some(tx);
        }
        let writer = tokio::spawn(write_loop(Arc::clone(&shared), Arc::clone(&session), rx));

        debug!(channel = shared.id, remote = session.remote_addr(), "raw channel open");
        Ok(Self {
            shared,
            session,
            hostname,
            port,
            read_buffer_size: options.read_buffer_size,
            writer: Mutex::new(Some(writer)),
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn remote_addr(&self) -> &str {
        self.session.remote_addr()
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }
}

/// Drains queued writes in order. Exits when the queue sender is dropped
/// (close) or a write fails.
async fn write_loop<S: TcpSession>(
    shared: Arc<Shared>,
    session: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(data) = rx.recv().await {
        let len = data.len();
        match session.write(data).await {
            Ok(written) => trace!(channel = shared.id, len, written, "wrote chunk"),
            Err(e) => {
                shared.finish(CloseReason::WriteError(e.to_string()));
                break;
            }
        }
    }
}

impl<S: TcpSession> ByteChannel for RawChannel<S> {
    fn send(&self, message: ChannelMessage) {
        let data = match message {
            ChannelMessage::Binary(data) => data,
            ChannelMessage::Text(text) => {
                warn!(
                    channel = self.shared.id,
                    len = text.len(),
                    "non-binary payload passed to raw channel, dropping"
                );
                return;
            }
        };

        let outbound = lock(&self.shared.outbound);
        match outbound.as_ref() {
            Some(tx) => {
                if tx.send(data).is_err() {
                    debug!(channel = self.shared.id, "writer gone, send dropped");
                }
            }
            None => debug!(channel = self.shared.id, "send after close ignored"),
        }
    }

    fn on_receive(&self, handler: ReceiveHandler) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        *lock(&self.shared.receive) = Some(handler);
    }

    fn on_close(&self, handler: CloseHandler) {
        self.shared.register_close(handler);
    }

    async fn close(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.finish(CloseReason::Local);

        // Let already-queued writes reach the session before tearing down.
        let writer = lock(&self.writer).take();
        if let Some(writer) = writer {
            if let Err(e) = writer.await {
                debug!(channel = self.shared.id, error = %e, "writer task ended abnormally");
            }
        }
        if let Err(e) = self.session.close().await {
            debug!(channel = self.shared.id, error = %e, "session close reported an error");
        }
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

impl<S: TcpSession> Drop for RawChannel<S> {
    /// Dropping without `close()` still tears the session down, on the
    /// current runtime after queued writes drain.
    fn drop(&mut self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.finish(CloseReason::Local);

        let id = self.shared.id;
        let writer = lock(&self.writer).take();
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(writer) = writer {
                        let _ = writer.await;
                    }
                    if let Err(e) = session.close().await {
                        debug!(channel = id, error = %e, "session close after drop reported an error");
                    }
                });
            }
            Err(_) => {
                warn!(channel = id, "raw channel dropped outside a runtime, session left open");
                if let Some(writer) = writer {
                    writer.abort();
                }
            }
        }
    }
}

// ── Factory ─────────────────────────────────────────────────────────

/// Opens raw channels against the shared stack.
///
/// Vended by [`Controller::channels`](crate::Controller::channels); refuses
/// to open once the controller has halted or shut down.
pub struct ChannelFactory<D: TcpDialer> {
    dialer: Arc<D>,
    config: ChannelConfig,
    stopped: CancellationToken,
}

impl<D: TcpDialer> Clone for ChannelFactory<D> {
    fn clone(&self) -> Self {
        Self {
            dialer: Arc::clone(&self.dialer),
            config: self.config.clone(),
            stopped: self.stopped.clone(),
        }
    }
}

impl<D: TcpDialer> ChannelFactory<D> {
    pub fn new(dialer: Arc<D>, config: ChannelConfig, stopped: CancellationToken) -> Self {
        Self {
            dialer,
            config,
            stopped,
        }
    }

    fn options(&self, read_buffer_size: usize) -> ChannelOptions {
        ChannelOptions {
            read_buffer_size,
            connect_timeout: self.config.connect_timeout,
            write_buffer_size: None,
        }
    }

    /// Open with the default read-buffer size.
    pub async fn open(
        &self,
        hostname: &str,
        port: u16,
    ) -> Result<RawChannel<D::Session>, CoreError> {
        let options = self.options(self.config.default_read_buffer);
        self.open_with(hostname, port, options, None).await
    }

    /// Open with the read-buffer size configured for `protocol`.
    pub async fn open_for(
        &self,
        protocol: Protocol,
        hostname: &str,
        port: u16,
        receiver: Option<ReceiveHandler>,
    ) -> Result<RawChannel<D::Session>, CoreError> {
        let options = self.options(self.config.read_buffer_for(protocol));
        self.open_with(hostname, port, options, receiver).await
    }

    pub async fn open_with(
        &self,
        hostname: &str,
        port: u16,
        options: ChannelOptions,
        receiver: Option<ReceiveHandler>,
    ) -> Result<RawChannel<D::Session>, CoreError> {
        if self.stopped.is_cancelled() {
            return Err(CoreError::Halted);
        }
        let channel =
            RawChannel::open_with_receiver(&*self.dialer, hostname, port, options, receiver)
                .await?;
        Ok(channel)
    }

    /// Open a channel for `protocol` wrapped as an async byte stream.
    pub async fn open_stream(
        &self,
        protocol: Protocol,
        hostname: &str,
        port: u16,
    ) -> Result<ChannelStream<D::Session>, CoreError> {
        let (receiver, inbound) = stream::inbound();
        let options = self.options(self.config.read_buffer_for(protocol));
        let channel = self.open_with(hostname, port, options, Some(receiver)).await?;
        Ok(ChannelStream::assemble(channel, inbound))
    }
}
