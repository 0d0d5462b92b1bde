// Shared fakes for meshdock-core integration tests: an in-memory network
// stack whose TCP sessions are driven by the test, plus a harness that
// boots a controller against it.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Notify, broadcast};

use meshdock_api::{
    BootParams, Error, FetchRequest, FetchResponse, Fetcher, IpnState, NetworkStack, Notification,
    Notifier, ReadCallback, ReadEvent, SshSession, SshTermConfig, TcpDialer, TcpOptions,
    TcpSession,
};
use meshdock_core::storage::{codec, set_current_profile, state_key};
use meshdock_core::{
    ConsoleConfig, Controller, KeyValueStore, MemoryStore, Navigator, ProfileId,
    RecordingNavigator,
};

// ── Fake TCP sessions ───────────────────────────────────────────────

#[derive(Default)]
pub struct SessionLog {
    pub written: Mutex<Vec<Bytes>>,
    pub closed: AtomicBool,
    pub fail_writes: AtomicBool,
}

pub struct FakeSession {
    remote_addr: String,
    log: Arc<SessionLog>,
}

impl TcpSession for FakeSession {
    fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    async fn write(&self, data: Bytes) -> Result<usize, Error> {
        if self.log.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        if self.log.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }
        let len = data.len();
        self.log.written.lock().unwrap().push(data);
        Ok(len)
    }

    async fn close(&self) -> Result<(), Error> {
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeSsh;

impl SshSession for FakeSsh {
    fn resize(&self, _rows: u16, _cols: u16) -> bool {
        true
    }

    fn close(&self) -> bool {
        true
    }
}

// ── Fake stack ──────────────────────────────────────────────────────

/// An opened session as seen from the stack side.
struct Remote {
    read_callback: ReadCallback,
    read_buffer_size: usize,
    log: Arc<SessionLog>,
}

#[derive(Default)]
pub struct FakeStack {
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    remotes: Mutex<BTreeMap<String, Remote>>,
    run_exit: Notify,
}

impl FakeStack {
    /// Push a read event into the session opened to `target` (`host:port`).
    pub fn feed(&self, target: &str, event: ReadEvent) {
        let mut remotes = self.remotes.lock().unwrap();
        let remote = remotes.get_mut(target).unwrap();
        (remote.read_callback)(event);
    }

    pub fn log(&self, target: &str) -> Arc<SessionLog> {
        Arc::clone(&self.remotes.lock().unwrap().get(target).unwrap().log)
    }

    pub fn read_buffer_size(&self, target: &str) -> usize {
        self.remotes.lock().unwrap().get(target).unwrap().read_buffer_size
    }

    /// Make `run` return, as if the stack died.
    pub fn exit_run(&self) {
        self.run_exit.notify_one();
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl TcpDialer for FakeStack {
    type Session = FakeSession;

    async fn open_tcp(&self, options: TcpOptions) -> Result<FakeSession, Error> {
        if options.hostname == "unreachable.invalid" {
            return Err(Error::Connect {
                host: options.hostname,
                port: options.port,
                reason: "no route to host".into(),
            });
        }
        let target = format!("{}:{}", options.hostname, options.port);
        let log = Arc::new(SessionLog::default());
        self.remotes.lock().unwrap().insert(
            target.clone(),
            Remote {
                read_callback: options.read_callback,
                read_buffer_size: options.read_buffer_size,
                log: Arc::clone(&log),
            },
        );
        Ok(FakeSession {
            remote_addr: target,
            log,
        })
    }
}

impl Fetcher for FakeStack {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        Ok(FetchResponse {
            status: 200,
            status_text: "OK".into(),
            headers: BTreeMap::new(),
            body: request.url,
        })
    }
}

impl NetworkStack for FakeStack {
    type Ssh = FakeSsh;

    async fn run(&self, _notifier: Notifier) {
        self.run_exit.notified().await;
    }

    fn login(&self) {
        self.logins.fetch_add(1, Ordering::SeqCst);
    }

    fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }

    fn open_ssh(
        &self,
        _host: &str,
        _username: &str,
        _config: SshTermConfig,
    ) -> Result<FakeSsh, Error> {
        Ok(FakeSsh)
    }
}

// ── Storage seeding ─────────────────────────────────────────────────

pub fn store_profile(store: &MemoryStore, name: &str, control_url: &str) {
    let json = format!(
        r#"{{"ControlURL": "{control_url}", "WantRunning": true,
            "Config": {{"NodeID": "n-{name}", "UserProfile": {{"ID": 1, "LoginName": "{name}@example.net"}}}}}}"#
    );
    store
        .set(&state_key(&format!("profile-{name}")), &codec::encode(&json))
        .unwrap();
}

pub fn store_current(store: &MemoryStore, name: &str) {
    set_current_profile(store, &ProfileId::new(format!("profile-{name}"))).unwrap();
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub controller: Controller<FakeStack>,
    pub notifier: Notifier,
    pub nav: Arc<RecordingNavigator>,
    pub store: Arc<MemoryStore>,
    pub boot_params: BootParams,
    events: broadcast::Receiver<Notification>,
}

impl Harness {
    pub async fn start(store: Arc<MemoryStore>) -> Self {
        Self::start_with(ConsoleConfig::default(), store).await
    }

    pub async fn start_with(config: ConsoleConfig, store: Arc<MemoryStore>) -> Self {
        let nav = Arc::new(RecordingNavigator::new());
        let captured = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&captured);

        let controller = Controller::start(
            config,
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            move |params, notifier| {
                *slot.lock().unwrap() = Some((params, notifier));
                std::future::ready(Ok(FakeStack::default()))
            },
            Arc::clone(&nav) as Arc<dyn Navigator>,
        )
        .await
        .unwrap();

        let (boot_params, notifier) = captured.lock().unwrap().take().unwrap();
        let events = controller.notifications();
        Self {
            controller,
            notifier,
            nav,
            store,
            boot_params,
            events,
        }
    }

    pub fn stack(&self) -> &FakeStack {
        self.controller.stack()
    }

    /// Emit a notification and wait until the dispatch loop has fully
    /// handled it.
    pub async fn emit(&mut self, notification: Notification) {
        self.notifier.emit(notification);
        self.settle().await;
    }

    pub async fn state(&mut self, state: IpnState) {
        self.emit(Notification::State(state)).await;
    }

    /// Dispatch is sequential, so once a sentinel is broadcast everything
    /// emitted before it has been handled.
    pub async fn settle(&mut self) {
        self.notifier.notify_state(IpnState::NoState);
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(Notification::State(IpnState::NoState)) => break,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
        .await
        .unwrap();
    }
}
