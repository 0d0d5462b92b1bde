// ── Session lifecycle controller ──
//
// Single authority that turns network stack notifications into lifecycle
// transitions, profile reconciliation and navigation. Notifications are
// consumed by one dispatch task, strictly in emission order; each is fully
// handled (including the fatal check on `Running`) before the next one is
// looked at.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use arc_swap::ArcSwapOption;
use meshdock_api::{BootParams, IpnState, NetworkStack, Notification, Notifier};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelFactory;
use crate::config::ConsoleConfig;
use crate::error::CoreError;
use crate::model::{LifecycleState, NetworkMap, Peer, Profile, ProfileSet, Surface, Toast};
use crate::navigator::Navigator;
use crate::storage::{KeyValueStore, StackStateStorage, clear_current_profile, load_profiles};
use crate::stream::{NetMapSnapshot, NetMapStream};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Detail reported when the stack's run loop returns on its own.
pub const UNEXPECTED_SHUTDOWN: &str = "Unexpected shutdown";

// ── Dispatch state ──────────────────────────────────────────────────

/// Mutable bookkeeping owned by the dispatch loop. Also touched by
/// [`Controller::login`] so a user-initiated login is honoured after logout.
#[derive(Debug, Default)]
struct Session {
    /// The single mounted surface. Only surfaces recorded here are ever
    /// unmounted.
    mounted: Option<Surface>,
    /// `login()` already issued for the current needs-authentication
    /// occurrence.
    login_requested: bool,
    /// The session stopped (user logged out); no automatic login until the
    /// user asks for one.
    logged_out: bool,
    /// Set after a fatal condition. Every later notification is ignored.
    halted: bool,
}

/// Side effect produced while handling a notification. Applied after the
/// session lock is released so navigators may call back into the
/// controller.
#[derive(Debug)]
enum Effect {
    Mount(Surface),
    Unmount(Surface),
    OpenExternal(String),
    Toast(Toast),
    Login,
}

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replace whatever is mounted with `surface`. No-op when it is already
/// mounted.
fn show(session: &mut Session, surface: Surface, fx: &mut Vec<Effect>) {
    if session.mounted.as_ref() == Some(&surface) {
        return;
    }
    unmount_current(session, fx);
    session.mounted = Some(surface.clone());
    fx.push(Effect::Mount(surface));
}

fn unmount_current(session: &mut Session, fx: &mut Vec<Effect>) {
    if let Some(old) = session.mounted.take() {
        fx.push(Effect::Unmount(old));
    }
}

// ── Controller ──────────────────────────────────────────────────────

/// Drives the network stack through its session lifecycle.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Created with
/// [`start()`](Self::start), which returns once the stack has booted.
pub struct Controller<N: NetworkStack> {
    inner: Arc<ControllerInner<N>>,
}

impl<N: NetworkStack> Clone for Controller<N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<N> {
    config: ConsoleConfig,
    stack: Arc<N>,
    storage: Arc<dyn KeyValueStore>,
    navigator: Arc<dyn Navigator>,
    session: StdMutex<Session>,
    state: watch::Sender<LifecycleState>,
    surface: watch::Sender<Option<Surface>>,
    net_map: watch::Sender<NetMapSnapshot>,
    profile: ArcSwapOption<Profile>,
    events: broadcast::Sender<Notification>,
    cancel: CancellationToken,
    /// Fires on halt or shutdown; channel factories stop opening.
    stopped: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<N: NetworkStack> Controller<N> {
    /// Boot the stack and start consuming its notifications.
    ///
    /// Loads the last-known profile, mounts the loading surface, then awaits
    /// `boot`. A boot failure is fatal: the error surface is mounted and
    /// [`CoreError::Boot`] returned, with no retry. On success the dispatch
    /// loop and the stack's `run` are spawned; this never waits for `run`.
    pub async fn start<B, Fut>(
        config: ConsoleConfig,
        storage: Arc<dyn KeyValueStore>,
        boot: B,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, CoreError>
    where
        B: FnOnce(BootParams, Notifier) -> Fut,
        Fut: Future<Output = Result<N, meshdock_api::Error>>,
    {
        let last_known = match load_profiles(&*storage) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "could not read stored profiles, booting without one");
                ProfileSet::default()
            }
        };
        let last_profile = last_known.current_profile().cloned();
        if let Some(p) = &last_profile {
            debug!(profile = %p.id, "last known profile");
        }

        let mut session = Session::default();
        let mut fx = Vec::new();
        show(&mut session, Surface::Loading, &mut fx);
        apply_effects(&*navigator, None::<&N>, &fx);

        let params = BootParams {
            control_url: config
                .resolve_control_url(last_profile.as_ref().and_then(Profile::control_url)),
            auth_key: config.auth_key.clone(),
            route_all: config.route_all,
            advertise_tags: config.advertise_tags.clone(),
            hostname: config.hostname.clone(),
            state_storage: Arc::new(StackStateStorage::new(Arc::clone(&storage))),
        };
        info!(control_url = %params.control_url, "booting network stack");

        let (notifier, notifications) = Notifier::channel();
        let stack = match boot(params, notifier.clone()).await {
            Ok(stack) => Arc::new(stack),
            Err(e) => {
                let reason = match e {
                    meshdock_api::Error::Boot(reason) => reason,
                    other => other.to_string(),
                };
                error!(%reason, "network stack failed to boot");
                let mut fx = Vec::new();
                show(
                    &mut session,
                    Surface::Fatal {
                        detail: reason.clone(),
                    },
                    &mut fx,
                );
                apply_effects(&*navigator, None::<&N>, &fx);
                return Err(CoreError::Boot { reason });
            }
        };

        let (state, _) = watch::channel(LifecycleState::Booting);
        let (surface, _) = watch::channel(session.mounted.clone());
        let (net_map, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let stopped = cancel.child_token();

        let controller = Self {
            inner: Arc::new(ControllerInner {
                config,
                stack,
                storage,
                navigator,
                session: StdMutex::new(session),
                state,
                surface,
                net_map,
                profile: ArcSwapOption::new(last_profile.map(Arc::new)),
                events,
                cancel,
                stopped,
                task_handles: Mutex::new(Vec::new()),
            }),
        };

        let mut handles = controller.inner.task_handles.lock().await;
        handles.push(tokio::spawn(dispatch_task(
            controller.clone(),
            notifications,
        )));
        handles.push(tokio::spawn(run_task(
            Arc::clone(&controller.inner.stack),
            notifier,
            controller.inner.cancel.clone(),
        )));
        drop(handles);

        info!("network stack booted");
        Ok(controller)
    }

    /// Stop the dispatch loop and the stack's run task.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("controller shut down");
    }

    // ── Imperative calls ─────────────────────────────────────────────

    /// Ask the stack to start an interactive login. Also re-enables login
    /// after the session stopped.
    pub fn login(&self) -> Result<(), CoreError> {
        {
            let mut session = lock(&self.inner.session);
            if session.halted {
                return Err(CoreError::Halted);
            }
            session.logged_out = false;
            session.login_requested = true;
        }
        info!("login requested");
        self.inner.stack.login();
        Ok(())
    }

    /// Ask the stack to log the current identity out. The effect is
    /// observed through the next state notification.
    pub fn logout(&self) -> Result<(), CoreError> {
        if self.is_halted() {
            return Err(CoreError::Halted);
        }
        info!("logout requested");
        self.inner.stack.logout();
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn config(&self) -> &ConsoleConfig {
        &self.inner.config
    }

    /// The shared stack handle.
    pub fn stack(&self) -> &Arc<N> {
        &self.inner.stack
    }

    pub fn state(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        *self.inner.state.borrow()
    }

    /// The mounted surface, if any.
    pub fn surface(&self) -> watch::Receiver<Option<Surface>> {
        self.inner.surface.subscribe()
    }

    /// Whether a fatal condition stopped the controller for good.
    pub fn is_halted(&self) -> bool {
        lock(&self.inner.session).halted
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Every notification the stack emits, in arrival order. Each one is
    /// rebroadcast just before the controller handles it.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.events.subscribe()
    }

    pub fn net_map(&self) -> NetMapStream {
        NetMapStream::new(self.inner.net_map.subscribe())
    }

    pub fn net_map_snapshot(&self) -> NetMapSnapshot {
        self.inner.net_map.borrow().clone()
    }

    /// Profile resolved at the last `Running` (or the last-known one
    /// before that). Cleared when the session stops.
    pub fn current_profile(&self) -> Option<Arc<Profile>> {
        self.inner.profile.load_full()
    }

    /// Online peer acting as the self-service endpoint.
    pub fn selfservice_peer(&self) -> Option<Peer> {
        let map = self.net_map_snapshot()?;
        map.selfservice_peer(&self.inner.config.selfservice_hostname)
            .cloned()
    }

    /// Factory for raw channels over the shared stack.
    pub fn channels(&self) -> ChannelFactory<N> {
        ChannelFactory::new(
            Arc::clone(&self.inner.stack),
            self.inner.config.channels.clone(),
            self.inner.stopped.clone(),
        )
    }

    // ── Notification handling ────────────────────────────────────────

    fn dispatch(&self, notification: Notification) {
        let mut fx = Vec::new();
        {
            let mut session = lock(&self.inner.session);
            if session.halted {
                debug!(kind = notification.kind(), "controller halted, ignoring notification");
                return;
            }
            if let Err(e) = self.handle(&mut session, notification, &mut fx) {
                if e.is_fatal() {
                    self.halt(&mut session, e.to_string(), &mut fx);
                } else {
                    warn!(error = %e, "notification handler failed");
                    fx.push(Effect::Toast(Toast::error(e.to_string())));
                }
            }
        }
        self.apply(&fx);
    }

    fn handle(
        &self,
        session: &mut Session,
        notification: Notification,
        fx: &mut Vec<Effect>,
    ) -> Result<(), CoreError> {
        match notification {
            Notification::State(state) => self.on_state(session, state, fx),
            Notification::NetMap(raw) => self.on_net_map(&raw),
            Notification::BrowseToUrl(url) => {
                self.on_browse_to_url(session, url, fx);
                Ok(())
            }
            Notification::PanicRecover(detail) => {
                error!(%detail, "network stack panicked");
                self.halt(session, detail, fx);
                Ok(())
            }
        }
    }

    fn on_state(
        &self,
        session: &mut Session,
        state: IpnState,
        fx: &mut Vec<Effect>,
    ) -> Result<(), CoreError> {
        debug!(%state, current = %self.lifecycle_state(), "stack state");
        match state {
            IpnState::NeedsLogin => {
                self.on_needs_login(session, fx);
                Ok(())
            }
            IpnState::NeedsMachineAuth => {
                self.on_needs_machine_auth(session, fx);
                Ok(())
            }
            IpnState::Running => self.on_running(session, fx),
            IpnState::Stopped => {
                self.on_stopped(session, fx);
                Ok(())
            }
            IpnState::InUseOtherUser => {
                warn!("stack is in use by another user");
                fx.push(Effect::Toast(Toast::warning(
                    "The network stack is in use by another user",
                )));
                Ok(())
            }
            IpnState::NoState | IpnState::Starting => Ok(()),
        }
    }

    fn on_needs_login(&self, session: &mut Session, fx: &mut Vec<Effect>) {
        // Stays Stopped with LoggedOut mounted until the user logs in again.
        if session.logged_out {
            debug!("session was logged out, waiting for an explicit login");
            return;
        }
        let previous = self.set_state(LifecycleState::NeedsAuthentication);

        match self.reload_profiles() {
            Ok(set) if set.is_empty() => {
                if session.login_requested {
                    debug!("login already requested for this authentication round");
                } else {
                    info!("no stored profiles, starting login");
                    session.login_requested = true;
                    fx.push(Effect::Login);
                }
            }
            Ok(set) => {
                if previous != LifecycleState::NeedsAuthentication && !session.login_requested {
                    warn!(profiles = set.len(), "stored session needs authentication again");
                    fx.push(Effect::Toast(Toast::warning(
                        "Your session has expired. Sign in again to continue.",
                    )));
                }
            }
            Err(e) => {
                warn!(error = %e, "could not reload profiles");
                fx.push(Effect::Toast(Toast::error(e.to_string())));
            }
        }

        if !matches!(session.mounted, Some(Surface::Login { .. })) {
            show(session, Surface::Login { auth_url: None }, fx);
        }
    }

    fn on_needs_machine_auth(&self, session: &mut Session, fx: &mut Vec<Effect>) {
        let previous = self.set_state(LifecycleState::NeedsAuthentication);
        if previous != LifecycleState::NeedsAuthentication {
            info!("device awaits administrator approval");
            fx.push(Effect::Toast(Toast::info(
                "This device is waiting for approval by an administrator",
            )));
        }
        if !matches!(session.mounted, Some(Surface::Login { .. })) {
            show(session, Surface::Login { auth_url: None }, fx);
        }
    }

    fn on_running(&self, session: &mut Session, fx: &mut Vec<Effect>) -> Result<(), CoreError> {
        let profiles = self.reload_profiles().map_err(|e| {
            error!(error = %e, "could not read stored profiles");
            CoreError::ProfileUnresolved
        })?;
        let Some(profile) = profiles.current_profile().cloned() else {
            error!(profiles = profiles.len(), "stack is running without a resolvable profile");
            return Err(CoreError::ProfileUnresolved);
        };

        info!(profile = %profile.id, login = profile.login_name().unwrap_or("-"), "session running");
        self.inner.profile.store(Some(Arc::new(profile)));
        session.login_requested = false;
        session.logged_out = false;
        self.set_state(LifecycleState::Running);
        show(session, Surface::App, fx);
        Ok(())
    }

    fn on_stopped(&self, session: &mut Session, fx: &mut Vec<Effect>) {
        if self.lifecycle_state() == LifecycleState::Stopped {
            debug!("already stopped");
            return;
        }
        info!("session stopped");
        session.logged_out = true;
        session.login_requested = false;

        unmount_current(session, fx);
        if let Err(e) = clear_current_profile(&*self.inner.storage) {
            warn!(error = %e, "could not clear the current profile pointer");
            fx.push(Effect::Toast(Toast::error(e.to_string())));
        }
        self.inner.profile.store(None);
        self.set_state(LifecycleState::Stopped);
        show(session, Surface::LoggedOut, fx);
    }

    fn on_browse_to_url(&self, session: &mut Session, url: String, fx: &mut Vec<Effect>) {
        if session.logged_out {
            debug!("logged out, ignoring browse-to-URL until an explicit login");
            return;
        }
        let current = self.lifecycle_state();
        let user_login = current == LifecycleState::Stopped && session.login_requested;
        if !current.is_pre_auth() && !user_login {
            debug!(%current, "ignoring browse-to-URL outside authentication");
            return;
        }
        info!(%url, "authentication URL received");
        self.set_state(LifecycleState::NeedsAuthentication);
        show(
            session,
            Surface::Login {
                auth_url: Some(url.clone()),
            },
            fx,
        );
        fx.push(Effect::OpenExternal(url));
    }

    fn on_net_map(&self, raw: &str) -> Result<(), CoreError> {
        let map = NetworkMap::from_json(raw)?;
        debug!(
            domain = %map.domain,
            peers = map.peers.len(),
            online = map.online_peers().count(),
            "network map updated"
        );
        self.inner.net_map.send_replace(Some(Arc::new(map)));
        Ok(())
    }

    /// Terminal stop: unmount everything, show the error, ignore the rest.
    fn halt(&self, session: &mut Session, detail: String, fx: &mut Vec<Effect>) {
        error!(%detail, "controller halted");
        session.halted = true;
        self.set_state(LifecycleState::Stopped);
        show(session, Surface::Fatal { detail }, fx);
        self.inner.stopped.cancel();
    }

    fn set_state(&self, next: LifecycleState) -> LifecycleState {
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, "lifecycle transition");
        }
        previous
    }

    fn reload_profiles(&self) -> Result<ProfileSet, CoreError> {
        Ok(load_profiles(&*self.inner.storage)?)
    }

    fn apply(&self, fx: &[Effect]) {
        for effect in fx {
            match effect {
                Effect::Mount(s) => {
                    self.inner.surface.send_replace(Some(s.clone()));
                }
                Effect::Unmount(_) => {
                    self.inner.surface.send_replace(None);
                }
                Effect::OpenExternal(_) | Effect::Toast(_) | Effect::Login => {}
            }
        }
        apply_effects(&*self.inner.navigator, Some(&*self.inner.stack), fx);
    }
}

fn apply_effects<N: NetworkStack>(navigator: &dyn Navigator, stack: Option<&N>, fx: &[Effect]) {
    for effect in fx {
        match effect {
            Effect::Mount(s) => navigator.mount(s),
            Effect::Unmount(s) => navigator.unmount(s),
            Effect::OpenExternal(url) => navigator.open_external(url),
            Effect::Toast(t) => navigator.toast(t.clone()),
            Effect::Login => {
                if let Some(stack) = stack {
                    stack.login();
                }
            }
        }
    }
}

// ── Background tasks ────────────────────────────────────────────────

async fn dispatch_task<N: NetworkStack>(
    controller: Controller<N>,
    mut notifications: mpsc::UnboundedReceiver<Notification>,
) {
    let cancel = controller.inner.cancel.clone();
    loop {
        let notification = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = notifications.recv() => match next {
                Some(n) => n,
                None => {
                    debug!("notification channel closed");
                    break;
                }
            },
        };
        let _ = controller.inner.events.send(notification.clone());
        controller.dispatch(notification);
    }
}

async fn run_task<N: NetworkStack>(stack: Arc<N>, notifier: Notifier, cancel: CancellationToken) {
    tokio::select! {
        () = stack.run(notifier.clone()) => {
            warn!("network stack run loop returned");
            notifier.notify_panic_recover(UNEXPECTED_SHUTDOWN);
        }
        () = cancel.cancelled() => {}
    }
}
