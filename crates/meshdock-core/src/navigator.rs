// ── Navigation collaborator ──
//
// The controller decides *what* should be on screen; a `Navigator` does
// the mounting. Calls are synchronous and arrive from the dispatch task in
// notification order.

use std::sync::Mutex;

use crate::model::{Surface, SurfaceKind, Toast};

/// Receiver of navigation side effects.
pub trait Navigator: Send + Sync + 'static {
    /// Mount `surface`. The controller unmounts the previous surface first.
    fn mount(&self, surface: &Surface);

    /// Unmount a surface previously passed to [`mount`](Self::mount).
    fn unmount(&self, surface: &Surface);

    /// Open `url` alongside the console (new window, system browser).
    /// Never replaces the console itself.
    fn open_external(&self, url: &str);

    fn toast(&self, toast: Toast);
}

/// One recorded navigator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    Mount(Surface),
    Unmount(Surface),
    OpenExternal(String),
    Toast(Toast),
}

/// [`Navigator`] that records every call in order.
///
/// Used by tests and by headless front-ends that replay the event log.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<NavEvent>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: NavEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    /// Snapshot of every call so far.
    pub fn events(&self) -> Vec<NavEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Surfaces currently mounted according to the recorded mount/unmount
    /// pairs, in mount order.
    pub fn mounted(&self) -> Vec<Surface> {
        let mut mounted: Vec<Surface> = Vec::new();
        for event in self.events() {
            match event {
                NavEvent::Mount(s) => mounted.push(s),
                NavEvent::Unmount(s) => {
                    if let Some(pos) = mounted.iter().position(|m| *m == s) {
                        mounted.remove(pos);
                    }
                }
                NavEvent::OpenExternal(_) | NavEvent::Toast(_) => {}
            }
        }
        mounted
    }

    /// Number of times a surface of `kind` was mounted.
    pub fn mount_count(&self, kind: SurfaceKind) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, NavEvent::Mount(s) if s.kind() == kind))
            .count()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NavEvent::Toast(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                NavEvent::OpenExternal(url) => Some(url),
                _ => None,
            })
            .collect()
    }
}

impl Navigator for RecordingNavigator {
    fn mount(&self, surface: &Surface) {
        self.push(NavEvent::Mount(surface.clone()));
    }

    fn unmount(&self, surface: &Surface) {
        self.push(NavEvent::Unmount(surface.clone()));
    }

    fn open_external(&self, url: &str) {
        self.push(NavEvent::OpenExternal(url.to_owned()));
    }

    fn toast(&self, toast: Toast) {
        self.push(NavEvent::Toast(toast));
    }
}

impl<T: Navigator + ?Sized> Navigator for std::sync::Arc<T> {
    fn mount(&self, surface: &Surface) {
        (**self).mount(surface);
    }

    fn unmount(&self, surface: &Surface) {
        (**self).unmount(surface);
    }

    fn open_external(&self, url: &str) {
        (**self).open_external(url);
    }

    fn toast(&self, toast: Toast) {
        (**self).toast(toast);
    }
}
