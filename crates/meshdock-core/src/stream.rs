// ── Network map subscription ──
//
// The controller republishes the whole map on every net-map notification,
// so subscribers only ever see complete maps; there are no per-peer deltas.

use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::StreamExt as _;
use tokio_stream::wrappers::WatchStream;

use crate::model::NetworkMap;

/// What the controller publishes: nothing until the stack has sent a map
/// that decoded, then always the most recent one.
pub type NetMapSnapshot = Option<Arc<NetworkMap>>;

/// Subscriber handle for the peer list.
///
/// A malformed map never reaches subscribers; the previous map stays
/// published.
pub struct NetMapStream {
    seen: NetMapSnapshot,
    receiver: watch::Receiver<NetMapSnapshot>,
}

impl NetMapStream {
    pub(crate) fn new(receiver: watch::Receiver<NetMapSnapshot>) -> Self {
        let seen = receiver.borrow().clone();
        Self { seen, receiver }
    }

    /// Map this handle last observed.
    pub fn current(&self) -> &NetMapSnapshot {
        &self.seen
    }

    /// Map published right now, without marking it observed.
    pub fn latest(&self) -> NetMapSnapshot {
        self.receiver.borrow().clone()
    }

    /// Next replacement map. `None` once the controller is gone.
    pub async fn changed(&mut self) -> Option<NetMapSnapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.seen.clone_from(&snap);
        Some(snap)
    }

    /// Resolves with the first decoded map, immediately if one is already
    /// published. `None` if the controller goes away first.
    pub async fn wait_for_map(&mut self) -> Option<Arc<NetworkMap>> {
        let map = self
            .receiver
            .wait_for(Option::is_some)
            .await
            .ok()?
            .clone();
        self.seen.clone_from(&map);
        map
    }

    /// Every published map, starting with the current one if there is one.
    pub fn into_stream(self) -> impl Stream<Item = Arc<NetworkMap>> + Send + Unpin {
        WatchStream::new(self.receiver).filter_map(|snap| snap)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_stream::StreamExt;

    use super::*;

    fn map(domain: &str) -> Arc<NetworkMap> {
        let raw = format!(r#"{{"domain": "{domain}", "self": {{"name": "me"}}}}"#);
        Arc::new(NetworkMap::from_json(&raw).unwrap())
    }

    #[tokio::test]
    async fn changed_tracks_replacements() {
        let (tx, rx) = watch::channel(None);
        let mut sub = NetMapStream::new(rx);
        assert!(sub.current().is_none());

        tx.send_replace(Some(map("a.example")));
        let snap = sub.changed().await.unwrap().unwrap();
        assert_eq!(snap.domain, "a.example");
        assert_eq!(sub.current().as_ref().unwrap().domain, "a.example");

        drop(tx);
        assert!(sub.changed().await.is_none());
    }

    #[tokio::test]
    async fn wait_for_map_skips_the_empty_start() {
        let (tx, rx) = watch::channel(None);
        let mut sub = NetMapStream::new(rx);

        let waiter = tokio::spawn(async move { sub.wait_for_map().await });
        tx.send_replace(Some(map("late.example")));
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.domain, "late.example");

        let (_tx, rx) = watch::channel(Some(map("ready.example")));
        let mut ready = NetMapStream::new(rx);
        assert_eq!(ready.wait_for_map().await.unwrap().domain, "ready.example");
    }

    #[tokio::test]
    async fn stream_yields_only_published_maps() {
        let (tx, rx) = watch::channel(None);
        let mut maps = NetMapStream::new(rx).into_stream();

        tx.send_replace(Some(map("first.example")));
        assert_eq!(maps.next().await.unwrap().domain, "first.example");

        tx.send_replace(Some(map("second.example")));
        assert_eq!(maps.next().await.unwrap().domain, "second.example");

        drop(tx);
        assert!(maps.next().await.is_none());
    }
}
