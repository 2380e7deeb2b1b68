use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

/// Process-wide "logged in" flag.
///
/// Holds no business logic: login sets it, logout and terminal auth
/// failures clear it. Readers subscribe instead of polling storage. Every
/// `set` also bumps an epoch so work started under an older session can
/// tell that it has been overtaken.
#[derive(Debug, Clone)]
pub struct SessionBroadcaster {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    epoch: AtomicU64,
}

impl SessionBroadcaster {
    pub fn new(logged_in: bool) -> Self {
        let (tx, _rx) = watch::channel(logged_in);
        Self {
            inner: Arc::new(Inner {
                tx,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    pub fn get(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Publish a new value. Subscribers are woken even if the value is unchanged.
    pub fn set(&self, logged_in: bool) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.inner.tx.send_replace(logged_in);
        debug!(previous, logged_in, epoch, "Session flag set");
    }

    /// Receiver that observes every subsequent `set`
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.tx.subscribe()
    }

    /// Number of `set` calls so far
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }
}

impl Default for SessionBroadcaster {
    fn default() -> Self {
        Self::new(false)
    }
}
