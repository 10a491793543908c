//! Abort hotkey plumbing shared by recording and playback.

use crate::input::Subscription;
use rdev::Key;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info};

/// The key that ends a recording or a playback
pub const DEFAULT_ABORT_KEY: Key = Key::Escape;

/// Create a connected abort handle/signal pair
pub fn abort_channel() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx: Arc::new(tx) }, AbortSignal { rx })
}

/// Trigger side of an abort. Cloneable; aborting is idempotent.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observer side of an abort
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once an abort has been requested. Never resolves if every
    /// handle is dropped without aborting.
    pub async fn aborted(&mut self) {
        if self.rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Counts abort-key presses injected by the player that the watcher has not
/// observed yet, so a recorded abort key is not mistaken for the user's.
///
/// The hook delivers injected events with some latency; a pending press stays
/// pending until the watcher consumes it or playback clears it.
#[derive(Debug, Clone, Default)]
pub struct InjectionMarker {
    pending: Arc<AtomicUsize>,
}

impl InjectionMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one injected abort-key press
    pub fn mark(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Take one pending injected press; false if none is pending
    pub fn consume(&self) -> bool {
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn clear(&self) {
        self.pending.store(0, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

/// Watch a capture subscription for presses of `abort_key` and trigger
/// `handle` on the first one that does not match a pending injection.
///
/// The subscription is owned by the task and released when it ends.
pub fn spawn_abort_watcher(
    mut subscription: Subscription,
    abort_key: Key,
    handle: AbortHandle,
    marker: InjectionMarker,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(input) = subscription.next().await {
            if !input.action.is_key_down(abort_key) {
                continue;
            }
            if marker.consume() {
                debug!("Ignoring injected {:?}", abort_key);
                continue;
            }
            info!("Abort key {:?} pressed", abort_key);
            handle.abort();
            return;
        }
        debug!("Abort watcher subscription closed");
    })
}
