//! Seams to the platform input layer.
//!
//! The core only needs two capabilities: subscribing to global input events
//! ([`InputSource`]) and synthesizing them ([`InputSink`]). The desktop
//! implementation lives in [`desktop`]; tests plug in their own.

use crate::{InputAction, Result};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use tracing::debug;

pub mod desktop;

pub use self::desktop::{DesktopSink, DesktopSource};

/// An input action observed by a capture hook, stamped on arrival
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedInput {
    pub at: Instant,
    pub action: InputAction,
}

/// Something that can observe global input
pub trait InputSource {
    /// Install the capture hook. Failing to do so is fatal for the caller.
    fn subscribe(&self) -> Result<Subscription>;
}

/// Something that can inject synthetic input
pub trait InputSink {
    fn dispatch(&mut self, action: &InputAction) -> Result<()>;
}

impl<S: InputSink + ?Sized> InputSink for Box<S> {
    fn dispatch(&mut self, action: &InputAction) -> Result<()> {
        (**self).dispatch(action)
    }
}

/// Create a connected feed/subscription pair.
///
/// Capture hooks push into the [`CaptureFeed`]; the session consumes the
/// [`Subscription`]. Dropping the subscription deactivates the feed.
pub fn capture_channel() -> (CaptureFeed, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    let active = Arc::new(AtomicBool::new(true));
    let feed = CaptureFeed {
        tx,
        active: Arc::clone(&active),
    };
    let subscription = Subscription {
        events: UnboundedReceiverStream::new(rx),
        active,
    };
    (feed, subscription)
}

/// Producer half of a capture subscription
#[derive(Debug, Clone)]
pub struct CaptureFeed {
    tx: mpsc::UnboundedSender<CapturedInput>,
    active: Arc<AtomicBool>,
}

impl CaptureFeed {
    /// Forward an action stamped with the current time.
    /// Returns false once the subscription has been released.
    pub fn push(&self, action: InputAction) -> bool {
        self.push_at(action, Instant::now())
    }

    pub fn push_at(&self, action: InputAction, at: Instant) -> bool {
        if !self.is_active() {
            return false;
        }
        self.tx.send(CapturedInput { at, action }).is_ok()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

/// The single active global input subscription.
///
/// Owned by whichever session acquired it and released when dropped, on every
/// exit path.
#[derive(Debug)]
pub struct Subscription {
    events: UnboundedReceiverStream<CapturedInput>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    /// Wait for the next captured input; `None` means the hook is gone.
    pub async fn next(&mut self) -> Option<CapturedInput> {
        self.events.next().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        debug!("Input subscription released");
    }
}
