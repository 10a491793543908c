use super::{capture_channel, InputSink, InputSource, Subscription};
use crate::{InputAction, MacroError, Result};
use rdev::EventType;
use std::{sync::mpsc, time::Duration};
use tracing::{debug, error, info};

/// Global input capture backed by `rdev::listen`.
///
/// `rdev` cannot uninstall its hook, so the listener thread lives until the
/// process exits; once the [`Subscription`] is dropped it simply stops
/// forwarding events.
///
/// `subscribe` blocks for up to the startup grace period while the hook
/// reports failures, so call it before entering async code.
#[derive(Debug, Clone)]
pub struct DesktopSource {
    /// How long to wait for the hook to report a startup failure
    startup_grace: Duration,
}

impl DesktopSource {
    pub fn new(startup_grace: Duration) -> Self {
        Self { startup_grace }
    }
}

impl Default for DesktopSource {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl InputSource for DesktopSource {
    fn subscribe(&self) -> Result<Subscription> {
        let (feed, subscription) = capture_channel();
        let (err_tx, err_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("input-listener".to_string())
            .spawn(move || {
                let mut tracker = PointerTracker::default();
                let result = rdev::listen(move |event| {
                    feed.push(tracker.translate(event.event_type));
                });
                if let Err(e) = result {
                    error!("Failed to listen for input events: {:?}", e);
                    let _ = err_tx.send(format!("{:?}", e));
                }
                info!("Input listener thread has finished");
            })
            .map_err(|e| MacroError::CaptureUnavailable(e.to_string()))?;

        // A hook that installs correctly blocks forever, so silence means success.
        match err_rx.recv_timeout(self.startup_grace) {
            Ok(reason) => Err(MacroError::CaptureUnavailable(reason)),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                debug!("Global input hook installed");
                Ok(subscription)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(MacroError::CaptureUnavailable(
                "input listener thread exited during startup".to_string(),
            )),
        }
    }
}

/// Translates raw hook events, remembering the pointer position so that
/// button events can carry coordinates.
#[derive(Debug, Default)]
struct PointerTracker {
    last_position: Option<(f64, f64)>,
}

impl PointerTracker {
    fn translate(&mut self, event: EventType) -> InputAction {
        let (x, y) = match self.last_position {
            Some((x, y)) => (Some(x), Some(y)),
            None => (None, None),
        };
        match event {
            EventType::KeyPress(key) => InputAction::KeyDown { key },
            EventType::KeyRelease(key) => InputAction::KeyUp { key },
            EventType::ButtonPress(button) => InputAction::MouseDown {
                button: button.into(),
                x,
                y,
            },
            EventType::ButtonRelease(button) => InputAction::MouseUp {
                button: button.into(),
                x,
                y,
            },
            EventType::MouseMove { x, y } => {
                self.last_position = Some((x, y));
                InputAction::MouseMove { x, y }
            }
            EventType::Wheel { delta_x, delta_y } => InputAction::MouseScroll {
                dx: delta_x,
                dy: delta_y,
            },
        }
    }
}

/// Synthetic input backed by `rdev::simulate`
#[derive(Debug, Default)]
pub struct DesktopSink;

impl DesktopSink {
    pub fn new() -> Self {
        Self
    }
}

impl InputSink for DesktopSink {
    fn dispatch(&mut self, action: &InputAction) -> Result<()> {
        let event = to_event_type(action);
        rdev::simulate(&event)
            .map_err(|e| MacroError::DispatchFailed(format!("{:?} ({:?})", event, e)))
    }
}

/// Button coordinates are informational only; presses happen wherever the
/// pointer was last moved to.
pub fn to_event_type(action: &InputAction) -> EventType {
    match *action {
        InputAction::KeyDown { key } => EventType::KeyPress(key),
        InputAction::KeyUp { key } => EventType::KeyRelease(key),
        InputAction::MouseMove { x, y } => EventType::MouseMove { x, y },
        InputAction::MouseDown { button, .. } => EventType::ButtonPress(button.into()),
        InputAction::MouseUp { button, .. } => EventType::ButtonRelease(button.into()),
        InputAction::MouseScroll { dx, dy } => EventType::Wheel {
            delta_x: dx,
            delta_y: dy,
        },
    }
}
