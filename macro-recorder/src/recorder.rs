use crate::{
    hotkey::DEFAULT_ABORT_KEY,
    input::{InputSource, Subscription},
    InputAction, MacroError, MacroEvent, MacroLog, Result,
};
use rdev::Key;
use std::{path::Path, time::Instant};
use tracing::{debug, info};

/// How mouse motion is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionCapture {
    /// Store every motion sample
    #[default]
    Full,
    /// Keep only the last position before each non-motion event
    Compact,
}

/// Configuration for the macro recorder
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Mouse motion policy
    pub motion: MotionCapture,

    /// Key that stops the recording; never written to the log
    pub abort_key: Key,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            motion: MotionCapture::Full,
            abort_key: DEFAULT_ABORT_KEY,
        }
    }
}

/// Accumulates captured actions into timed events.
///
/// Each event's `dt` is measured from the previously *stored* event, or from
/// the session start for the first one. Under [`MotionCapture::Compact`] a
/// move is held back until the next non-move action (or [`finish`]) and
/// intermediate moves are dropped; the held move keeps its own capture time,
/// so the recorded timeline keeps its total length.
///
/// [`finish`]: MacroBuilder::finish
#[derive(Debug)]
pub struct MacroBuilder {
    motion: MotionCapture,
    last_stored: Instant,
    pending_move: Option<(Instant, InputAction)>,
    events: Vec<MacroEvent>,
    dropped_moves: usize,
}

impl MacroBuilder {
    pub fn new(motion: MotionCapture, started_at: Instant) -> Self {
        Self {
            motion,
            last_stored: started_at,
            pending_move: None,
            events: Vec::new(),
            dropped_moves: 0,
        }
    }

    pub fn push(&mut self, action: InputAction, at: Instant) {
        if self.motion == MotionCapture::Compact {
            if action.is_mouse_move() {
                if self.pending_move.replace((at, action)).is_some() {
                    self.dropped_moves += 1;
                }
                return;
            }
            self.flush_pending_move();
        }
        self.store(action, at);
    }

    /// Number of events stored so far (a held-back move is not counted)
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn finish(mut self) -> MacroLog {
        self.flush_pending_move();
        if self.dropped_moves > 0 {
            debug!("Compaction dropped {} intermediate mouse moves", self.dropped_moves);
        }
        MacroLog::new(self.events)
    }

    fn flush_pending_move(&mut self) {
        if let Some((at, action)) = self.pending_move.take() {
            self.store(action, at);
        }
    }

    fn store(&mut self, action: InputAction, at: Instant) {
        let dt = at.saturating_duration_since(self.last_stored);
        self.last_stored = self.last_stored.max(at);
        self.events.push(MacroEvent::new(dt, action));
    }
}

/// Records global input until the abort key is pressed
pub struct MacroRecorder {
    config: RecorderConfig,
}

impl MacroRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Subscribe to `source` and record until the abort key is pressed.
    ///
    /// Failing to subscribe is fatal. If the subscription ends before the
    /// abort key is seen, the partial recording is discarded.
    pub async fn record<S: InputSource + ?Sized>(&self, source: &S) -> Result<MacroLog> {
        let subscription = source.subscribe()?;
        info!("Recording started (motion: {:?})", self.config.motion);
        self.record_from(subscription, Instant::now()).await
    }

    /// Record from an already acquired subscription, timing from `started_at`
    pub async fn record_from(&self, mut subscription: Subscription, started_at: Instant) -> Result<MacroLog> {
        let abort_key = self.config.abort_key;
        let mut builder = MacroBuilder::new(self.config.motion, started_at);

        loop {
            let Some(input) = subscription.next().await else {
                return Err(MacroError::CaptureLost(format!(
                    "subscription closed after {} events",
                    builder.len()
                )));
            };
            if input.action.is_key_down(abort_key) {
                info!("Stopping recording ({:?} pressed)", abort_key);
                break;
            }
            if input.action.involves_key(abort_key) {
                // stray release of the abort key; never recorded
                continue;
            }
            builder.push(input.action, input.at);
        }

        drop(subscription);
        Ok(builder.finish())
    }

    /// Record and write the result to `path`
    pub async fn record_to_file<S, P>(&self, source: &S, path: P) -> Result<MacroLog>
    where
        S: InputSource + ?Sized,
        P: AsRef<Path>,
    {
        let log = self.record(source).await?;
        log.save(path)?;
        Ok(log)
    }
}
