use crate::{
    events::scale_delay,
    hotkey::{AbortSignal, InjectionMarker, DEFAULT_ABORT_KEY},
    input::InputSink,
    InputAction, MacroError, MacroLog, MouseButton, Result,
};
use rdev::Key;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Configuration for macro playback
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Playback speed multiplier; 2.0 plays twice as fast
    pub speed: f64,

    /// Key that aborts playback
    pub abort_key: Key,

    /// How often the countdown display is refreshed
    pub countdown_refresh: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            abort_key: DEFAULT_ABORT_KEY,
            countdown_refresh: Duration::from_millis(500),
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.speed.is_finite() && self.speed > 0.0 {
            Ok(())
        } else {
            Err(MacroError::InvalidSpeed(self.speed))
        }
    }
}

/// How a playback ended
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackOutcome {
    /// Every event was dispatched
    Completed { dispatched: usize },
    /// The abort key stopped playback before `dispatched` reached the end
    Aborted {
        dispatched: usize,
        remaining: usize,
        held: HeldInputs,
    },
}

impl PlaybackOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, PlaybackOutcome::Aborted { .. })
    }

    pub fn dispatched(&self) -> usize {
        match self {
            PlaybackOutcome::Completed { dispatched } | PlaybackOutcome::Aborted { dispatched, .. } => *dispatched,
        }
    }
}

/// Keys and buttons pressed by playback and not released yet
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeldInputs {
    pub keys: Vec<Key>,
    pub buttons: Vec<MouseButton>,
}

impl HeldInputs {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.buttons.is_empty()
    }

    fn track(&mut self, action: &InputAction) {
        match *action {
            InputAction::KeyDown { key } if !self.keys.contains(&key) => self.keys.push(key),
            InputAction::KeyUp { key } => self.keys.retain(|k| *k != key),
            InputAction::MouseDown { button, .. } if !self.buttons.contains(&button) => self.buttons.push(button),
            InputAction::MouseUp { button, .. } => self.buttons.retain(|b| *b != button),
            _ => {}
        }
    }
}

/// Replays a macro log through an [`InputSink`]
pub struct MacroPlayer<S: InputSink> {
    sink: S,
    config: PlayerConfig,
    marker: InjectionMarker,
}

impl<S: InputSink> MacroPlayer<S> {
    pub fn new(sink: S, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            sink,
            config,
            marker: InjectionMarker::new(),
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Marker the abort watcher consumes to skip injected abort keys
    pub fn injection_marker(&self) -> InjectionMarker {
        self.marker.clone()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Dispatch every event of `log` in order, waiting `dt / speed` before each.
    ///
    /// Deadlines accumulate from the start of playback, so a late dispatch
    /// does not push back the rest of the macro. Each wait races against
    /// `abort`; once it fires nothing more is dispatched. Keys or buttons left
    /// down by an abort are reported, not released.
    pub async fn play(&mut self, log: &MacroLog, mut abort: AbortSignal) -> Result<PlaybackOutcome> {
        let speed = self.config.speed;
        let total = log.len();
        info!("Running {} events at {}x", total, speed);

        let mut held = HeldInputs::default();
        let mut deadline = Instant::now();

        for (index, event) in log.events().iter().enumerate() {
            let wait = scale_delay(event.dt, speed);
            if wait.is_zero() {
                tokio::task::yield_now().await;
            } else {
                deadline += wait;
                tokio::select! {
                    biased;
                    _ = abort.aborted() => {}
                    _ = sleep_until(deadline) => {}
                }
            }

            if abort.is_aborted() {
                self.marker.clear();
                if !held.is_empty() {
                    warn!("Playback aborted with inputs still held: {:?}", held);
                }
                info!("Playback aborted after {} of {} events", index, total);
                return Ok(PlaybackOutcome::Aborted {
                    dispatched: index,
                    remaining: total - index,
                    held,
                });
            }

            if let Err(e) = self.dispatch(&event.action) {
                self.marker.clear();
                return Err(e);
            }
            held.track(&event.action);
        }

        self.marker.clear();
        info!("Playback finished ({} events)", total);
        Ok(PlaybackOutcome::Completed { dispatched: total })
    }

    fn dispatch(&mut self, action: &InputAction) -> Result<()> {
        // marked before injecting: the hook may deliver the press before simulate returns
        if action.is_key_down(self.config.abort_key) {
            self.marker.mark();
        }
        debug!("Dispatching {}", action.kind());
        self.sink.dispatch(action)
    }
}
