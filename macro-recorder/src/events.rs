use crate::{normalize, Result};
use rdev::Key;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tracing::info;

/// Represents the type of mouse button
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    /// Extra buttons, identified by the platform button code
    Other(u8),
}

impl From<rdev::Button> for MouseButton {
    fn from(button: rdev::Button) -> Self {
        match button {
            rdev::Button::Left => MouseButton::Left,
            rdev::Button::Right => MouseButton::Right,
            rdev::Button::Middle => MouseButton::Middle,
            rdev::Button::Unknown(code) => MouseButton::Other(code),
        }
    }
}

impl From<MouseButton> for rdev::Button {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => rdev::Button::Left,
            MouseButton::Right => rdev::Button::Right,
            MouseButton::Middle => rdev::Button::Middle,
            MouseButton::Other(code) => rdev::Button::Unknown(code),
        }
    }
}

/// One captured input action, without its timing.
///
/// Serialized with a `kind` tag, e.g. `{"kind": "key_down", "key": "KeyA"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputAction {
    KeyDown {
        key: Key,
    },
    KeyUp {
        key: Key,
    },
    MouseMove {
        x: f64,
        y: f64,
    },
    MouseDown {
        button: MouseButton,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    MouseUp {
        button: MouseButton,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },
    MouseScroll {
        dx: i64,
        dy: i64,
    },
}

impl InputAction {
    pub fn is_mouse_move(&self) -> bool {
        matches!(self, InputAction::MouseMove { .. })
    }

    /// Returns true for a press (not a release) of `key`
    pub fn is_key_down(&self, key: Key) -> bool {
        matches!(self, InputAction::KeyDown { key: k } if *k == key)
    }

    /// Returns true for a press or release of `key`
    pub fn involves_key(&self, key: Key) -> bool {
        matches!(self, InputAction::KeyDown { key: k } | InputAction::KeyUp { key: k } if *k == key)
    }

    /// Short name used in logs, matching the serialized `kind`
    pub fn kind(&self) -> &'static str {
        match self {
            InputAction::KeyDown { .. } => "key_down",
            InputAction::KeyUp { .. } => "key_up",
            InputAction::MouseMove { .. } => "mouse_move",
            InputAction::MouseDown { .. } => "mouse_down",
            InputAction::MouseUp { .. } => "mouse_up",
            InputAction::MouseScroll { .. } => "mouse_scroll",
        }
    }
}

/// A recorded action together with the delay since the previous one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEvent {
    /// Delay since the previous event (or since recording start for the first event)
    #[serde(with = "seconds")]
    pub dt: Duration,

    #[serde(flatten)]
    pub action: InputAction,
}

impl MacroEvent {
    pub fn new(dt: Duration, action: InputAction) -> Self {
        Self { dt, action }
    }
}

/// An ordered recording. Insertion order is the replay order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MacroLog {
    events: Vec<MacroEvent>,
}

impl MacroLog {
    pub fn new(events: Vec<MacroEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[MacroEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Sum of all delays, i.e. the recorded length of the macro
    pub fn total_duration(&self) -> Duration {
        self.events.iter().map(|e| e.dt).sum()
    }

    /// Expected playback length at the given speed multiplier
    pub fn scaled_duration(&self, speed: f64) -> Duration {
        self.events.iter().map(|e| scale_delay(e.dt, speed)).sum()
    }

    /// Serialize to the pretty-printed JSON document written to disk
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON document, accepting both current and legacy record layouts
    pub fn from_json(json: &str) -> Result<Self> {
        let records: Vec<serde_json::Value> = serde_json::from_str(json)?;
        normalize::normalize_records(records).map(Self::new)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        info!("Saving {} events to {:?}", self.events.len(), path.as_ref());
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let log = Self::from_json(&json)?;
        info!("Loaded {} events from {:?}", log.len(), path.as_ref());
        Ok(log)
    }
}

/// Shortest wait used for a non-zero delay, however high the speed.
pub const MIN_SCALED_DELAY: Duration = Duration::from_micros(1);

/// Scale a recorded delay by a playback speed multiplier.
///
/// A non-zero delay never scales down to zero; `speed` is expected to be
/// validated as finite and positive by the caller.
pub fn scale_delay(dt: Duration, speed: f64) -> Duration {
    if dt.is_zero() {
        return Duration::ZERO;
    }
    seconds::from_f64(dt.as_secs_f64() / speed).max(MIN_SCALED_DELAY)
}

/// `Duration` <-> floating point seconds, the unit used in macro files
pub mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Convert seconds to a duration, rounding to the nearest nanosecond.
    /// Negative and non-finite input collapses to zero.
    pub fn from_f64(secs: f64) -> Duration {
        if !secs.is_finite() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((secs * 1e9).round() as u64)
    }

    pub fn serialize<S: Serializer>(dt: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(dt.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if secs < 0.0 {
            return Err(serde::de::Error::custom("delay must not be negative"));
        }
        Ok(from_f64(secs))
    }
}
