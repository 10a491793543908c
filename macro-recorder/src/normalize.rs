//! Load-time normalization of macro files.
//!
//! Every record is turned into the canonical `dt`-based [`MacroEvent`] here, so
//! playback never has to care which layout a file was written in. Two older
//! layouts are understood:
//!
//! * absolute timestamps stored under `t` instead of a `dt` delay;
//! * `type`-tagged records (`move`, `click`, `scroll`, `key`) with a `pressed`
//!   flag and textual key names such as `"a"`, `"Key.esc"` or `"<65437>"`.

use crate::{
    events::seconds, InputAction, MacroError, MacroEvent, MouseButton, Result,
};
use rdev::Key;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// How a record expresses its timing
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stamp {
    /// Delay since the previous record
    Delta(f64),
    /// Absolute time since recording start (legacy `t`)
    Absolute(f64),
}

/// Convert parsed JSON records into canonical events.
///
/// Absolute stamps are differenced against the previous record's time, which
/// starts at zero, so the first legacy record keeps its raw timestamp as its
/// delay. Negative delays (clock going backwards) are clamped to zero.
pub(crate) fn normalize_records(records: Vec<Value>) -> Result<Vec<MacroEvent>> {
    let mut events = Vec::with_capacity(records.len());
    let mut clock = 0.0_f64;

    for (index, record) in records.into_iter().enumerate() {
        let (stamp, action) = parse_record(index, record)?;
        let delta = match stamp {
            Stamp::Delta(dt) => {
                clock += dt.max(0.0);
                dt
            }
            Stamp::Absolute(t) => {
                let dt = t - clock;
                clock = t;
                dt
            }
        };
        if delta < 0.0 {
            warn!("Record {} goes back in time by {:.6}s; clamping its delay to 0", index, -delta);
        }
        events.push(MacroEvent::new(seconds::from_f64(delta), action));
    }

    Ok(events)
}

fn parse_record(index: usize, record: Value) -> Result<(Stamp, InputAction)> {
    let Value::Object(mut fields) = record else {
        return Err(MacroError::malformed(index, "expected a JSON object"));
    };

    let stamp = match (take_seconds(index, &mut fields, "dt")?, take_seconds(index, &mut fields, "t")?) {
        (Some(dt), _) => Stamp::Delta(dt),
        (None, Some(t)) => Stamp::Absolute(t),
        (None, None) => return Err(MacroError::malformed(index, "missing `dt` (or legacy `t`) field")),
    };

    let action = if fields.contains_key("kind") {
        serde_json::from_value::<InputAction>(Value::Object(fields))
            .map_err(|e| MacroError::malformed(index, e.to_string()))?
    } else if fields.contains_key("type") {
        let legacy = serde_json::from_value::<LegacyAction>(Value::Object(fields))
            .map_err(|e| MacroError::malformed(index, e.to_string()))?;
        legacy.into_action().map_err(|reason| MacroError::malformed(index, reason))?
    } else {
        return Err(MacroError::malformed(index, "missing `kind` field"));
    };

    Ok((stamp, action))
}

fn take_seconds(index: usize, fields: &mut Map<String, Value>, name: &str) -> Result<Option<f64>> {
    match fields.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| MacroError::malformed(index, format!("`{}` is not a finite number", name))),
        Some(other) => Err(MacroError::malformed(
            index,
            format!("`{}` must be a number of seconds, got {}", name, other),
        )),
    }
}

fn default_pressed() -> bool {
    true
}

fn default_button() -> String {
    "left".to_string()
}

/// Records written by the earlier recorder
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LegacyAction {
    Move {
        x: f64,
        y: f64,
    },
    Click {
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
        #[serde(default = "default_button")]
        button: String,
        #[serde(default = "default_pressed")]
        pressed: bool,
    },
    Scroll {
        #[serde(default)]
        dx: i64,
        #[serde(default)]
        dy: i64,
    },
    Key {
        key: String,
        #[serde(default = "default_pressed")]
        pressed: bool,
    },
}

impl LegacyAction {
    fn into_action(self) -> std::result::Result<InputAction, String> {
        Ok(match self {
            LegacyAction::Move { x, y } => InputAction::MouseMove { x, y },
            LegacyAction::Click { x, y, button, pressed } => {
                let button = legacy_button(&button);
                if pressed {
                    InputAction::MouseDown { button, x, y }
                } else {
                    InputAction::MouseUp { button, x, y }
                }
            }
            LegacyAction::Scroll { dx, dy } => InputAction::MouseScroll { dx, dy },
            LegacyAction::Key { key, pressed } => {
                let key = legacy_key(&key).ok_or_else(|| format!("unknown key name {:?}", key))?;
                if pressed {
                    InputAction::KeyDown { key }
                } else {
                    InputAction::KeyUp { key }
                }
            }
        })
    }
}

/// Unknown button names fall back to the left button
fn legacy_button(name: &str) -> MouseButton {
    match name {
        "left" => MouseButton::Left,
        "right" => MouseButton::Right,
        "middle" => MouseButton::Middle,
        other => {
            debug!("Unknown legacy button {:?}, using left", other);
            MouseButton::Left
        }
    }
}

/// Map a legacy key name to a key.
///
/// Accepts special keys (`Key.enter`), printable characters (`a`, `!`) and raw
/// virtual key codes (`<65437>`). Shifted symbols map to their base key since
/// the shift press is recorded separately.
pub fn legacy_key(name: &str) -> Option<Key> {
    if let Some(special) = name.strip_prefix("Key.") {
        return special_key(special);
    }
    if let Some(code) = name.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
        return code.parse().ok().map(Key::Unknown);
    }
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => char_key(c),
        _ => None,
    }
}

fn special_key(name: &str) -> Option<Key> {
    let key = match name {
        "alt" | "alt_l" => Key::Alt,
        "alt_r" | "alt_gr" => Key::AltGr,
        "backspace" => Key::Backspace,
        "caps_lock" => Key::CapsLock,
        "cmd" | "cmd_l" => Key::MetaLeft,
        "cmd_r" => Key::MetaRight,
        "ctrl" | "ctrl_l" => Key::ControlLeft,
        "ctrl_r" => Key::ControlRight,
        "delete" => Key::Delete,
        "down" => Key::DownArrow,
        "end" => Key::End,
        "enter" => Key::Return,
        "esc" => Key::Escape,
        "home" => Key::Home,
        "insert" => Key::Insert,
        "left" => Key::LeftArrow,
        "num_lock" => Key::NumLock,
        "page_down" => Key::PageDown,
        "page_up" => Key::PageUp,
        "pause" => Key::Pause,
        "print_screen" => Key::PrintScreen,
        "right" => Key::RightArrow,
        "scroll_lock" => Key::ScrollLock,
        "shift" | "shift_l" => Key::ShiftLeft,
        "shift_r" => Key::ShiftRight,
        "space" => Key::Space,
        "tab" => Key::Tab,
        "up" => Key::UpArrow,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => return None,
    };
    Some(key)
}

fn char_key(c: char) -> Option<Key> {
    let key = match c.to_ascii_lowercase() {
        'a' => Key::KeyA,
        'b' => Key::KeyB,
        'c' => Key::KeyC,
        'd' => Key::KeyD,
        'e' => Key::KeyE,
        'f' => Key::KeyF,
        'g' => Key::KeyG,
        'h' => Key::KeyH,
        'i' => Key::KeyI,
        'j' => Key::KeyJ,
        'k' => Key::KeyK,
        'l' => Key::KeyL,
        'm' => Key::KeyM,
        'n' => Key::KeyN,
        'o' => Key::KeyO,
        'p' => Key::KeyP,
        'q' => Key::KeyQ,
        'r' => Key::KeyR,
        's' => Key::KeyS,
        't' => Key::KeyT,
        'u' => Key::KeyU,
        'v' => Key::KeyV,
        'w' => Key::KeyW,
        'x' => Key::KeyX,
        'y' => Key::KeyY,
        'z' => Key::KeyZ,
        '1' | '!' => Key::Num1,
        '2' | '@' => Key::Num2,
        '3' | '#' => Key::Num3,
        '4' | '$' => Key::Num4,
        '5' | '%' => Key::Num5,
        '6' | '^' => Key::Num6,
        '7' | '&' => Key::Num7,
        '8' | '*' => Key::Num8,
        '9' | '(' => Key::Num9,
        '0' | ')' => Key::Num0,
        ' ' => Key::Space,
        '-' | '_' => Key::Minus,
        '=' | '+' => Key::Equal,
        '[' | '{' => Key::LeftBracket,
        ']' | '}' => Key::RightBracket,
        ';' | ':' => Key::SemiColon,
        '\'' | '"' => Key::Quote,
        '`' | '~' => Key::BackQuote,
        '\\' | '|' => Key::BackSlash,
        ',' | '<' => Key::Comma,
        '.' | '>' => Key::Dot,
        '/' | '?' => Key::Slash,
        '\t' => Key::Tab,
        '\n' | '\r' => Key::Return,
        _ => return None,
    };
    Some(key)
}
