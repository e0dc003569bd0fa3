// Keyrelay Input Layer - Device Filtering
// Name/identity matching, keyboard-shape check and self-exclusion

use std::fmt;

use evdev::EventType;
use regex::Regex;

use super::device::{DeviceCapabilities, DeviceDescriptor};
use crate::output::OutputDeviceName;

/// Event types a "keyboard-shaped" device may declare.
const KEYBOARD_EVENT_TYPES: &[EventType] = &[
    EventType::SYNCHRONIZATION,
    EventType::KEY,
    EventType::MISC,
    EventType::LED,
    EventType::REPEAT,
];

/// Which devices an engine takes over. Immutable once built.
#[derive(Debug, Clone)]
pub struct MatchRule {
    name: Regex,
    id: Regex,
    non_keyboards: bool,
}

impl MatchRule {
    /// Compile a rule. Both patterns are searched (unanchored); an empty
    /// pattern matches everything.
    pub fn new(name_pattern: &str, id_pattern: &str, non_keyboards: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            name: Regex::new(name_pattern)?,
            id: Regex::new(id_pattern)?,
            non_keyboards,
        })
    }

    /// Rule accepting every keyboard-shaped device.
    pub fn any_keyboard() -> Self {
        Self {
            name: Regex::new("").expect("empty pattern is valid"),
            id: Regex::new("").expect("empty pattern is valid"),
            non_keyboards: false,
        }
    }

    pub fn name_pattern(&self) -> &str {
        self.name.as_str()
    }

    pub fn id_pattern(&self) -> &str {
        self.id.as_str()
    }

    pub fn non_keyboards_allowed(&self) -> bool {
        self.non_keyboards
    }
}

impl Default for MatchRule {
    fn default() -> Self {
        Self::any_keyboard()
    }
}

/// Outcome of classifying one device against a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    /// Output of this engine, or of a newer instance racing on startup
    OwnOutput,
    NameMismatch,
    IdMismatch,
    /// Declares event types other than sync/key/misc/led/repeat, or no keys
    NotKeyboard,
}

impl fmt::Display for FilterVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FilterVerdict::Accept => "accepted",
            FilterVerdict::OwnOutput => "own output device",
            FilterVerdict::NameMismatch => "name does not match",
            FilterVerdict::IdMismatch => "identity does not match",
            FilterVerdict::NotKeyboard => "not keyboard-shaped",
        };
        f.write_str(reason)
    }
}

/// A device is keyboard-shaped when every event type it declares is one
/// of sync/key/misc/led/repeat and it declares key events.
///
/// Composite devices (mice, tablets) fail this check; grabbing them would
/// silently drop their pointer events.
pub fn is_keyboard_shaped(capabilities: &DeviceCapabilities) -> bool {
    capabilities.has_keys()
        && capabilities
            .event_types()
            .all(|t| KEYBOARD_EVENT_TYPES.contains(&t))
}

/// Check if a device name belongs to this engine's output device or to the
/// output of a newer instance.
///
/// Output names are `prefix + zero-padded timestamp + random`, so a newer
/// instance's name sorts after ours.
pub fn is_own_output(name: &str, own: &OutputDeviceName) -> bool {
    name.starts_with(own.prefix()) && name >= own.as_str()
}

/// Classify a device by name, identity string and capabilities.
pub fn classify_device(
    name: &str,
    identity: &str,
    capabilities: &DeviceCapabilities,
    rule: &MatchRule,
    own: &OutputDeviceName,
) -> FilterVerdict {
    if is_own_output(name, own) {
        return FilterVerdict::OwnOutput;
    }
    if !rule.name.is_match(name) {
        return FilterVerdict::NameMismatch;
    }
    if !rule.id.is_match(identity) {
        return FilterVerdict::IdMismatch;
    }
    if !rule.non_keyboards && !is_keyboard_shaped(capabilities) {
        return FilterVerdict::NotKeyboard;
    }
    FilterVerdict::Accept
}

/// Check if a device should be taken over by the engine.
pub fn matches_device_filter(device: &DeviceDescriptor, rule: &MatchRule, own: &OutputDeviceName) -> bool {
    classify_device(
        device.name(),
        &device.identity(),
        device.capabilities(),
        rule,
        own,
    ) == FilterVerdict::Accept
}
