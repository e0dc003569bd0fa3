// Keyrelay Remap Policies - Push to Talk
// Turns press and release of one key into mute toggles

use evdev::{EventType, InputEvent, Key};

use super::{PolicyError, RemapPolicy};
use crate::input::DeviceDescriptor;
use crate::output::OutputSynchronizer;
use crate::Action;

/// Default toggle key, bound to microphone mute by the desktop
pub const DEFAULT_TOGGLE_KEY: Key = Key::KEY_F20;

/// Each press and each release of `trigger` taps `toggle` once, so holding
/// the trigger unmutes and letting go mutes again. Other keys pass through.
#[derive(Debug, Clone)]
pub struct PushToTalkPolicy {
    trigger: u16,
    toggle: u16,
    last: Action,
}

impl PushToTalkPolicy {
    pub fn new(trigger: u16) -> Self {
        Self {
            trigger,
            toggle: DEFAULT_TOGGLE_KEY.code(),
            last: Action::Release,
        }
    }

    pub fn with_toggle_key(mut self, toggle: u16) -> Self {
        self.toggle = toggle;
        self
    }

    pub fn trigger(&self) -> u16 {
        self.trigger
    }
}

impl RemapPolicy for PushToTalkPolicy {
    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        _device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        for event in events.iter().filter(|e| e.event_type() == EventType::KEY) {
            let Some(action) = Action::from_i32(event.value()) else {
                continue;
            };

            if event.code() != self.trigger {
                output.write(&[*event])?;
                continue;
            }

            if action.is_repeat() || action == self.last {
                continue;
            }
            self.last = action;
            log::debug!("Push-to-talk {}", if action.is_pressed() { "on" } else { "off" });
            output.send_keys(&[(self.toggle, Action::Press), (self.toggle, Action::Release)])?;
        }
        Ok(())
    }
}
