// Keyrelay Key Action
// Value carried by an EV_KEY event: up, down or auto-repeat

use std::fmt;

use evdev::{EventType, InputEvent};

/// Kernel value of a key event (see `evtest`): 0 up, 1 down, 2 auto-repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum Action {
    Release = 0,
    Press = 1,
    Repeat = 2,
}

impl Action {
    /// Down, whether first press or auto-repeat
    pub fn is_pressed(self) -> bool {
        self != Action::Release
    }

    pub fn is_released(self) -> bool {
        self == Action::Release
    }

    pub fn is_repeat(self) -> bool {
        self == Action::Repeat
    }

    /// `None` for values the kernel never puts in a key event.
    pub fn from_i32(value: i32) -> Option<Self> {
        [Action::Release, Action::Press, Action::Repeat]
            .into_iter()
            .find(|action| *action as i32 == value)
    }

    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Action of a key event, `None` for other event types or unknown values.
    pub fn of_event(event: &InputEvent) -> Option<Self> {
        (event.event_type() == EventType::KEY)
            .then(|| Self::from_i32(event.value()))
            .flatten()
    }

    /// `EV_KEY` event for `code` carrying this action.
    pub fn key_event(self, code: u16) -> InputEvent {
        InputEvent::new(EventType::KEY, code, self.to_i32())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Release => "up",
            Action::Press => "down",
            Action::Repeat => "repeat",
        })
    }
}
