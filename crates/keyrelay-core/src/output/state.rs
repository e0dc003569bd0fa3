// Keyrelay Key State Management
// Per-code logical key values with transition checks

use std::collections::HashMap;

use crate::Action;

/// Last known logical value per key code. Absent codes are released.
#[derive(Debug, Clone, Default)]
pub struct KeyStateTable {
    states: HashMap<u16, Action>,
}

impl KeyStateTable {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    /// Current value of a key code
    pub fn get(&self, code: u16) -> Action {
        self.states.get(&code).copied().unwrap_or(Action::Release)
    }

    pub fn set(&mut self, code: u16, action: Action) {
        if action.is_released() {
            self.states.remove(&code);
        } else {
            self.states.insert(code, action);
        }
    }

    /// Check if a key code is currently pressed (or auto-repeating)
    pub fn is_pressed(&self, code: u16) -> bool {
        self.get(code).is_pressed()
    }

    /// Whether moving `code` to `action` is a real transition.
    ///
    /// A press of a held key, a release of a released key and a repeat of a
    /// released key are all no-ops.
    pub fn is_transition(&self, code: u16, action: Action) -> bool {
        transition_allowed(self.get(code), action)
    }

    /// All pressed codes in ascending order
    pub fn pressed_codes(&self) -> Vec<u16> {
        let mut codes: Vec<u16> = self
            .states
            .iter()
            .filter(|(_, action)| action.is_pressed())
            .map(|(code, _)| *code)
            .collect();
        codes.sort_unstable();
        codes
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Number of keys not in the released state
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

pub(crate) fn transition_allowed(current: Action, next: Action) -> bool {
    match next {
        Action::Release => current.is_pressed(),
        Action::Press => current.is_released(),
        Action::Repeat => current.is_pressed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_defaults_to_released() {
        let table = KeyStateTable::new();
        assert_eq!(table.get(30), Action::Release);
        assert!(!table.is_pressed(30));
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_set_and_release() {
        let mut table = KeyStateTable::new();
        table.set(30, Action::Press);
        assert!(table.is_pressed(30));
        table.set(30, Action::Repeat);
        assert_eq!(table.get(30), Action::Repeat);
        table.set(30, Action::Release);
        assert!(!table.is_pressed(30));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_transitions() {
        let mut table = KeyStateTable::new();
        assert!(table.is_transition(30, Action::Press));
        assert!(!table.is_transition(30, Action::Release));
        assert!(!table.is_transition(30, Action::Repeat));

        table.set(30, Action::Press);
        assert!(!table.is_transition(30, Action::Press));
        assert!(table.is_transition(30, Action::Repeat));
        assert!(table.is_transition(30, Action::Release));

        table.set(30, Action::Repeat);
        assert!(!table.is_transition(30, Action::Press));
        assert!(table.is_transition(30, Action::Repeat));
    }

    #[test]
    fn test_pressed_codes_sorted() {
        let mut table = KeyStateTable::new();
        table.set(48, Action::Press);
        table.set(30, Action::Repeat);
        table.set(46, Action::Press);
        table.set(46, Action::Release);
        assert_eq!(table.pressed_codes(), vec![30, 48]);
    }

    #[test]
    fn test_clear() {
        let mut table = KeyStateTable::new();
        table.set(30, Action::Press);
        table.set(48, Action::Press);
        table.clear();
        assert!(table.is_empty());
        assert!(table.pressed_codes().is_empty());
    }
}
