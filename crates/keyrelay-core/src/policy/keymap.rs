// Keyrelay Remap Policies - Keymap
// Code-to-code translation table for media buttons and small keypads

use std::collections::HashMap;

use evdev::InputEvent;

use super::passthrough::key_events;
use super::{PolicyError, RemapPolicy};
use crate::input::DeviceDescriptor;
use crate::output::{is_marker, OutputSynchronizer};
use crate::Action;

/// Rewrites key codes through a table, keeping the key value.
#[derive(Debug, Clone, Default)]
pub struct KeymapPolicy {
    map: HashMap<u16, u16>,
    passthrough_unmapped: bool,
}

impl KeymapPolicy {
    pub fn new(map: HashMap<u16, u16>) -> Self {
        Self {
            map,
            passthrough_unmapped: false,
        }
    }

    /// Forward keys missing from the table instead of dropping them
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough_unmapped = passthrough;
        self
    }

    pub fn insert(&mut self, from: u16, to: u16) {
        self.map.insert(from, to);
    }

    /// Output code for `code`, if it is forwarded at all
    pub fn translate(&self, code: u16) -> Option<u16> {
        match self.map.get(&code) {
            Some(to) => Some(*to),
            None if self.passthrough_unmapped => Some(code),
            None => None,
        }
    }
}

impl RemapPolicy for KeymapPolicy {
    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        _device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        let mut mapped = Vec::with_capacity(events.len());
        for event in key_events(events) {
            if is_marker(&event) {
                mapped.push(event);
                continue;
            }
            let Some(action) = Action::from_i32(event.value()) else {
                continue;
            };
            match self.translate(event.code()) {
                Some(to) => mapped.push(action.key_event(to)),
                None => log::debug!("Unmapped key {}", event.code()),
            }
        }
        output.write(&mapped)?;
        Ok(())
    }
}
