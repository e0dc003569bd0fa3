// Keyrelay Remap Policies - Chords
// Ordered rules matching a key, its value and the held modifiers

use std::fmt;

use evdev::{EventType, InputEvent};

use super::{Flow, PolicyError, RemapPolicy};
use crate::input::DeviceDescriptor;
use crate::output::OutputSynchronizer;
use crate::{Action, Modifiers};

type Guard = Box<dyn Fn(&DeviceDescriptor, &OutputSynchronizer) -> bool + Send>;

/// What a matching rule does with the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChordAction {
    /// Change the event's code and keep evaluating
    Rename(u16),
    /// Release everything on the output, then tap `code` with `modifiers`
    Tap { code: u16, modifiers: Modifiers },
    /// Drop the event
    Swallow,
}

/// One chord rule.
///
/// By default a rule matches presses only and requires that no modifier is
/// held on the input side.
pub struct ChordRule {
    code: u16,
    values: Vec<Action>,
    modifiers: Option<Modifiers>,
    guard: Option<Guard>,
    action: ChordAction,
}

impl ChordRule {
    pub fn new(code: u16, action: ChordAction) -> Self {
        Self {
            code,
            values: vec![Action::Press],
            modifiers: Some(Modifiers::NONE),
            guard: None,
            action,
        }
    }

    pub fn on_values(mut self, values: &[Action]) -> Self {
        self.values = values.to_vec();
        self
    }

    /// Match every key value
    pub fn on_any_value(self) -> Self {
        self.on_values(&[Action::Release, Action::Press, Action::Repeat])
    }

    /// Require exactly these modifiers to be held
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = Some(modifiers);
        self
    }

    /// Match regardless of held modifiers
    pub fn any_modifiers(mut self) -> Self {
        self.modifiers = None;
        self
    }

    /// Extra condition checked after code, value and modifiers match.
    pub fn when<F>(mut self, guard: F) -> Self
    where
        F: Fn(&DeviceDescriptor, &OutputSynchronizer) -> bool + Send + 'static,
    {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn action(&self) -> ChordAction {
        self.action
    }

    fn matches(&self, device: &DeviceDescriptor, output: &OutputSynchronizer, code: u16, action: Action) -> bool {
        if code != self.code || !self.values.contains(&action) {
            return false;
        }
        if let Some(required) = self.modifiers {
            if output.input_modifiers() != required {
                return false;
            }
        }
        match &self.guard {
            Some(guard) => guard(device, output),
            None => true,
        }
    }

    /// Apply the rule to one key event, possibly renaming it in place.
    pub fn evaluate(
        &self,
        device: &DeviceDescriptor,
        output: &OutputSynchronizer,
        code: &mut u16,
        action: Action,
    ) -> Result<Flow, PolicyError> {
        if !self.matches(device, output, *code, action) {
            return Ok(Flow::Continue);
        }
        match self.action {
            ChordAction::Rename(to) => {
                *code = to;
                Ok(Flow::Continue)
            }
            ChordAction::Tap { code: to, modifiers } => {
                output.press_with_modifiers(to, modifiers)?;
                Ok(Flow::Handled)
            }
            ChordAction::Swallow => Ok(Flow::Consumed),
        }
    }
}

impl fmt::Debug for ChordRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChordRule")
            .field("code", &self.code)
            .field("values", &self.values)
            .field("modifiers", &self.modifiers)
            .field("guarded", &self.guard.is_some())
            .field("action", &self.action)
            .finish()
    }
}

/// Evaluates rules in order for every key event; events no rule stops are
/// forwarded with their (possibly renamed) code.
#[derive(Debug, Default)]
pub struct ChordPolicy {
    rules: Vec<ChordRule>,
}

impl ChordPolicy {
    pub fn new(rules: Vec<ChordRule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: ChordRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ChordRule] {
        &self.rules
    }

    fn handle_key(
        &self,
        output: &OutputSynchronizer,
        device: &DeviceDescriptor,
        mut code: u16,
        action: Action,
    ) -> Result<(), PolicyError> {
        for rule in &self.rules {
            let flow = rule.evaluate(device, output, &mut code, action)?;
            if flow.stops() {
                log::debug!("Key {} {} -> {:?}", code, action, flow);
                return Ok(());
            }
        }
        output.write(&[action.key_event(code)])?;
        Ok(())
    }
}

impl RemapPolicy for ChordPolicy {
    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        for event in events.iter().filter(|e| e.event_type() == EventType::KEY) {
            if let Some(action) = Action::from_i32(event.value()) {
                self.handle_key(output, device, event.code(), action)?;
            }
        }
        Ok(())
    }
}
