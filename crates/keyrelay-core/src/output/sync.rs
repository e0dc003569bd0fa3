// Keyrelay Output Synchronizer
// Serialized writes, key-state deduplication and SYN_REPORT discipline

use evdev::{EventType, InputEvent};
use parking_lot::Mutex;

use super::state::{transition_allowed, KeyStateTable};
use super::uinput::{NullSink, OutputError, OutputSink};
use crate::{Action, Modifiers};

const SYN_REPORT: u16 = 0;

/// Check if an event is a SYN_REPORT marker
pub fn is_marker(event: &InputEvent) -> bool {
    event.event_type() == EventType::SYNCHRONIZATION && event.code() == SYN_REPORT && event.value() == 0
}

struct SyncState {
    /// `None` once closed
    sink: Option<Box<dyn OutputSink>>,
    /// Values actually written to the sink
    output: KeyStateTable,
    /// Last value observed from any input device
    input: KeyStateTable,
}

/// Owner of the output sink, safe to share between the main loop and
/// policy timer threads.
///
/// Every operation takes the same lock, so a `write` or `reset` is atomic
/// with respect to all other callers.
pub struct OutputSynchronizer {
    state: Mutex<SyncState>,
}

impl OutputSynchronizer {
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            state: Mutex::new(SyncState {
                sink: Some(sink),
                output: KeyStateTable::new(),
                input: KeyStateTable::new(),
            }),
        }
    }

    /// Synchronizer that tracks state but discards output.
    pub fn detached() -> Self {
        Self::new(Box::new(NullSink))
    }

    /// Forward one logical action.
    ///
    /// Key events that would not change the output state are dropped, as are
    /// key events with values other than 0/1/2. SYN_REPORT markers in
    /// `events` split the batch into reports; a marker with nothing before it
    /// is dropped. Every report that is written ends with exactly one marker.
    ///
    /// Returns the number of non-marker events written.
    pub fn write(&self, events: &[InputEvent]) -> Result<usize, OutputError> {
        write_locked(&mut self.state.lock(), events)
    }

    /// Release every key still pressed on the output, then forget them.
    ///
    /// Returns the number of releases emitted. Write errors are logged and
    /// the table is cleared regardless.
    pub fn reset(&self) -> usize {
        reset_locked(&mut self.state.lock())
    }

    /// Release pressed keys and drop the sink. Later writes fail with
    /// `OutputError::Closed`.
    pub fn close(&self) {
        let mut guard = self.state.lock();
        reset_locked(&mut guard);
        if guard.sink.take().is_some() {
            log::debug!("Output device closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().sink.is_none()
    }

    /// Last value written for `code`
    pub fn key_state(&self, code: u16) -> Action {
        self.state.lock().output.get(code)
    }

    /// Codes currently pressed on the output
    pub fn pressed_output_keys(&self) -> Vec<u16> {
        self.state.lock().output.pressed_codes()
    }

    /// Record raw input events in the aggregate input table.
    pub fn observe(&self, events: &[InputEvent]) {
        let mut guard = self.state.lock();
        for event in events {
            if let Some(action) = Action::of_event(event) {
                guard.input.set(event.code(), action);
            }
        }
    }

    /// Last value seen for `code` from any input device
    pub fn input_state(&self, code: u16) -> Action {
        self.state.lock().input.get(code)
    }

    pub fn is_input_pressed(&self, code: u16) -> bool {
        self.state.lock().input.is_pressed(code)
    }

    /// Modifiers currently held on the input side
    pub fn input_modifiers(&self) -> Modifiers {
        Modifiers::held_in(&self.state.lock().input)
    }

    /// Press and release `code`.
    pub fn tap(&self, code: u16) -> Result<usize, OutputError> {
        self.write(&[Action::Press.key_event(code), Action::Release.key_event(code)])
    }

    /// Write each `(code, action)` pair as its own report.
    pub fn send_keys(&self, keys: &[(u16, Action)]) -> Result<usize, OutputError> {
        self.write(&reports(keys))
    }

    /// Release everything on the output, then tap `code` with `modifiers`
    /// held. Modifiers are pressed alt, ctrl, shift, win and released in
    /// reverse order. Nothing from other threads interleaves.
    pub fn press_with_modifiers(&self, code: u16, modifiers: Modifiers) -> Result<usize, OutputError> {
        let mods = modifiers.press_order();
        let mut keys: Vec<(u16, Action)> = mods.iter().map(|m| (*m, Action::Press)).collect();
        keys.push((code, Action::Press));
        keys.push((code, Action::Release));
        keys.extend(mods.iter().rev().map(|m| (*m, Action::Release)));

        let mut guard = self.state.lock();
        reset_locked(&mut guard);
        write_locked(&mut guard, &reports(&keys))
    }
}

fn syn_report() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, SYN_REPORT, 0)
}

fn reports(keys: &[(u16, Action)]) -> Vec<InputEvent> {
    let mut events = Vec::with_capacity(keys.len() * 2);
    for (code, action) in keys {
        events.push(action.key_event(*code));
        events.push(syn_report());
    }
    events
}

fn write_locked(state: &mut SyncState, events: &[InputEvent]) -> Result<usize, OutputError> {
    let SyncState { sink, output, .. } = state;
    let sink = sink.as_mut().ok_or(OutputError::Closed)?;

    let mut report: Vec<InputEvent> = Vec::with_capacity(events.len());
    let mut staged: Vec<(u16, Action)> = Vec::new();
    let mut written = 0;

    for event in events {
        if is_marker(event) {
            written += flush(sink.as_mut(), output, &mut report, &mut staged)?;
            continue;
        }

        if event.event_type() == EventType::KEY {
            let Some(action) = Action::from_i32(event.value()) else {
                log::debug!("Dropping key event with invalid value {}", event.value());
                continue;
            };
            let code = event.code();
            let current = staged
                .iter()
                .rev()
                .find(|(c, _)| *c == code)
                .map(|(_, a)| *a)
                .unwrap_or_else(|| output.get(code));
            if !transition_allowed(current, action) {
                continue;
            }
            staged.push((code, action));
        }

        report.push(*event);
    }

    written += flush(sink.as_mut(), output, &mut report, &mut staged)?;
    Ok(written)
}

fn reset_locked(state: &mut SyncState) -> usize {
    let SyncState { sink, output, .. } = state;

    let pressed = output.pressed_codes();
    output.clear();

    let Some(sink) = sink.as_mut() else {
        return 0;
    };
    if pressed.is_empty() {
        return 0;
    }

    log::debug!("Releasing {} stuck output key(s): {:?}", pressed.len(), pressed);
    let releases: Vec<InputEvent> = pressed.iter().map(|code| Action::Release.key_event(*code)).collect();
    match sink.emit(&releases) {
        Ok(()) => releases.len(),
        Err(e) => {
            log::warn!("Failed to release output keys: {}", e);
            0
        }
    }
}

/// Emit the pending report and commit its staged key states.
fn flush(
    sink: &mut dyn OutputSink,
    output: &mut KeyStateTable,
    report: &mut Vec<InputEvent>,
    staged: &mut Vec<(u16, Action)>,
) -> Result<usize, OutputError> {
    if report.is_empty() {
        return Ok(0);
    }
    let count = report.len();
    let result = sink.emit(report);
    report.clear();
    let staged_now = std::mem::take(staged);
    result?;
    for (code, action) in staged_now {
        output.set(code, action);
    }
    Ok(count)
}
