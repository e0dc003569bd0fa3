// Keyrelay Remap Policies - Jog Dial
// Shuttle ring auto-repeat on a timer thread, dial steps and buttons

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use evdev::{EventType, InputEvent, Key, RelativeAxisType};

use super::{PolicyError, RemapPolicy};
use crate::input::DeviceDescriptor;
use crate::output::{OutputError, OutputSynchronizer};
use crate::Action;

/// Idle poll interval of the repeat thread
pub const WHEEL_POLL: Duration = Duration::from_millis(100);

/// Shuttle ring travel in each direction
pub const WHEEL_RANGE: i32 = 7;

/// Time between repeated taps for a shuttle position, `None` near center.
///
/// The interval is `0.8 / ((|p| - 1)^2 + 1)` seconds: 400 ms at |p| = 2
/// down to 22 ms at |p| = 7.
pub fn repeat_interval(position: i32) -> Option<Duration> {
    let magnitude = position.abs();
    if magnitude <= 1 {
        return None;
    }
    let count = f64::from(magnitude - 1);
    Some(Duration::from_secs_f64(0.8 / (count * count + 1.0)))
}

/// Timer thread tapping a direction key while the shuttle ring is turned.
///
/// The thread only ever writes through the synchronizer.
pub struct WheelRepeater {
    position: Arc<AtomicI32>,
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl WheelRepeater {
    /// Start repeating `keys.0` for negative positions and `keys.1` for
    /// positive ones.
    pub fn spawn(output: Arc<OutputSynchronizer>, keys: (u16, u16)) -> std::io::Result<Self> {
        let position = Arc::new(AtomicI32::new(0));
        let (stop, stopped) = mpsc::channel::<()>();
        let shared = Arc::clone(&position);

        let handle = thread::Builder::new()
            .name("keyrelay-wheel".to_string())
            .spawn(move || {
                let mut wait = WHEEL_POLL;
                loop {
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => return,
                    }

                    let current = shared.load(Ordering::Relaxed);
                    let Some(interval) = repeat_interval(current) else {
                        wait = WHEEL_POLL;
                        continue;
                    };
                    wait = interval;

                    let key = if current < 0 { keys.0 } else { keys.1 };
                    match output.tap(key) {
                        Ok(_) => {}
                        Err(OutputError::Closed) => return,
                        Err(e) => log::warn!("Wheel repeat failed: {}", e),
                    }
                }
            })?;

        Ok(Self {
            position,
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    pub fn set_position(&self, position: i32) {
        self.position
            .store(position.clamp(-WHEEL_RANGE, WHEEL_RANGE), Ordering::Relaxed);
    }

    pub fn position(&self) -> i32 {
        self.position.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it.
    pub fn stop(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Wheel repeat thread panicked");
            }
        }
    }
}

impl Drop for WheelRepeater {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Policy for shuttle/jog controllers (ShuttleXpress style).
///
/// `REL_WHEEL` reports the shuttle ring position, `REL_DIAL` an 8-bit jog
/// counter; buttons are translated through a key table.
pub struct JogDialPolicy {
    wheel_keys: (u16, u16),
    dial_keys: (u16, u16),
    buttons: HashMap<u16, u16>,
    last_dial: Option<i32>,
    repeater: Option<WheelRepeater>,
}

impl JogDialPolicy {
    pub fn new() -> Self {
        Self {
            wheel_keys: (Key::KEY_LEFT.code(), Key::KEY_RIGHT.code()),
            dial_keys: (Key::KEY_VOLUMEDOWN.code(), Key::KEY_VOLUMEUP.code()),
            buttons: HashMap::new(),
            last_dial: None,
            repeater: None,
        }
    }

    pub fn with_wheel_keys(mut self, back: u16, forward: u16) -> Self {
        self.wheel_keys = (back, forward);
        self
    }

    pub fn with_dial_keys(mut self, back: u16, forward: u16) -> Self {
        self.dial_keys = (back, forward);
        self
    }

    pub fn with_buttons(mut self, buttons: HashMap<u16, u16>) -> Self {
        self.buttons = buttons;
        self
    }

    /// Signed step between two jog counter readings, across the 8-bit wrap.
    fn dial_delta(previous: i32, current: i32) -> i32 {
        let raw = (current - previous).rem_euclid(256);
        if raw > 127 {
            raw - 256
        } else {
            raw
        }
    }

    fn handle_dial(&mut self, output: &OutputSynchronizer, value: i32) -> Result<(), PolicyError> {
        let previous = self.last_dial.replace(value);
        let Some(previous) = previous else {
            return Ok(());
        };
        let delta = Self::dial_delta(previous, value);
        let key = if delta < 0 { self.dial_keys.0 } else { self.dial_keys.1 };
        for _ in 0..delta.abs() {
            output.tap(key)?;
        }
        Ok(())
    }
}

impl Default for JogDialPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RemapPolicy for JogDialPolicy {
    fn on_start(&mut self, output: &Arc<OutputSynchronizer>) -> Result<(), PolicyError> {
        let repeater = WheelRepeater::spawn(Arc::clone(output), self.wheel_keys)
            .map_err(|e| PolicyError::Failed(format!("Cannot start wheel thread: {}", e)))?;
        self.repeater = Some(repeater);
        Ok(())
    }

    fn on_device_lost(&mut self, _device: &DeviceDescriptor, _error: &std::io::Error) {
        if let Some(repeater) = &self.repeater {
            repeater.set_position(0);
        }
        self.last_dial = None;
    }

    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        _device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        for event in events {
            match event.event_type() {
                EventType::RELATIVE if event.code() == RelativeAxisType::REL_WHEEL.0 => {
                    if let Some(repeater) = &self.repeater {
                        repeater.set_position(event.value());
                    }
                }
                EventType::RELATIVE if event.code() == RelativeAxisType::REL_DIAL.0 => {
                    self.handle_dial(output, event.value())?;
                }
                EventType::KEY => {
                    let (Some(to), Some(action)) =
                        (self.buttons.get(&event.code()), Action::from_i32(event.value()))
                    else {
                        continue;
                    };
                    output.write(&[action.key_event(*to)])?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn on_stop(&mut self) {
        if let Some(mut repeater) = self.repeater.take() {
            repeater.stop();
        }
    }
}
