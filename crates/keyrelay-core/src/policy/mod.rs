// Keyrelay Remap Policies
// The callback contract between the event loop and remapping logic

mod chord;
mod jog;
mod keymap;
mod passthrough;
mod push_to_talk;

use std::io;
use std::sync::Arc;

use evdev::InputEvent;

use crate::event::EngineError;
use crate::input::DeviceDescriptor;
use crate::output::{OutputError, OutputSynchronizer};

pub use chord::{ChordAction, ChordPolicy, ChordRule};
pub use jog::{repeat_interval, JogDialPolicy, WheelRepeater};
pub use keymap::KeymapPolicy;
pub use passthrough::PassthroughPolicy;
pub use push_to_talk::PushToTalkPolicy;

/// Errors a policy may raise. Any of them ends the engine.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("Output failed: {0}")]
    Output(#[from] OutputError),

    #[error("{0}")]
    Failed(String),
}

/// Outcome of evaluating one rule against one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep evaluating the remaining rules
    Continue,
    /// Output was produced; stop evaluating
    Handled,
    /// Drop the event without producing output
    Consumed,
}

impl Flow {
    /// Whether evaluation stops here
    pub fn stops(self) -> bool {
        self != Flow::Continue
    }
}

/// Remapping logic driven by the event loop.
///
/// Every callback runs on the main-loop thread. Policies that need timers
/// keep the synchronizer handed to `on_start` and spawn their own threads,
/// which must only ever talk to that synchronizer.
pub trait RemapPolicy: Send {
    /// Called once before the first device scan.
    fn on_start(&mut self, _output: &Arc<OutputSynchronizer>) -> Result<(), PolicyError> {
        Ok(())
    }

    /// A scan produced at least one device.
    fn on_devices_found(&mut self, _devices: &[DeviceDescriptor]) {}

    /// A scan produced no device. The loop keeps waiting for hot-plug.
    fn on_no_device_found(&mut self) {}

    /// Reading `device` failed; it is about to be released.
    fn on_device_lost(&mut self, _device: &DeviceDescriptor, _error: &io::Error) {}

    /// A batch of raw events read from one device, in kernel order.
    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError>;

    /// The engine is terminating because of `error`.
    fn on_fatal(&mut self, _error: &EngineError) {}

    /// Clean shutdown, after devices and output were released.
    fn on_stop(&mut self) {}
}

impl<P: RemapPolicy + ?Sized> RemapPolicy for Box<P> {
    fn on_start(&mut self, output: &Arc<OutputSynchronizer>) -> Result<(), PolicyError> {
        (**self).on_start(output)
    }

    fn on_devices_found(&mut self, devices: &[DeviceDescriptor]) {
        (**self).on_devices_found(devices)
    }

    fn on_no_device_found(&mut self) {
        (**self).on_no_device_found()
    }

    fn on_device_lost(&mut self, device: &DeviceDescriptor, error: &io::Error) {
        (**self).on_device_lost(device, error)
    }

    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        (**self).on_events(output, device, events)
    }

    fn on_fatal(&mut self, error: &EngineError) {
        (**self).on_fatal(error)
    }

    fn on_stop(&mut self) {
        (**self).on_stop()
    }
}
