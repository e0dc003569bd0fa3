// Shared fixtures for unit tests

use std::io;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use evdev::{EventType, InputEvent};
use parking_lot::Mutex;

use crate::input::{DeviceCapabilities, DeviceDescriptor, DeviceId, InputDevice};
use crate::output::{OutputSink, OutputSynchronizer};

/// SYN_REPORT as recorded by `RecordingSink`
pub const SYN: (u16, u16, i32) = (0, 0, 0);

/// Sink recording `(type, code, value)` triples, with SYN_REPORT appended
/// after every batch like a real uinput device.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<(u16, u16, i32)>>>,
    pub fail: Arc<Mutex<bool>>,
}

impl RecordingSink {
    pub fn take(&self) -> Vec<(u16, u16, i32)> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Only the key events, as `(code, value)`
    pub fn take_keys(&self) -> Vec<(u16, i32)> {
        self.take()
            .into_iter()
            .filter(|e| e.0 == EventType::KEY.0)
            .map(|e| (e.1, e.2))
            .collect()
    }
}

impl OutputSink for RecordingSink {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        if *self.fail.lock() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "uinput gone"));
        }
        let mut log = self.events.lock();
        for e in events {
            log.push((e.event_type().0, e.code(), e.value()));
        }
        log.push(SYN);
        Ok(())
    }
}

pub fn recording_output() -> (Arc<OutputSynchronizer>, RecordingSink) {
    let sink = RecordingSink::default();
    (Arc::new(OutputSynchronizer::new(Box::new(sink.clone()))), sink)
}

/// Device handle that is never polled.
pub struct IdleDevice;

impl InputDevice for IdleDevice {
    fn raw_fd(&self) -> RawFd {
        -1
    }

    fn fetch_events(&mut self) -> io::Result<Vec<InputEvent>> {
        Ok(Vec::new())
    }

    fn grab(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn ungrab(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn descriptor(name: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(
        format!("/dev/input/{}", name.replace(' ', "_")),
        name,
        DeviceId::new(1, 1),
        DeviceCapabilities::new([EventType::SYNCHRONIZATION, EventType::KEY]),
        Box::new(IdleDevice),
    )
}

pub fn key(code: u16, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, code, value)
}
