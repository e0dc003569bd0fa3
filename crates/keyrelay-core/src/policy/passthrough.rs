// Keyrelay Remap Policies - Passthrough
// Forwards key events unchanged

use evdev::{EventType, InputEvent};

use super::{PolicyError, RemapPolicy};
use crate::input::DeviceDescriptor;
use crate::output::{is_marker, OutputSynchronizer};

/// Policy that forwards every key event as read, keeping report boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughPolicy;

/// Key events and SYN_REPORT markers of a raw batch.
pub(crate) fn key_events(events: &[InputEvent]) -> Vec<InputEvent> {
    events
        .iter()
        .filter(|e| e.event_type() == EventType::KEY || is_marker(e))
        .copied()
        .collect()
}

impl RemapPolicy for PassthroughPolicy {
    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        _device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        output.write(&key_events(events))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{descriptor, key, recording_output, SYN};

    #[test]
    fn test_forwards_keys_and_drops_scan_codes() {
        let (output, sink) = recording_output();
        let device = descriptor("Keyboard");
        let batch = [
            InputEvent::new(EventType::MISC, 4, 0x70004),
            key(30, 1),
            InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
            InputEvent::new(EventType::MISC, 4, 0x70004),
            key(30, 0),
            InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
        ];

        PassthroughPolicy.on_events(&output, &device, &batch).unwrap();
        assert_eq!(sink.take(), vec![(1, 30, 1), SYN, (1, 30, 0), SYN]);
    }
}
