// Keyrelay Notifications
// Reports device and lifecycle changes to the user around any remap policy

use std::io;
use std::sync::Arc;

use evdev::InputEvent;
use keyrelay_core::{DeviceDescriptor, EngineError, OutputSynchronizer, PolicyError, RemapPolicy};

/// Where user-facing notifications go.
pub trait NotificationSink: Send {
    fn notify(&mut self, message: &str);
}

/// Notifications through the log at info level.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&mut self, message: &str) {
        log::info!("{}", message);
    }
}

/// Wraps a policy and announces device changes before delegating to it.
pub struct Notifier<P, N = LogSink> {
    inner: P,
    sink: N,
    quiet: bool,
}

impl<P: RemapPolicy> Notifier<P> {
    pub fn new(inner: P, quiet: bool) -> Self {
        Self::with_sink(inner, LogSink, quiet)
    }
}

impl<P: RemapPolicy, N: NotificationSink> Notifier<P, N> {
    pub fn with_sink(inner: P, sink: N, quiet: bool) -> Self {
        Self { inner, sink, quiet }
    }

    fn send(&mut self, message: &str) {
        if !self.quiet {
            self.sink.notify(message);
        }
    }
}

impl<P: RemapPolicy, N: NotificationSink> RemapPolicy for Notifier<P, N> {
    fn on_start(&mut self, output: &Arc<OutputSynchronizer>) -> Result<(), PolicyError> {
        self.inner.on_start(output)
    }

    fn on_devices_found(&mut self, devices: &[DeviceDescriptor]) {
        let names: Vec<&str> = devices.iter().map(DeviceDescriptor::name).collect();
        self.send(&format!("Device connected: {}", names.join(", ")));
        self.inner.on_devices_found(devices);
    }

    fn on_no_device_found(&mut self) {
        self.send("Device not found");
        self.inner.on_no_device_found();
    }

    fn on_device_lost(&mut self, device: &DeviceDescriptor, error: &io::Error) {
        self.send(&format!("Device lost: {}", device.name()));
        self.inner.on_device_lost(device, error);
    }

    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        self.inner.on_events(output, device, events)
    }

    fn on_fatal(&mut self, error: &EngineError) {
        self.send(&format!("Error: {}", error));
        self.inner.on_fatal(error);
    }

    fn on_stop(&mut self) {
        self.send("Closing...");
        self.inner.on_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::{DeviceCapabilities, DeviceId};
    use std::path::PathBuf;

    #[derive(Default)]
    struct Collect(Vec<String>);

    impl NotificationSink for Collect {
        fn notify(&mut self, message: &str) {
            self.0.push(message.to_string());
        }
    }

    #[derive(Default)]
    struct Counting {
        found: usize,
        stopped: bool,
    }

    impl RemapPolicy for Counting {
        fn on_devices_found(&mut self, devices: &[DeviceDescriptor]) {
            self.found += devices.len();
        }

        fn on_events(
            &mut self,
            _output: &OutputSynchronizer,
            _device: &DeviceDescriptor,
            _events: &[InputEvent],
        ) -> Result<(), PolicyError> {
            Ok(())
        }

        fn on_stop(&mut self) {
            self.stopped = true;
        }
    }

    fn descriptor(name: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(
            PathBuf::from("/dev/input/event3"),
            name.to_string(),
            DeviceId::new(0x05ac, 0x0220),
            DeviceCapabilities::new([evdev::EventType::KEY]),
            Box::new(NoDevice),
        )
    }

    struct NoDevice;

    impl keyrelay_core::InputDevice for NoDevice {
        fn raw_fd(&self) -> std::os::unix::io::RawFd {
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

    #[test]
    fn test_announces_and_delegates() {
        let mut notifier = Notifier::with_sink(Counting::default(), Collect::default(), false);
        notifier.on_devices_found(&[descriptor("Satechi Media Button")]);
        notifier.on_no_device_found();
        notifier.on_stop();

        assert_eq!(
            notifier.sink.0,
            vec!["Device connected: Satechi Media Button", "Device not found", "Closing..."]
        );
        assert_eq!(notifier.inner.found, 1);
        assert!(notifier.inner.stopped);
    }

    #[test]
    fn test_quiet_suppresses_messages() {
        let mut notifier = Notifier::with_sink(Counting::default(), Collect::default(), true);
        let device = descriptor("ShuttleXpress");
        notifier.on_devices_found(std::slice::from_ref(&device));
        notifier.on_device_lost(&device, &io::Error::from(io::ErrorKind::NotFound));
        assert!(notifier.sink.0.is_empty());
        assert_eq!(notifier.inner.found, 1);
    }
}
