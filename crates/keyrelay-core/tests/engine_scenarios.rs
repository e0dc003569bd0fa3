// Keyrelay Engine Scenarios
//
// Drive the real event loop with fake devices backed by socket pairs, so
// the poll(2) wait, device loss, hot-plug and shutdown paths all run as they
// would against /dev/input.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use evdev::{EventType, InputEvent};
use parking_lot::Mutex;

use keyrelay_core::policy::PassthroughPolicy;
use keyrelay_core::{
    DeviceCapabilities, DeviceDescriptor, DeviceId, DeviceRegistry, DeviceSource, EngineError, EventLoop,
    HotplugError, HotplugSignal, InputDevice, MatchRule, OutputDeviceName, OutputSink, OutputSynchronizer,
    PolicyError, RegistryError, RemapPolicy, Shutdown,
};

// =========================================================================
// Fakes
// =========================================================================

type Log = Arc<Mutex<Vec<String>>>;
type Script = Arc<Mutex<VecDeque<io::Result<Vec<InputEvent>>>>>;

/// One plugged-in device: the test pushes batches and wakes the engine.
#[derive(Clone)]
struct Plug {
    path: PathBuf,
    name: String,
    script: Script,
    writer: Arc<Mutex<UnixStream>>,
    reader: Arc<Mutex<UnixStream>>,
}

impl Plug {
    fn new(node: &str, name: &str) -> Self {
        let (reader, writer) = UnixStream::pair().unwrap();
        reader.set_nonblocking(true).unwrap();
        Self {
            path: PathBuf::from(format!("/dev/input/{}", node)),
            name: name.to_string(),
            script: Arc::default(),
            writer: Arc::new(Mutex::new(writer)),
            reader: Arc::new(Mutex::new(reader)),
        }
    }

    fn send(&self, batch: io::Result<Vec<InputEvent>>) {
        self.script.lock().push_back(batch);
        self.writer.lock().write_all(&[1]).unwrap();
    }
}

struct FakeDevice {
    plug: Plug,
    log: Log,
}

impl InputDevice for FakeDevice {
    fn raw_fd(&self) -> RawFd {
        self.plug.reader.lock().as_raw_fd()
    }

    fn fetch_events(&mut self) -> io::Result<Vec<InputEvent>> {
        let mut byte = [0u8; 1];
        match self.plug.reader.lock().read(&mut byte) {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }
        self.plug.script.lock().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn grab(&mut self) -> io::Result<()> {
        self.log.lock().push(format!("grab {}", self.plug.path.display()));
        Ok(())
    }

    fn ungrab(&mut self) -> io::Result<()> {
        self.log.lock().push(format!("ungrab {}", self.plug.path.display()));
        Ok(())
    }
}

/// Source listing whatever is currently plugged in.
struct FakeSource {
    plugged: Arc<Mutex<Vec<Plug>>>,
    log: Log,
    scans: Arc<Mutex<usize>>,
}

impl DeviceSource for FakeSource {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, RegistryError> {
        *self.scans.lock() += 1;
        Ok(self
            .plugged
            .lock()
            .iter()
            .map(|plug| {
                DeviceDescriptor::new(
                    plug.path.clone(),
                    plug.name.clone(),
                    DeviceId::new(0x046d, 0xc52b),
                    DeviceCapabilities::new([EventType::SYNCHRONIZATION, EventType::KEY]),
                    Box::new(FakeDevice {
                        plug: plug.clone(),
                        log: self.log.clone(),
                    }),
                )
            })
            .collect())
    }
}

/// Key events written to the output, as `(code, value)`
#[derive(Clone, Default)]
struct KeySink(Arc<Mutex<Vec<(u16, i32)>>>);

impl OutputSink for KeySink {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        self.0.lock().extend(
            events
                .iter()
                .filter(|e| e.event_type() == EventType::KEY)
                .map(|e| (e.code(), e.value())),
        );
        Ok(())
    }
}

/// Passthrough that also records lifecycle callbacks, optionally failing
/// on the n-th batch (counting from 1).
struct Recorder {
    inner: PassthroughPolicy,
    log: Log,
    batches: usize,
    fail_on_batch: Option<usize>,
}

impl RemapPolicy for Recorder {
    fn on_devices_found(&mut self, devices: &[DeviceDescriptor]) {
        self.log.lock().push(format!("found {}", devices.len()));
    }

    fn on_no_device_found(&mut self) {
        self.log.lock().push("none".to_string());
    }

    fn on_device_lost(&mut self, device: &DeviceDescriptor, _error: &io::Error) {
        self.log.lock().push(format!("lost {}", device.name()));
    }

    fn on_events(
        &mut self,
        output: &OutputSynchronizer,
        device: &DeviceDescriptor,
        events: &[InputEvent],
    ) -> Result<(), PolicyError> {
        self.batches += 1;
        if self.fail_on_batch == Some(self.batches) {
            return Err(PolicyError::Failed(format!("cannot handle batch {}", self.batches)));
        }
        self.inner.on_events(output, device, events)
    }

    fn on_fatal(&mut self, error: &EngineError) {
        self.log.lock().push(format!("fatal {}", error));
    }

    fn on_stop(&mut self) {
        self.log.lock().push("stop".to_string());
    }
}

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    plugged: Arc<Mutex<Vec<Plug>>>,
    grabs: Log,
    calls: Log,
    scans: Arc<Mutex<usize>>,
    output: KeySink,
    hotplug: HotplugSignal,
    shutdown: Shutdown,
}

impl Harness {
    fn new(plugs: Vec<Plug>) -> Self {
        Self {
            plugged: Arc::new(Mutex::new(plugs)),
            grabs: Log::default(),
            calls: Log::default(),
            scans: Arc::default(),
            output: KeySink::default(),
            hotplug: HotplugSignal::new().unwrap(),
            shutdown: Shutdown::new().unwrap(),
        }
    }

    fn start(&self, debounce: Duration) -> JoinHandle<Result<(), EngineError>> {
        self.start_failing(debounce, None)
    }

    fn start_failing(
        &self,
        debounce: Duration,
        fail_on_batch: Option<usize>,
    ) -> JoinHandle<Result<(), EngineError>> {
        let source = FakeSource {
            plugged: self.plugged.clone(),
            log: self.grabs.clone(),
            scans: self.scans.clone(),
        };
        let own = OutputDeviceName::generate("keyrelay-scenario-");
        let registry = DeviceRegistry::new(source, MatchRule::any_keyboard(), own, true);
        let output = Arc::new(OutputSynchronizer::new(Box::new(self.output.clone())));
        let policy = Recorder {
            inner: PassthroughPolicy,
            log: self.calls.clone(),
            batches: 0,
            fail_on_batch,
        };
        let mut engine = EventLoop::new(registry, output, policy, self.hotplug.clone(), self.shutdown.clone())
            .with_debounce(debounce..=debounce);
        thread::spawn(move || engine.run())
    }

    fn keys(&self) -> Vec<(u16, i32)> {
        self.output.0.lock().clone()
    }

    fn grabs(&self) -> Vec<String> {
        self.grabs.lock().clone()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn scans(&self) -> usize {
        *self.scans.lock()
    }
}

fn key(code: u16, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, code, value)
}

fn syn() -> InputEvent {
    InputEvent::new(EventType::SYNCHRONIZATION, 0, 0)
}

fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn device_loss_releases_keys_and_keeps_other_devices() {
    let a = Plug::new("event1", "Keyboard A");
    let b = Plug::new("event2", "Keyboard B");
    let harness = Harness::new(vec![a.clone(), b.clone()]);
    let engine = harness.start(Duration::ZERO);

    wait_until("initial scan", || harness.calls() == vec!["found 2"]);

    a.send(Ok(vec![key(30, 1), syn()]));
    wait_until("press forwarded", || harness.keys() == vec![(30, 1)]);

    // A is unplugged while KEY_A is still held
    harness.plugged.lock().retain(|p| p.name != "Keyboard A");
    a.send(Err(io::Error::from_raw_os_error(19)));
    wait_until("rescan after loss", || harness.scans() == 2);
    assert_eq!(harness.keys(), vec![(30, 1), (30, 0)]);

    b.send(Ok(vec![key(48, 1), syn(), key(48, 0), syn()]));
    wait_until("B still delivered", || harness.keys().len() == 4);

    harness.shutdown.trigger();
    engine.join().unwrap().unwrap();

    assert_eq!(harness.keys(), vec![(30, 1), (30, 0), (48, 1), (48, 0)]);
    assert_eq!(
        harness.grabs(),
        vec![
            "grab /dev/input/event1",
            "grab /dev/input/event2",
            "ungrab /dev/input/event1",
            "ungrab /dev/input/event2",
        ]
    );
    assert_eq!(harness.calls(), vec!["found 2", "lost Keyboard A", "found 1", "stop"]);
}

#[test]
fn hotplug_burst_triggers_one_rescan() {
    let a = Plug::new("event4", "Keyboard A");
    let harness = Harness::new(vec![a.clone()]);
    let engine = harness.start(Duration::from_millis(200));

    wait_until("initial scan", || harness.scans() == 1);

    harness.hotplug.notify();
    harness.hotplug.notify();
    wait_until("rescan", || harness.scans() == 2);
    thread::sleep(Duration::from_millis(400));
    assert_eq!(harness.scans(), 2);

    // The rescan started from nothing, so A was released and grabbed again
    assert_eq!(
        harness.grabs(),
        vec!["grab /dev/input/event4", "ungrab /dev/input/event4", "grab /dev/input/event4"]
    );

    a.send(Ok(vec![key(2, 1), syn()]));
    wait_until("event after rescan", || harness.keys() == vec![(2, 1)]);

    harness.shutdown.trigger();
    engine.join().unwrap().unwrap();
    // Closing the output releases what is still held
    assert_eq!(harness.keys(), vec![(2, 1), (2, 0)]);
}

#[test]
fn waits_for_hotplug_when_nothing_matches() {
    let harness = Harness::new(Vec::new());
    let engine = harness.start(Duration::ZERO);

    wait_until("empty scan", || harness.calls() == vec!["none"]);

    let late = Plug::new("event7", "Late Keyboard");
    harness.plugged.lock().push(late.clone());
    harness.hotplug.notify();
    wait_until("device found", || harness.calls() == vec!["none", "found 1"]);

    late.send(Ok(vec![key(57, 1), syn(), key(57, 0), syn()]));
    wait_until("events forwarded", || harness.keys() == vec![(57, 1), (57, 0)]);

    harness.shutdown.trigger();
    engine.join().unwrap().unwrap();
    assert_eq!(harness.grabs(), vec!["grab /dev/input/event7", "ungrab /dev/input/event7"]);
}

#[test]
fn hotplug_failure_is_fatal_and_releases_devices() {
    let a = Plug::new("event9", "Keyboard A");
    let harness = Harness::new(vec![a]);
    let engine = harness.start(Duration::ZERO);

    wait_until("initial scan", || harness.scans() == 1);
    harness.hotplug.fail(HotplugError::Unsupported);

    let result = engine.join().unwrap();
    assert!(matches!(result, Err(EngineError::Hotplug(HotplugError::Unsupported))));
    assert_eq!(harness.grabs(), vec!["grab /dev/input/event9", "ungrab /dev/input/event9"]);
    assert!(!harness.calls().contains(&"stop".to_string()));
}

#[test]
fn policy_error_while_dispatching_is_fatal() {
    let a = Plug::new("event1", "Keyboard A");
    let b = Plug::new("event2", "Keyboard B");
    let harness = Harness::new(vec![a.clone(), b]);
    let engine = harness.start_failing(Duration::ZERO, Some(2));

    wait_until("initial scan", || harness.calls() == vec!["found 2"]);

    a.send(Ok(vec![key(30, 1), syn()]));
    wait_until("press forwarded", || harness.keys() == vec![(30, 1)]);

    a.send(Ok(vec![key(31, 1), syn()]));
    let result = engine.join().unwrap();

    assert!(matches!(result, Err(EngineError::Policy(PolicyError::Failed(_)))));
    // The held key is released when the output closes
    assert_eq!(harness.keys(), vec![(30, 1), (30, 0)]);
    assert_eq!(
        harness.grabs(),
        vec![
            "grab /dev/input/event1",
            "grab /dev/input/event2",
            "ungrab /dev/input/event1",
            "ungrab /dev/input/event2",
        ]
    );
    let calls = harness.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].starts_with("fatal "));
    assert!(!calls.contains(&"stop".to_string()));
}
