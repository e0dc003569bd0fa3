// Keyrelay Input Layer - Device Descriptors
// Capability sets, identity strings and the open device handle abstraction

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use evdev::{EventType, InputEvent};

/// Event categories a device declares it can emit (EV_* type codes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    event_types: BTreeSet<u16>,
}

impl DeviceCapabilities {
    pub fn new<I: IntoIterator<Item = EventType>>(types: I) -> Self {
        Self {
            event_types: types.into_iter().map(|t| t.0).collect(),
        }
    }

    /// Check if the device declares the given event type
    pub fn has(&self, event_type: EventType) -> bool {
        self.event_types.contains(&event_type.0)
    }

    /// Whether the device can emit EV_KEY events
    pub fn has_keys(&self) -> bool {
        self.has(EventType::KEY)
    }

    pub fn event_types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.event_types.iter().map(|t| EventType(*t))
    }

    pub fn is_empty(&self) -> bool {
        self.event_types.is_empty()
    }
}

impl fmt::Display for DeviceCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.event_types().map(|t| format!("{:?}", t)).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Vendor/product pair reported by the kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub vendor: u16,
    pub product: u16,
}

impl DeviceId {
    pub fn new(vendor: u16, product: u16) -> Self {
        Self { vendor, product }
    }

    /// Identity string matched by `MatchRule::id_pattern`, e.g. `v046d pc52b`.
    pub fn identity(&self) -> String {
        format!("v{:04x} p{:04x}", self.vendor, self.product)
    }
}

/// An open input node the engine can poll, read and grab.
///
/// Closing happens on drop.
pub trait InputDevice: Send {
    /// File descriptor used in the readiness wait
    fn raw_fd(&self) -> RawFd;

    /// Drain every queued event without blocking.
    ///
    /// Returns an empty batch when nothing is queued. Any error means the
    /// device is gone or unusable.
    fn fetch_events(&mut self) -> io::Result<Vec<InputEvent>>;

    fn grab(&mut self) -> io::Result<()>;

    fn ungrab(&mut self) -> io::Result<()>;
}

/// evdev opens nodes blocking; a wake-up must drain without stalling the loop.
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// `InputDevice` backed by an evdev character device.
pub struct EvdevDevice {
    device: evdev::Device,
}

impl EvdevDevice {
    pub fn new(device: evdev::Device) -> Self {
        Self { device }
    }

    pub fn inner(&self) -> &evdev::Device {
        &self.device
    }
}

impl InputDevice for EvdevDevice {
    fn raw_fd(&self) -> RawFd {
        self.device.as_raw_fd()
    }

    fn fetch_events(&mut self) -> io::Result<Vec<InputEvent>> {
        match self.device.fetch_events() {
            Ok(events) => Ok(events.collect()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn grab(&mut self) -> io::Result<()> {
        self.device.grab()
    }

    fn ungrab(&mut self) -> io::Result<()> {
        self.device.ungrab()
    }
}

/// One open physical input source owned by the device registry.
pub struct DeviceDescriptor {
    path: PathBuf,
    name: String,
    id: DeviceId,
    capabilities: DeviceCapabilities,
    grabbed: bool,
    handle: Box<dyn InputDevice>,
}

impl DeviceDescriptor {
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        id: DeviceId,
        capabilities: DeviceCapabilities,
        handle: Box<dyn InputDevice>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            id,
            capabilities,
            grabbed: false,
            handle,
        }
    }

    /// Describe an evdev device opened at `path`, switching its fd to
    /// non-blocking reads.
    pub fn from_evdev(path: &Path, device: evdev::Device) -> io::Result<Self> {
        set_nonblocking(device.as_raw_fd())?;
        let name = device.name().unwrap_or("Unknown").to_string();
        let input_id = device.input_id();
        let id = DeviceId::new(input_id.vendor(), input_id.product());
        let capabilities = DeviceCapabilities::new(device.supported_events().iter());
        Ok(Self::new(path, name, id, capabilities, Box::new(EvdevDevice::new(device))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn identity(&self) -> String {
        self.id.identity()
    }

    pub fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    pub fn raw_fd(&self) -> RawFd {
        self.handle.raw_fd()
    }

    pub fn fetch_events(&mut self) -> io::Result<Vec<InputEvent>> {
        self.handle.fetch_events()
    }

    /// Take exclusive capture of the device.
    pub fn grab(&mut self) -> io::Result<()> {
        self.handle.grab()?;
        self.grabbed = true;
        Ok(())
    }

    /// Ungrab (if grabbed) and close. Failures are ignored: an unplugged
    /// device cannot be ungrabbed.
    pub fn release(mut self) {
        if self.grabbed {
            if let Err(e) = self.handle.ungrab() {
                log::debug!("Ungrab of {} failed: {}", self.path.display(), e);
            }
            self.grabbed = false;
        }
    }
}

impl fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("id", &self.id.identity())
            .field("capabilities", &self.capabilities)
            .field("grabbed", &self.grabbed)
            .finish()
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.path.display(), self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_lower_hex_padded() {
        assert_eq!(DeviceId::new(0x46d, 0xC52B).identity(), "v046d pc52b");
        assert_eq!(DeviceId::new(0, 1).identity(), "v0000 p0001");
    }

    #[test]
    fn test_capabilities_has() {
        let caps = DeviceCapabilities::new([EventType::SYNCHRONIZATION, EventType::KEY]);
        assert!(caps.has_keys());
        assert!(caps.has(EventType::SYNCHRONIZATION));
        assert!(!caps.has(EventType::RELATIVE));
        assert_eq!(caps.event_types().count(), 2);
    }

    #[test]
    fn test_set_nonblocking_makes_empty_read_return() {
        use std::io::Read;
        use std::os::unix::net::UnixStream;

        let (mut reader, _writer) = UnixStream::pair().unwrap();
        set_nonblocking(reader.as_raw_fd()).unwrap();

        let flags = unsafe { libc::fcntl(reader.as_raw_fd(), libc::F_GETFL) };
        assert_ne!(flags & libc::O_NONBLOCK, 0);
        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_set_nonblocking_bad_fd_is_error() {
        assert!(set_nonblocking(-1).is_err());
    }

    #[test]
    fn test_capabilities_deduplicate() {
        let caps = DeviceCapabilities::new([EventType::KEY, EventType::KEY]);
        assert_eq!(caps.event_types().count(), 1);
        assert!(!caps.is_empty());
        assert!(DeviceCapabilities::default().is_empty());
    }
}
