// Keyrelay Input Layer - Device Registry
// Enumerates, grabs and releases the devices the engine reads from

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::device::DeviceDescriptor;
use super::filter::{classify_device, FilterVerdict, MatchRule};
use crate::output::OutputDeviceName;

/// Default directory holding evdev nodes
pub const INPUT_DIR: &str = "/dev/input";

/// Errors that end a scan as a whole
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Cannot enumerate input devices in {dir}: {source}")]
    Enumerate {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Something that can list and open input device nodes.
pub trait DeviceSource {
    /// Open every input node currently present, ordered by path.
    ///
    /// Nodes that fail to open are skipped; only a failure to list them at
    /// all is an error.
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, RegistryError>;
}

/// `DeviceSource` reading `/dev/input/event*` through evdev.
#[derive(Debug, Clone)]
pub struct EvdevSource {
    dir: PathBuf,
}

impl EvdevSource {
    pub fn new() -> Self {
        Self::with_dir(INPUT_DIR)
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn event_nodes(&self) -> Result<Vec<PathBuf>, RegistryError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| RegistryError::Enumerate {
            dir: self.dir.clone(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_event_node(path))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

impl Default for EvdevSource {
    fn default() -> Self {
        Self::new()
    }
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with("event"))
        .unwrap_or(false)
}

impl DeviceSource for EvdevSource {
    fn enumerate(&mut self) -> Result<Vec<DeviceDescriptor>, RegistryError> {
        let mut devices = Vec::new();
        for path in self.event_nodes()? {
            let opened = evdev::Device::open(&path).and_then(|device| DeviceDescriptor::from_evdev(&path, device));
            match opened {
                Ok(device) => devices.push(device),
                Err(e) => log::debug!("Cannot open {}: {}", path.display(), e),
            }
        }
        Ok(devices)
    }
}

/// Owns every open device for its whole lifetime.
///
/// Only the main-loop thread touches the registry.
pub struct DeviceRegistry<S> {
    source: S,
    rule: MatchRule,
    own_output: OutputDeviceName,
    grab: bool,
    devices: Vec<DeviceDescriptor>,
}

impl<S: DeviceSource> DeviceRegistry<S> {
    pub fn new(source: S, rule: MatchRule, own_output: OutputDeviceName, grab: bool) -> Self {
        Self {
            source,
            rule,
            own_output,
            grab,
            devices: Vec::new(),
        }
    }

    /// Enumerate devices, keep the ones the rule accepts and grab them.
    ///
    /// Devices already held (same path) are kept as they are and not grabbed
    /// again. A device that cannot be grabbed is logged and left out.
    pub fn scan(&mut self) -> Result<&[DeviceDescriptor], RegistryError> {
        log::debug!("Detecting devices...");
        for mut device in self.source.enumerate()? {
            if self.devices.iter().any(|held| held.path() == device.path()) {
                continue;
            }

            let verdict = self.classify(&device);
            log::debug!(
                "Device: {} / {} caps={} -> {}",
                device.path().display(),
                device.name(),
                device.capabilities(),
                verdict
            );
            if verdict != FilterVerdict::Accept {
                continue;
            }

            if self.grab {
                if let Err(e) = device.grab() {
                    log::warn!("Unable to grab {}, skipping: {}", device.path().display(), e);
                    continue;
                }
            }

            log::info!("Using device: {}", device);
            self.devices.push(device);
        }

        self.devices.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(&self.devices)
    }

    /// Devices the rule would accept, opened but not grabbed nor kept.
    pub fn list_matching(&mut self) -> Result<Vec<DeviceDescriptor>, RegistryError> {
        let candidates = self.source.enumerate()?;
        Ok(candidates
            .into_iter()
            .filter(|device| self.classify(device) == FilterVerdict::Accept)
            .collect())
    }

    fn classify(&self, device: &DeviceDescriptor) -> FilterVerdict {
        classify_device(
            device.name(),
            &device.identity(),
            device.capabilities(),
            &self.rule,
            &self.own_output,
        )
    }

    /// Ungrab and close one device.
    pub fn release(&mut self, index: usize) {
        if index < self.devices.len() {
            let device = self.devices.remove(index);
            log::info!("Releasing device: {}", device);
            device.release();
        }
    }

    /// Ungrab and close every device. Errors are swallowed.
    pub fn release_all(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        log::debug!("Releasing devices...");
        for device in self.devices.drain(..) {
            log::info!("Releasing device: {}", device);
            device.release();
        }
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    pub fn devices_mut(&mut self) -> &mut [DeviceDescriptor] {
        &mut self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn rule(&self) -> &MatchRule {
        &self.rule
    }

    pub fn own_output(&self) -> &OutputDeviceName {
        &self.own_output
    }
}

/// Devices must never stay grabbed after the registry is gone, otherwise
/// the keyboard is unusable until it is replugged.
impl<S> Drop for DeviceRegistry<S> {
    fn drop(&mut self) {
        for device in self.devices.drain(..) {
            device.release();
        }
    }
}
