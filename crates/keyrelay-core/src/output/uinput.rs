// Keyrelay uinput Output Layer
// Virtual device creation and the sink abstraction the synchronizer writes to

use std::io;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, InputEvent, Key, RelativeAxisType};

use super::name::OutputDeviceName;

/// Error types for output operations
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreation(#[source] io::Error),

    #[error("Failed to write event: {0}")]
    Write(#[from] io::Error),

    #[error("Output device already closed")]
    Closed,
}

/// Destination of synthesized events.
pub trait OutputSink: Send {
    /// Write `events` in order, followed by exactly one SYN_REPORT.
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()>;
}

/// `VirtualDevice::emit` already terminates each batch with SYN_REPORT.
impl OutputSink for VirtualDevice {
    fn emit(&mut self, events: &[InputEvent]) -> io::Result<()> {
        VirtualDevice::emit(self, events)
    }
}

/// Sink for engines configured without an output device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn emit(&mut self, _events: &[InputEvent]) -> io::Result<()> {
        Ok(())
    }
}

/// Event codes the virtual device declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCapabilities {
    pub keys: Vec<u16>,
    pub relative_axes: Vec<u16>,
}

impl Default for OutputCapabilities {
    /// All standard keyboard keys (0-255), no relative axes
    fn default() -> Self {
        Self {
            keys: (0..256u16).collect(),
            relative_axes: Vec::new(),
        }
    }
}

/// Create the synthetic output device.
pub fn create_virtual_device(
    name: &OutputDeviceName,
    capabilities: &OutputCapabilities,
) -> Result<VirtualDevice, OutputError> {
    let mut keys = AttributeSet::<Key>::new();
    for code in &capabilities.keys {
        keys.insert(Key::new(*code));
    }

    let mut builder = VirtualDeviceBuilder::new()
        .map_err(OutputError::DeviceCreation)?
        .name(name.as_str())
        .with_keys(&keys)
        .map_err(OutputError::DeviceCreation)?;

    if !capabilities.relative_axes.is_empty() {
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        for code in &capabilities.relative_axes {
            axes.insert(RelativeAxisType(*code));
        }
        builder = builder
            .with_relative_axes(&axes)
            .map_err(OutputError::DeviceCreation)?;
    }

    let device = builder.build().map_err(OutputError::DeviceCreation)?;
    log::info!("Output device created: {}", name);
    Ok(device)
}
