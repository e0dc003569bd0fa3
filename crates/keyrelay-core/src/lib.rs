// Keyrelay Core Library
// Input device remapping engine: device registry, output synchronizer,
// hot-plug aware event loop and remap policies

pub mod action;
pub mod config;
pub mod event;
pub mod input;
pub mod lock;
pub mod modifier;
pub mod output;
pub mod policy;
pub mod util;

#[cfg(test)]
mod test_support;

pub use action::Action;
pub use config::{ConfigError, EngineConfig, PolicyConfig, PolicyKind};
pub use event::{spawn_bridge, EngineError, EventLoop, HotplugError, HotplugSignal, Shutdown};
pub use input::{
    matches_device_filter, DeviceCapabilities, DeviceDescriptor, DeviceId, DeviceRegistry, DeviceSource, EvdevSource,
    InputDevice, MatchRule, RegistryError,
};
pub use lock::{InstanceLock, LockError};
pub use modifier::{ModifierError, Modifiers};
pub use output::{
    create_virtual_device, OutputCapabilities, OutputDeviceName, OutputError, OutputSink, OutputSynchronizer,
};
pub use policy::{Flow, PolicyError, RemapPolicy};
