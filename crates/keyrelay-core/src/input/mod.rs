// Keyrelay Input Layer
// Device descriptors, match rules and the device registry

mod device;
mod filter;
mod registry;

pub use device::{DeviceCapabilities, DeviceDescriptor, DeviceId, EvdevDevice, InputDevice};
pub use filter::{
    classify_device, is_keyboard_shaped, is_own_output, matches_device_filter, FilterVerdict, MatchRule,
};
pub use registry::{DeviceRegistry, DeviceSource, EvdevSource, RegistryError, INPUT_DIR};
