// Keyrelay Output Layer
// Synthetic output device, key-state tracking and write synchronization

mod name;
mod state;
mod sync;
mod uinput;

pub use name::{OutputDeviceName, DEFAULT_OUTPUT_PREFIX};
pub use state::KeyStateTable;
pub use sync::{is_marker, OutputSynchronizer};
pub use uinput::{create_virtual_device, NullSink, OutputCapabilities, OutputError, OutputSink};
