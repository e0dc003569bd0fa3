// Keyrelay Event Handling
// Main loop, hot-plug bridge and the wakeup channels between them

pub mod hotplug;
pub mod r#loop;
mod wakeup;

pub use hotplug::{spawn_bridge, HotplugError};
pub use r#loop::{EngineError, EventLoop, DEFAULT_DEBOUNCE};
pub use wakeup::{HotplugSignal, Shutdown, WakePipe};
