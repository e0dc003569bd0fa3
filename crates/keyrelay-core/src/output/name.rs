// Keyrelay Output Layer - Device Naming
// Prefix + timestamp + random suffix for the synthetic output device

use std::fmt;

use crate::util::{random_u64, unix_millis};

/// Default prefix of every output device this engine creates.
pub const DEFAULT_OUTPUT_PREFIX: &str = "keyrelay-uinput-";

/// Name of the synthetic output device.
///
/// The suffix is a zero-padded millisecond timestamp followed by a random
/// number, so names of instances started later sort after earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDeviceName {
    prefix: String,
    full: String,
}

impl OutputDeviceName {
    pub fn generate(prefix: &str) -> Self {
        let suffix = format!("{:020}-{:06}", unix_millis(), random_u64() % 1_000_000);
        Self::with_suffix(prefix, &suffix)
    }

    pub fn with_suffix(prefix: &str, suffix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            full: format!("{}{}", prefix, suffix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl Default for OutputDeviceName {
    fn default() -> Self {
        Self::generate(DEFAULT_OUTPUT_PREFIX)
    }
}

impl fmt::Display for OutputDeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}
