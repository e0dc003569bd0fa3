// Keyrelay Utilities
// Jitter source shared by output naming and hot-plug debounce

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::ops::RangeInclusive;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch (0 if the clock is before it).
pub fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Non-cryptographic random value.
///
/// Every `RandomState` is seeded differently, which is all the jitter here needs.
pub fn random_u64() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0));
    hasher.write_u32(std::process::id());
    hasher.finish()
}

/// Uniformly pick a duration in `range` (millisecond resolution).
pub fn random_duration(range: RangeInclusive<Duration>) -> Duration {
    let min = range.start().as_millis() as u64;
    let max = range.end().as_millis() as u64;
    if max <= min {
        return Duration::from_millis(min);
    }
    Duration::from_millis(min + random_u64() % (max - min + 1))
}
