// Keyrelay Config - Key Names
// Resolves key and axis names from config files to event codes

use std::collections::HashMap;
use std::sync::OnceLock;

use evdev::{Key, RelativeAxisType};

const KEY_MAX: u16 = 0x2ff;
const REL_MAX: u16 = 0x0f;

fn key_names() -> &'static HashMap<String, u16> {
    static NAMES: OnceLock<HashMap<String, u16>> = OnceLock::new();
    NAMES.get_or_init(|| {
        (0..=KEY_MAX)
            .filter_map(|code| {
                let name = format!("{:?}", Key::new(code));
                (name.starts_with("KEY_") || name.starts_with("BTN_")).then_some((name, code))
            })
            .collect()
    })
}

fn axis_names() -> &'static HashMap<String, u16> {
    static NAMES: OnceLock<HashMap<String, u16>> = OnceLock::new();
    NAMES.get_or_init(|| {
        (0..=REL_MAX)
            .filter_map(|code| {
                let name = format!("{:?}", RelativeAxisType(code));
                name.starts_with("REL_").then_some((name, code))
            })
            .collect()
    })
}

fn lookup(table: &HashMap<String, u16>, prefix: &str, name: &str) -> Option<u16> {
    let name = name.trim();
    if let Ok(code) = name.parse::<u16>() {
        return Some(code);
    }
    let upper = name.to_ascii_uppercase();
    table
        .get(&upper)
        .or_else(|| table.get(&format!("{}{}", prefix, upper)))
        .copied()
}

/// Key code for a name such as `KEY_F20`, `f20`, `BTN_LEFT` or `190`.
pub fn key_code(name: &str) -> Option<u16> {
    lookup(key_names(), "KEY_", name)
}

/// Relative axis code for a name such as `REL_WHEEL`, `dial` or `7`.
pub fn axis_code(name: &str) -> Option<u16> {
    lookup(axis_names(), "REL_", name)
}
