// Keyrelay Modifier Set
// Alt/Ctrl/Shift/Win(/Esc) combinations for chord matching and emission

use std::fmt;
use std::str::FromStr;

use evdev::Key;

use crate::output::KeyStateTable;

/// Set of modifier keys, either side counting as held.
///
/// `esc` is only meaningful for matching: ESC works as a chord prefix on
/// the input side but is never synthesized as a modifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub shift: bool,
    pub win: bool,
    pub esc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown modifier '{0}' (expected a, c, s, w or e)")]
pub struct ModifierError(pub char);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        alt: false,
        ctrl: false,
        shift: false,
        win: false,
        esc: false,
    };

    /// Modifiers currently held according to a key state table.
    pub fn held_in(table: &KeyStateTable) -> Self {
        let either = |left: Key, right: Key| table.is_pressed(left.code()) || table.is_pressed(right.code());
        Self {
            alt: either(Key::KEY_LEFTALT, Key::KEY_RIGHTALT),
            ctrl: either(Key::KEY_LEFTCTRL, Key::KEY_RIGHTCTRL),
            shift: either(Key::KEY_LEFTSHIFT, Key::KEY_RIGHTSHIFT),
            win: either(Key::KEY_LEFTMETA, Key::KEY_RIGHTMETA),
            esc: table.is_pressed(Key::KEY_ESC.code()),
        }
    }

    /// Left-side key codes to press, in press order (alt, ctrl, shift, win).
    pub fn press_order(&self) -> Vec<u16> {
        let mut codes = Vec::with_capacity(4);
        if self.alt {
            codes.push(Key::KEY_LEFTALT.code());
        }
        if self.ctrl {
            codes.push(Key::KEY_LEFTCTRL.code());
        }
        if self.shift {
            codes.push(Key::KEY_LEFTSHIFT.code());
        }
        if self.win {
            codes.push(Key::KEY_LEFTMETA.code());
        }
        codes
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

/// Parses the compact letter form: `a`lt, `c`trl, `s`hift, `w`in, `e`sc.
/// `"ac"` is Alt+Ctrl; the empty string is no modifiers.
impl FromStr for Modifiers {
    type Err = ModifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mods = Modifiers::NONE;
        for ch in s.chars() {
            match ch.to_ascii_lowercase() {
                'a' => mods.alt = true,
                'c' => mods.ctrl = true,
                's' => mods.shift = true,
                'w' => mods.win = true,
                'e' => mods.esc = true,
                other => return Err(ModifierError(other)),
            }
        }
        Ok(mods)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (set, ch) in [
            (self.alt, 'a'),
            (self.ctrl, 'c'),
            (self.shift, 's'),
            (self.win, 'w'),
            (self.esc, 'e'),
        ] {
            if set {
                write!(f, "{}", ch)?;
            }
        }
        Ok(())
    }
}
