// Keyrelay Config - Policy Selection
// Which remap policy to run and its settings

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use evdev::Key;

use super::ConfigError;
use crate::policy::{
    ChordAction, ChordPolicy, ChordRule, JogDialPolicy, KeymapPolicy, PassthroughPolicy, PushToTalkPolicy,
    RemapPolicy,
};
use crate::{Action, Modifiers};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PolicyKind {
    #[default]
    Passthrough,
    Keymap,
    Chord,
    PushToTalk,
    JogDial,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 5] = [
        PolicyKind::Passthrough,
        PolicyKind::Keymap,
        PolicyKind::Chord,
        PolicyKind::PushToTalk,
        PolicyKind::JogDial,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::Passthrough => "passthrough",
            PolicyKind::Keymap => "keymap",
            PolicyKind::Chord => "chord",
            PolicyKind::PushToTalk => "push-to-talk",
            PolicyKind::JogDial => "jog-dial",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        PolicyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ConfigError::InvalidValue(format!("unknown policy '{}'", s)))
    }
}

/// One chord rule as configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordRuleConfig {
    pub code: u16,
    pub values: Vec<Action>,
    /// `None` matches any held modifiers
    pub modifiers: Option<Modifiers>,
    pub action: ChordAction,
}

impl ChordRuleConfig {
    fn to_rule(&self) -> ChordRule {
        let rule = ChordRule::new(self.code, self.action).on_values(&self.values);
        match self.modifiers {
            Some(modifiers) => rule.with_modifiers(modifiers),
            None => rule.any_modifiers(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeymapConfig {
    pub map: HashMap<u16, u16>,
    pub passthrough: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushToTalkConfig {
    pub trigger: Option<u16>,
    pub toggle: u16,
}

impl Default for PushToTalkConfig {
    fn default() -> Self {
        Self {
            trigger: None,
            toggle: Key::KEY_F20.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JogDialConfig {
    pub wheel_keys: (u16, u16),
    pub dial_keys: (u16, u16),
    pub buttons: HashMap<u16, u16>,
}

impl Default for JogDialConfig {
    fn default() -> Self {
        Self {
            wheel_keys: (Key::KEY_LEFT.code(), Key::KEY_RIGHT.code()),
            dial_keys: (Key::KEY_VOLUMEDOWN.code(), Key::KEY_VOLUMEUP.code()),
            buttons: HashMap::new(),
        }
    }
}

/// Selected policy plus the settings of every policy kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    pub keymap: KeymapConfig,
    pub chords: Vec<ChordRuleConfig>,
    pub push_to_talk: PushToTalkConfig,
    pub jog_dial: JogDialConfig,
}

impl PolicyConfig {
    /// Instantiate the selected policy.
    pub fn build(&self) -> Result<Box<dyn RemapPolicy>, ConfigError> {
        let policy: Box<dyn RemapPolicy> = match self.kind {
            PolicyKind::Passthrough => Box::new(PassthroughPolicy),
            PolicyKind::Keymap => Box::new(
                KeymapPolicy::new(self.keymap.map.clone()).with_passthrough(self.keymap.passthrough),
            ),
            PolicyKind::Chord => Box::new(ChordPolicy::new(
                self.chords.iter().map(ChordRuleConfig::to_rule).collect(),
            )),
            PolicyKind::PushToTalk => {
                let trigger = self.push_to_talk.trigger.ok_or_else(|| {
                    ConfigError::InvalidValue("push-to-talk needs a trigger key".to_string())
                })?;
                Box::new(PushToTalkPolicy::new(trigger).with_toggle_key(self.push_to_talk.toggle))
            }
            PolicyKind::JogDial => {
                let jog = &self.jog_dial;
                Box::new(
                    JogDialPolicy::new()
                        .with_wheel_keys(jog.wheel_keys.0, jog.wheel_keys.1)
                        .with_dial_keys(jog.dial_keys.0, jog.dial_keys.1)
                        .with_buttons(jog.buttons.clone()),
                )
            }
        };
        log::debug!("Using {} policy", self.kind);
        Ok(policy)
    }
}
