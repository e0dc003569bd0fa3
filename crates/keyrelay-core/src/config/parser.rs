// Keyrelay Config Parser - TOML with Serde
// Raw file layout and its conversion onto an EngineConfig

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use super::keys::{axis_code, key_code};
use super::policy::{ChordRuleConfig, PolicyKind};
use super::{ConfigError, EngineConfig};
use crate::input::MatchRule;
use crate::policy::ChordAction;
use crate::{Action, Modifiers};

/// Root TOML table
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigToml {
    #[serde(default)]
    device: Option<DeviceToml>,
    #[serde(default)]
    output: Option<OutputToml>,
    #[serde(default)]
    debounce: Option<DebounceToml>,
    #[serde(default)]
    lock: Option<LockToml>,
    #[serde(default)]
    log: Option<LogToml>,
    #[serde(default)]
    policy: Option<PolicyToml>,
}

/// Which devices to take over
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceToml {
    /// Regex searched in the device name
    name: Option<String>,
    /// Regex searched in the identity string (`v046d pc52b`)
    id: Option<String>,
    non_keyboards: Option<bool>,
    grab: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputToml {
    enabled: Option<bool>,
    name_prefix: Option<String>,
    keys: Option<Vec<KeySpec>>,
    relative_axes: Option<Vec<KeySpec>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DebounceToml {
    min_ms: Option<u64>,
    max_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LockToml {
    name: Option<String>,
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogToml {
    debug: Option<bool>,
    quiet: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyToml {
    kind: Option<String>,
    keymap: Option<KeymapToml>,
    #[serde(default)]
    chord: Vec<ChordToml>,
    push_to_talk: Option<PushToTalkToml>,
    jog_dial: Option<JogDialToml>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeymapToml {
    #[serde(default)]
    map: HashMap<String, KeySpec>,
    #[serde(default)]
    passthrough: bool,
}

/// One `[[policy.chord]]` entry; exactly one of `tap`, `rename`, `swallow`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChordToml {
    key: KeySpec,
    /// Letters from "acswe"
    modifiers: Option<String>,
    #[serde(default)]
    any_modifiers: bool,
    /// Key values to match (0 release, 1 press, 2 repeat)
    values: Option<Vec<i32>>,
    tap: Option<KeySpec>,
    tap_modifiers: Option<String>,
    rename: Option<KeySpec>,
    #[serde(default)]
    swallow: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PushToTalkToml {
    trigger: KeySpec,
    toggle: Option<KeySpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct JogDialToml {
    wheel_keys: Option<[KeySpec; 2]>,
    dial_keys: Option<[KeySpec; 2]>,
    #[serde(default)]
    buttons: HashMap<String, KeySpec>,
}

/// A key or axis given by name or by number
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeySpec {
    Code(u16),
    Name(String),
}

impl KeySpec {
    fn key(&self) -> Result<u16, ConfigError> {
        match self {
            KeySpec::Code(code) => Ok(*code),
            KeySpec::Name(name) => parse_key(name),
        }
    }

    fn axis(&self) -> Result<u16, ConfigError> {
        match self {
            KeySpec::Code(code) => Ok(*code),
            KeySpec::Name(name) => {
                axis_code(name).ok_or_else(|| ConfigError::InvalidValue(format!("unknown axis '{}'", name)))
            }
        }
    }
}

fn parse_key(name: &str) -> Result<u16, ConfigError> {
    key_code(name).ok_or_else(|| ConfigError::InvalidValue(format!("unknown key '{}'", name)))
}

fn parse_modifiers(letters: &str) -> Result<Modifiers, ConfigError> {
    letters
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{}", e)))
}

fn key_pair(pair: &[KeySpec; 2]) -> Result<(u16, u16), ConfigError> {
    Ok((pair[0].key()?, pair[1].key()?))
}

fn key_table(table: &HashMap<String, KeySpec>) -> Result<HashMap<u16, u16>, ConfigError> {
    table
        .iter()
        .map(|(from, to)| Ok((parse_key(from)?, to.key()?)))
        .collect()
}

impl ConfigToml {
    /// Overwrite every field of `config` the file specifies.
    pub(crate) fn apply(self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        if let Some(device) = self.device {
            let rule = &config.match_rule;
            config.match_rule = MatchRule::new(
                device.name.as_deref().unwrap_or(rule.name_pattern()),
                device.id.as_deref().unwrap_or(rule.id_pattern()),
                device.non_keyboards.unwrap_or(rule.non_keyboards_allowed()),
            )?;
            if let Some(grab) = device.grab {
                config.grab = grab;
            }
        }

        if let Some(output) = self.output {
            if let Some(enabled) = output.enabled {
                config.output.enabled = enabled;
            }
            if let Some(prefix) = output.name_prefix {
                if prefix.is_empty() {
                    return Err(ConfigError::InvalidValue("output name prefix is empty".to_string()));
                }
                config.output.name_prefix = prefix;
            }
            if let Some(keys) = output.keys {
                config.output.keys = keys.iter().map(KeySpec::key).collect::<Result<_, _>>()?;
            }
            if let Some(axes) = output.relative_axes {
                config.output.relative_axes = axes.iter().map(KeySpec::axis).collect::<Result<_, _>>()?;
            }
        }

        if let Some(debounce) = self.debounce {
            if let Some(min) = debounce.min_ms {
                config.debounce.min_ms = min;
            }
            if let Some(max) = debounce.max_ms {
                config.debounce.max_ms = max;
            }
            if config.debounce.min_ms > config.debounce.max_ms {
                return Err(ConfigError::InvalidValue(format!(
                    "debounce min_ms {} is greater than max_ms {}",
                    config.debounce.min_ms, config.debounce.max_ms
                )));
            }
        }

        if let Some(lock) = self.lock {
            if let Some(name) = lock.name {
                config.lock_name = name;
            }
            if let Some(dir) = lock.dir {
                config.lock_dir = dir;
            }
        }

        if let Some(log) = self.log {
            config.debug = log.debug.unwrap_or(config.debug);
            config.quiet = log.quiet.unwrap_or(config.quiet);
        }

        if let Some(policy) = self.policy {
            policy.apply(config)?;
        }
        Ok(())
    }
}

impl PolicyToml {
    fn apply(self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        let target = &mut config.policy;
        if let Some(kind) = self.kind {
            target.kind = kind.parse::<PolicyKind>()?;
        }
        if let Some(keymap) = self.keymap {
            target.keymap.map = key_table(&keymap.map)?;
            target.keymap.passthrough = keymap.passthrough;
        }
        if !self.chord.is_empty() {
            target.chords = self.chord.iter().map(ChordToml::to_rule).collect::<Result<_, _>>()?;
        }
        if let Some(ptt) = self.push_to_talk {
            target.push_to_talk.trigger = Some(ptt.trigger.key()?);
            if let Some(toggle) = ptt.toggle {
                target.push_to_talk.toggle = toggle.key()?;
            }
        }
        if let Some(jog) = self.jog_dial {
            if let Some(keys) = &jog.wheel_keys {
                target.jog_dial.wheel_keys = key_pair(keys)?;
            }
            if let Some(keys) = &jog.dial_keys {
                target.jog_dial.dial_keys = key_pair(keys)?;
            }
            target.jog_dial.buttons = key_table(&jog.buttons)?;
        }
        Ok(())
    }
}

impl ChordToml {
    fn to_rule(&self) -> Result<ChordRuleConfig, ConfigError> {
        let code = self.key.key()?;

        let action = match (&self.tap, &self.rename, self.swallow) {
            (Some(tap), None, false) => ChordAction::Tap {
                code: tap.key()?,
                modifiers: parse_modifiers(self.tap_modifiers.as_deref().unwrap_or(""))?,
            },
            (None, Some(rename), false) => ChordAction::Rename(rename.key()?),
            (None, None, true) => ChordAction::Swallow,
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "chord rule for key {} needs exactly one of tap, rename, swallow",
                    code
                )))
            }
        };

        let values = match &self.values {
            Some(values) => values
                .iter()
                .map(|v| {
                    Action::from_i32(*v)
                        .ok_or_else(|| ConfigError::InvalidValue(format!("invalid key value {}", v)))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![Action::Press],
        };

        let modifiers = if self.any_modifiers {
            None
        } else {
            Some(parse_modifiers(self.modifiers.as_deref().unwrap_or(""))?)
        };

        Ok(ChordRuleConfig {
            code,
            values,
            modifiers,
            action,
        })
    }
}
