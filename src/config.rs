//! Bridge settings
//!
//! Everything tunable lives in one TOML file. Missing keys fall back to
//! their defaults, and a missing file is created with the defaults so there
//! is something to edit.

use crate::controller::{KeyRepeat, PollerSettings, ReattachPolicy};
use crate::glyph::GlyphTable;
use crate::native::ControllerType;
use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "steam-input-bridge";
const CONFIG_FILE: &str = "bridge.toml";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct BridgeSettings {
    pub analog_threshold: f32,
    pub motion_threshold: f32,
    /// Set activated on attach; the first declared set when absent.
    pub default_action_set: Option<String>,
    pub reattach_policy: ReattachPolicy,
    pub reattach_grace_frames: u64,
    /// Held-button repeat; disabled when absent.
    pub key_repeat: Option<KeyRepeatSettings>,
    pub split_axes: bool,
    pub default_glyph: String,
    /// Controller type name -> origin name -> icon.
    pub glyphs: BTreeMap<String, BTreeMap<String, String>>,
    pub tick_interval_ms: u64,
    pub manifest_path: PathBuf,
    pub gilrs: GilrsSettings,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct KeyRepeatSettings {
    pub initial_delay_ms: u64,
    pub repeat_delay_ms: u64,
}

impl Default for KeyRepeatSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: 200,
            repeat_delay_ms: 100,
        }
    }
}

/// Action name -> gamepad control, e.g. `Jump = "South"`, `Move = "LeftStick"`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct GilrsSettings {
    pub bindings: BTreeMap<String, String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            analog_threshold: 0.05,
            motion_threshold: 0.01,
            default_action_set: None,
            reattach_policy: ReattachPolicy::NewId,
            reattach_grace_frames: 1,
            key_repeat: None,
            split_axes: true,
            default_glyph: "glyphs/generic.png".to_string(),
            glyphs: BTreeMap::new(),
            tick_interval_ms: 16,
            manifest_path: PathBuf::from("action_manifest.toml"),
            gilrs: GilrsSettings::default(),
        }
    }
}

impl BridgeSettings {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading bridge settings from {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read settings file {}: {}", path.display(), e))?;
        let settings: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse settings file {}: {}", path.display(), e))?;
        settings.validate()?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    /// Loads the per-user settings file, writing the defaults first if it does not exist.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            Self::default().save(&path)?;
        }
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| eyre!("Failed to create settings directory: {}", e))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize settings: {}", e))?;
        fs::write(path, content).map_err(|e| eyre!("Failed to write settings file: {}", e))?;
        info!("Wrote bridge settings to {}", path.display());
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    fn validate(&self) -> Result<()> {
        if !(self.analog_threshold >= 0.0) || !(self.motion_threshold >= 0.0) {
            return Err(eyre!("Thresholds must be non-negative"));
        }
        if self.tick_interval_ms == 0 {
            return Err(eyre!("tick_interval_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn poller(&self) -> PollerSettings {
        PollerSettings {
            analog_threshold: self.analog_threshold,
            motion_threshold: self.motion_threshold,
            key_repeat: self.key_repeat.map(|repeat| KeyRepeat {
                initial_delay: Duration::from_millis(repeat.initial_delay_ms),
                repeat_delay: Duration::from_millis(repeat.repeat_delay_ms),
            }),
        }
    }

    /// Glyph table keyed by controller type. Unknown type names are skipped.
    pub fn glyph_table(&self) -> GlyphTable {
        let mut table = HashMap::new();
        for (type_name, icons) in &self.glyphs {
            match type_name.parse::<ControllerType>() {
                Ok(controller_type) => {
                    table.insert(
                        controller_type,
                        icons.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    );
                }
                Err(e) => warn!("Ignoring glyph table entry: {}", e),
            }
        }
        table
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings: BridgeSettings = toml::from_str("").unwrap();
        assert_eq!(settings, BridgeSettings::default());
        assert_eq!(settings.poller(), PollerSettings::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let settings: BridgeSettings = toml::from_str(
            r#"
analog_threshold = 0.1
reattach_policy = "reuse_recent"
split_axes = false

[key_repeat]
initial_delay_ms = 300

[glyphs.PS5]
South = "ps5/cross.png"

[glyphs.Dreamcast]
A = "dc/a.png"

[gilrs.bindings]
Jump = "South"
"#,
        )
        .unwrap();

        assert_eq!(settings.analog_threshold, 0.1);
        assert_eq!(settings.motion_threshold, 0.01);
        assert_eq!(settings.reattach_policy, ReattachPolicy::ReuseRecent);
        assert!(!settings.split_axes);
        assert_eq!(
            settings.poller().key_repeat,
            Some(KeyRepeat {
                initial_delay: Duration::from_millis(300),
                repeat_delay: Duration::from_millis(100),
            })
        );

        let table = settings.glyph_table();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table[&ControllerType::PS5].get("South").map(String::as_str),
            Some("ps5/cross.png")
        );
        assert_eq!(settings.gilrs.bindings["Jump"], "South");
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = std::env::temp_dir().join(format!("bridge-settings-{}", std::process::id()));
        let path = dir.join("bridge.toml");
        let mut settings = BridgeSettings::default();
        settings.default_action_set = Some("Menu".to_string());
        settings.key_repeat = Some(KeyRepeatSettings::default());

        settings.save(&path).unwrap();
        assert_eq!(BridgeSettings::load(&path).unwrap(), settings);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = std::env::temp_dir().join(format!("bridge-invalid-{}", std::process::id()));
        let path = dir.join("bridge.toml");
        fs::create_dir_all(&dir).unwrap();
        fs::write(&path, "tick_interval_ms = 0").unwrap();

        assert!(BridgeSettings::load(&path).is_err());
        let _ = fs::remove_dir_all(dir);
    }
}
