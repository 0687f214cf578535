//! Configuration loading and validation.
//!
//! Built-in defaults are deep-merged with the user's YAML file
//! (`~/.config/agitated.yaml`): mappings merge recursively key-by-key and the
//! user's value wins at every leaf. Validation failures are the only fatal
//! error class in the daemon; the main loop never starts on an incomplete
//! configuration.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Signal kinds eligible to trigger the Agitated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inhibitor {
    /// Older config files spell this "audio_payback".
    #[serde(alias = "audio_payback")]
    AudioPlayback,
    CpuUsage,
    NetworkActivity,
    FullscreenApp,
}

impl fmt::Display for Inhibitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Inhibitor::AudioPlayback => "audio playback",
            Inhibitor::CpuUsage => "cpu usage",
            Inhibitor::NetworkActivity => "network activity",
            Inhibitor::FullscreenApp => "fullscreen app",
        };
        f.write_str(name)
    }
}

/// Settings restored whenever the daemon chills or resets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChillDefaults {
    /// Minutes of inactivity before sleep in the chilled state.
    pub sleep_timeout: u32,
    pub dpms_enabled: bool,
    /// Seconds before the display blanks on battery.
    pub blank_on_battery: u32,
    pub dpms_sleep_on_battery: u32,
    pub dpms_off_on_battery: u32,
    pub brightness_on_battery: bool,
    pub brightness_level_on_battery: u32,
}

impl Default for ChillDefaults {
    fn default() -> Self {
        Self {
            sleep_timeout: 2,
            dpms_enabled: true,
            blank_on_battery: 600,
            dpms_sleep_on_battery: 600,
            dpms_off_on_battery: 660,
            brightness_on_battery: true,
            brightness_level_on_battery: 30,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Keep the display awake (DPMS blanking off) while the lock screen is up.
    pub keep_awake_on_lockscreen: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: bool,
    /// Minutes of inactivity allowed while agitated; effectively "never sleep".
    pub sleep_timeout: u32,
    /// Older config files spell this "cpu_usage_treshold"; see
    /// [`canonicalize_legacy_keys`].
    pub cpu_usage_threshold: f64,
    /// KB/s. Older config files spell this "network_activity_treshold"; see
    /// [`canonicalize_legacy_keys`].
    pub network_activity_threshold: u64,
    pub standard_inhibitors: Vec<Inhibitor>,
    pub network_interface: Option<String>,
    pub display: DisplayConfig,
    pub defaults: ChillDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            sleep_timeout: 999,
            cpu_usage_threshold: 10.0,
            network_activity_threshold: 100,
            standard_inhibitors: vec![
                Inhibitor::AudioPlayback,
                Inhibitor::CpuUsage,
                Inhibitor::NetworkActivity,
                Inhibitor::FullscreenApp,
            ],
            network_interface: None,
            display: DisplayConfig::default(),
            defaults: ChillDefaults::default(),
        }
    }
}

impl Config {
    /// Default location: `~/.config/agitated.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("agitated.yaml"))
    }

    /// Load the config file at `path`, merge it over the built-in defaults,
    /// and validate the result. A missing file is not a read error; the
    /// defaults alone go through validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut merged = serde_yaml::to_value(Config::default()).map_err(|source| {
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;

        if path.exists() {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let mut overlay: Value =
                serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            canonicalize_legacy_keys(&mut overlay);
            merge_values(&mut merged, overlay);
        }

        let config: Config =
            serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sleep_timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "sleep_timeout",
                message: "must be a positive number of minutes".to_string(),
            });
        }
        if self.defaults.sleep_timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "defaults.sleep_timeout",
                message: "must be a positive number of minutes".to_string(),
            });
        }
        if self.defaults.brightness_level_on_battery > 100 {
            return Err(ConfigError::Invalid {
                key: "defaults.brightness_level_on_battery",
                message: format!(
                    "must be a percentage, got {}",
                    self.defaults.brightness_level_on_battery
                ),
            });
        }
        if self
            .standard_inhibitors
            .contains(&Inhibitor::NetworkActivity)
            && self.network_interface.is_none()
        {
            return Err(ConfigError::Invalid {
                key: "network_interface",
                message: "required when the network_activity inhibitor is enabled".to_string(),
            });
        }
        Ok(())
    }

    pub fn inhibitor_enabled(&self, inhibitor: Inhibitor) -> bool {
        self.standard_inhibitors.contains(&inhibitor)
    }
}

/// Key spellings shipped by older config files, mapped to their canonical
/// names.
const LEGACY_KEYS: [(&str, &str); 2] = [
    ("cpu_usage_treshold", "cpu_usage_threshold"),
    ("network_activity_treshold", "network_activity_threshold"),
];

/// Rename legacy keys in a user document to their canonical spellings.
///
/// This must happen before the merge with the defaults: the defaults already
/// carry the canonical key, and a merged document holding both spellings
/// would deserialize as a duplicate field. When a file carries both, the
/// canonical key wins.
fn canonicalize_legacy_keys(overlay: &mut Value) {
    let Value::Mapping(map) = overlay else {
        return;
    };
    for (legacy, canonical) in LEGACY_KEYS {
        if let Some(value) = map.remove(legacy) {
            map.entry(Value::from(canonical)).or_insert(value);
        }
    }
}

/// Recursively merge `overlay` into `base`. Mappings merge key-by-key;
/// anything else in the overlay replaces the base value wholesale.
pub fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_merge_preserves_sibling_keys() {
        let mut base: Value =
            serde_yaml::from_str("sleep_timeout: 999\ndefaults:\n  sleep_timeout: 2").unwrap();
        let overlay: Value = serde_yaml::from_str("defaults:\n  sleep_timeout: 5").unwrap();
        merge_values(&mut base, overlay);
        assert_eq!(base["sleep_timeout"], Value::from(999));
        assert_eq!(base["defaults"]["sleep_timeout"], Value::from(5));
    }

    #[test]
    fn scalar_overlay_replaces_base() {
        let mut base: Value = serde_yaml::from_str("inhibitors: [a, b]").unwrap();
        let overlay: Value = serde_yaml::from_str("inhibitors: [c]").unwrap();
        merge_values(&mut base, overlay);
        let list = base["inhibitors"].as_sequence().unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn default_config_is_self_consistent() {
        // The network inhibitor is on by default but has no interface; that
        // combination must be caught before the daemon starts.
        assert!(Config::default().validate().is_err());

        let mut config = Config::default();
        config.network_interface = Some("wlan0".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_agitated_timeout_is_rejected() {
        let mut config = Config::default();
        config.network_interface = Some("wlan0".to_string());
        config.sleep_timeout = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sleep_timeout"));
    }

    #[test]
    fn inhibitor_accepts_historical_spelling() {
        let inhibitor: Inhibitor = serde_yaml::from_str("audio_payback").unwrap();
        assert_eq!(inhibitor, Inhibitor::AudioPlayback);
    }

    #[test]
    fn legacy_keys_are_canonicalized_before_merge() {
        let mut overlay: Value =
            serde_yaml::from_str("cpu_usage_treshold: 42\nnetwork_activity_treshold: 300")
                .unwrap();
        canonicalize_legacy_keys(&mut overlay);

        let map = overlay.as_mapping().unwrap();
        assert!(map.get("cpu_usage_treshold").is_none());
        assert_eq!(overlay["cpu_usage_threshold"], Value::from(42));
        assert_eq!(overlay["network_activity_threshold"], Value::from(300));
    }

    #[test]
    fn canonical_spelling_wins_over_legacy_duplicate() {
        let mut overlay: Value =
            serde_yaml::from_str("cpu_usage_threshold: 25\ncpu_usage_treshold: 42").unwrap();
        canonicalize_legacy_keys(&mut overlay);

        let map = overlay.as_mapping().unwrap();
        assert!(map.get("cpu_usage_treshold").is_none());
        assert_eq!(overlay["cpu_usage_threshold"], Value::from(25));
    }

    #[test]
    fn brightness_level_must_be_percentage() {
        let mut config = Config::default();
        config.network_interface = Some("eth0".to_string());
        config.defaults.brightness_level_on_battery = 150;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("brightness_level_on_battery"));
    }
}
