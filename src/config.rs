//! Sync layer configuration
//! Handles loading and saving of timing and layout defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get config directory path
fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("spectrum"))
}

/// Get config file path
fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|p| p.join("sync.json"))
}

/// Default directory for durable engine state
pub fn default_state_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("spectrum"))
}

/// Synchronization layer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Config version (for future migrations)
    pub version: u32,
    /// Quiescence window before a cache flush (ms)
    pub debounce_ms: u64,
    /// Graph refresh polling interval (ms)
    pub refresh_interval_ms: u64,
    /// First tile slot
    pub tile_origin_x: f64,
    pub tile_origin_y: f64,
    /// Horizontal step between auto-placed nodes
    pub tile_step_x: f64,
    /// Row height for auto-placed nodes
    pub tile_step_y: f64,
    /// Start a new row once x passes this
    pub tile_wrap_width: f64,
    /// Override for where the local engine keeps graph_state.json
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debounce_ms: 1000,
            refresh_interval_ms: 1000,
            tile_origin_x: 80.0,
            tile_origin_y: 80.0,
            tile_step_x: 220.0,
            tile_step_y: 160.0,
            tile_wrap_width: 1100.0,
            state_dir: None,
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        // tokio intervals panic on zero
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    /// Directory for durable state: explicit override, else the platform data dir
    pub fn resolved_state_dir(&self) -> Option<PathBuf> {
        self.state_dir.clone().or_else(default_state_dir)
    }

    /// Load configuration from the platform config directory
    pub fn load() -> Self {
        match get_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                log::info!("[config] Could not determine config path, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            log::info!("[config] No config file at {:?}, using defaults", path);
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SyncConfig>(&content) {
                Ok(config) => {
                    log::info!("[config] Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    log::warn!("[config] Failed to parse config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("[config] Failed to read config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the platform config directory
    pub fn save(&self) -> Result<(), String> {
        let path = get_config_path().ok_or_else(|| "Could not determine config path".to_string())?;
        self.save_to(&path)
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create config directory: {}", e))?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write config: {}", e))?;

        log::info!("[config] Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"debounce_ms": 250}"#).unwrap();
        assert_eq!(config.debounce(), Duration::from_millis(250));
        assert_eq!(config.tile_step_x, 220.0);
        assert_eq!(config.state_dir, None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sync.json");

        let config = SyncConfig {
            refresh_interval_ms: 500,
            tile_wrap_width: 800.0,
            ..SyncConfig::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(SyncConfig::load_from(&path), config);
    }

    #[test]
    fn test_bad_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(SyncConfig::load_from(&path), SyncConfig::default());
        assert_eq!(
            SyncConfig::load_from(&dir.path().join("absent.json")),
            SyncConfig::default()
        );
    }

    #[test]
    fn test_zero_refresh_interval_is_clamped() {
        let config = SyncConfig {
            refresh_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.refresh_interval(), Duration::from_millis(1));
    }
}
