//! Configuration for wconhost.
//!
//! The configuration file is located at `~/.wconhost/config.toml`:
//!
//! ```toml
//! # Input and output codepages
//! codepage = 932
//! output_codepage = 932
//!
//! [history]
//! buffer_size = 50
//! buffer_count = 4
//! no_duplicates = true
//!
//! [screen]
//! width = 120
//! height = 30
//! scalable_font = true
//!
//! [[alias]]
//! exe = "cmd.exe"
//! source = "ll"
//! target = "dir /w $*"
//! ```
//!
//! Missing keys take their defaults; a file that does not parse is ignored.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codepage::CP_UTF8;
use crate::history::{HistoryInfo, DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE};

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Codepage of 8-bit input calls
    pub codepage: u32,
    /// Codepage of 8-bit output calls
    pub output_codepage: u32,
    /// Command history settings
    pub history: HistoryConfig,
    /// Screen buffer settings
    pub screen: ScreenConfig,
    /// Aliases loaded at startup
    #[serde(rename = "alias")]
    pub aliases: Vec<AliasConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            codepage: CP_UTF8,
            output_codepage: CP_UTF8,
            history: HistoryConfig::default(),
            screen: ScreenConfig::default(),
            aliases: Vec::new(),
        }
    }
}

/// Command history configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub buffer_size: usize,
    pub buffer_count: usize,
    pub no_duplicates: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
            no_duplicates: false,
        }
    }
}

impl HistoryConfig {
    pub fn info(&self) -> HistoryInfo {
        HistoryInfo {
            buffer_size: self.buffer_size,
            buffer_count: self.buffer_count,
            no_duplicates: self.no_duplicates,
        }
    }
}

/// Screen buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: i16,
    pub height: i16,
    pub scalable_font: bool,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            width: 120,
            height: 30,
            scalable_font: true,
        }
    }
}

/// One preloaded alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasConfig {
    pub exe: String,
    pub source: String,
    pub target: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => tracing::warn!("ignoring {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<(), String> {
        match Self::get_config_path() {
            Some(path) => self.save_to(&path),
            None => Err("Could not determine config path".to_string()),
        }
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))?;
        Ok(())
    }

    /// Directory holding the config file and the log
    pub fn config_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".wconhost"))
    }

    /// Get config file path
    fn get_config_path() -> Option<PathBuf> {
        let dir = Self::config_dir()?;
        if !dir.exists() {
            let _ = fs::create_dir_all(&dir);
        }
        Some(dir.join("config.toml"))
    }
}

/// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.codepage, 65001);
        assert_eq!(config.history.buffer_size, 25);
        assert_eq!(config.history.buffer_count, 4);
        assert!(config.screen.scalable_font);
        assert!(config.aliases.is_empty());
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            codepage = 932

            [history]
            no_duplicates = true

            [[alias]]
            exe = "cmd.exe"
            source = "ll"
            target = "dir $*"
            "#,
        )
        .unwrap();
        assert_eq!(config.codepage, 932);
        assert_eq!(config.output_codepage, 65001);
        assert!(config.history.no_duplicates);
        assert_eq!(config.history.buffer_size, 25);
        assert_eq!(config.aliases.len(), 1);
        assert_eq!(config.aliases[0].target, "dir $*");
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("wconhost-config-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.codepage = 932;
        config.history.buffer_count = 8;
        config.aliases.push(AliasConfig {
            exe: "cmd.exe".to_string(),
            source: "ll".to_string(),
            target: "dir /w $*".to_string(),
        });

        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("wconhost-config-does-not-exist.toml");
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn test_round_trip() {
        let mut config = Config::default();
        config.aliases.push(AliasConfig {
            exe: "cmd.exe".to_string(),
            source: "x".to_string(),
            target: "y".to_string(),
        });
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
