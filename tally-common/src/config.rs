//! Configuration loading and root folder resolution
//!
//! Root folder resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TALLY_ROOT_FOLDER` environment variable
//! 3. `root_folder` from the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup: the service logs a
//! warning and continues with built-in defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TALLY_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the `data/` directory (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Results table lock tuning
    #[serde(default)]
    pub gate: GateConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Lock marker retry/staleness settings for results tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Retries after the first failed attempt before giving up
    #[serde(default = "default_gate_max_retries")]
    pub max_retries: u32,

    /// Fixed wait between attempts
    #[serde(default = "default_gate_backoff_ms")]
    pub backoff_ms: u64,

    /// Marker age after which its holder is presumed crashed
    #[serde(default = "default_gate_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_retries: default_gate_max_retries(),
            backoff_ms: default_gate_backoff_ms(),
            stale_after_ms: default_gate_stale_after_ms(),
        }
    }
}

fn default_port() -> u16 {
    5740
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_gate_max_retries() -> u32 {
    200
}

fn default_gate_backoff_ms() -> u64 {
    50
}

fn default_gate_stale_after_ms() -> u64 {
    30_000
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load from an explicit path, else from the platform config locations,
    /// else fall back to defaults.
    ///
    /// Nothing is logged here: config is read before the subscriber exists,
    /// so the caller reports the returned [`ConfigSource`] once it does.
    pub fn load_or_default(explicit: Option<&Path>) -> (Self, ConfigSource) {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };

        let Some(path) = path else {
            return (
                Self::default(),
                ConfigSource::Defaults {
                    reason: "No config file found".to_string(),
                },
            );
        };

        match Self::load(&path) {
            Ok(config) => (config, ConfigSource::File(path)),
            Err(e) => (
                Self::default(),
                ConfigSource::Defaults {
                    reason: e.to_string(),
                },
            ),
        }
    }
}

/// Where the active config came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file, or the file could not be read or parsed
    Defaults { reason: String },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
            ConfigSource::Defaults { reason } => warn!("{} - using built-in defaults", reason),
        }
    }
}

/// Write a TOML config atomically (temp file in the same folder, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension(format!("toml.tmp-{}", std::process::id()));
    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Platform config file locations, first existing wins
fn find_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("tally").join("config.toml"));
    let system_config = PathBuf::from("/etc/tally/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|p| p.exists())
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tally"))
        .unwrap_or_else(|| PathBuf::from("./tally_data"))
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn with_toml_root(mut self, toml_root: Option<PathBuf>) -> Self {
        self.toml_root = toml_root;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!(module = %self.module_name, "Root folder from command line: {}", path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!(module = %self.module_name, "Root folder from {}: {}", ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            info!(module = %self.module_name, "Root folder from TOML config: {}", path.display());
            return path.clone();
        }

        let path = default_root_folder();
        info!(module = %self.module_name, "Root folder default: {}", path.display());
        path
    }
}

/// Creates the on-disk layout under a root folder
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [self.data_dir(), self.uploads_dir(), self.submissions_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::Config(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// `<root>/data` - results tables, lock markers and the survey catalog
    pub fn data_dir(&self) -> PathBuf {
        self.root_folder.join("data")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir().join("uploads")
    }

    pub fn submissions_dir(&self) -> PathBuf {
        self.data_dir().join("submissions")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir().join("surveys.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5740);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.gate.max_retries, 200);
        assert_eq!(config.gate.backoff_ms, 50);
        assert_eq!(config.gate.stale_after_ms, 30_000);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000

            [gate]
            backoff_ms = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.gate.backoff_ms, 5);
        assert_eq!(config.gate.max_retries, 200);
        assert!(config.root_folder.is_none());
    }

    #[test]
    fn test_write_then_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/srv/tally")),
            port: 7001,
            ..TomlConfig::default()
        };
        write_toml_config(&config, &path).unwrap();

        let loaded = TomlConfig::load(&path).unwrap();
        assert_eq!(loaded, config);

        // No temp files left behind
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_load_or_default_with_broken_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let (config, source) = TomlConfig::load_or_default(Some(&path));
        assert_eq!(config, TomlConfig::default());
        assert!(
            matches!(source, ConfigSource::Defaults { ref reason } if reason.contains("Parse")),
            "unexpected source {source:?}"
        );
    }

    #[test]
    fn test_initializer_creates_layout() {
        let temp_dir = TempDir::new().unwrap();
        let initializer = RootFolderInitializer::new(temp_dir.path().join("root"));
        initializer.ensure_directory_exists().unwrap();

        assert!(initializer.data_dir().is_dir());
        assert!(initializer.uploads_dir().is_dir());
        assert!(initializer.submissions_dir().is_dir());
        assert_eq!(
            initializer.catalog_path(),
            temp_dir.path().join("root").join("data").join("surveys.json")
        );
    }
}
