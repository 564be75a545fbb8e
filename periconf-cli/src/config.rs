//! Configuration file support for periconf.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (PERICONF_*)
//! 3. File given with `--config`
//! 4. Local config file (./periconf.toml)
//! 5. Global config file (~/.config/periconf/config.toml)

use {
    directories::ProjectDirs,
    log::{debug, info, warn},
    periconf::flash::DEFAULT_TOOL,
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "periconf.toml";

const DEFAULT_LISTEN_MS: u64 = 1500;
const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Port configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
}

/// Session behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to poll for replies after a command, in milliseconds.
    pub listen_ms: Option<u64>,
    /// Delay between two polls, in milliseconds.
    pub poll_interval_ms: Option<u64>,
    /// Print previews of binary chunks.
    pub show_binary: Option<bool>,
}

/// Flashing utility configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlashConfig {
    /// Program to run (default `esptool.py`).
    pub tool: Option<String>,
    /// Arguments placed before the esptool arguments, e.g. `["-m", "esptool"]`.
    #[serde(default)]
    pub tool_args: Vec<String>,
    /// Directory holding the boards' default firmware images.
    pub firmware_dir: Option<PathBuf>,
    /// Flashing baud rate override.
    pub baud: Option<u32>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load the usual files, then the file given with `--config` on top.
    pub fn load_with(path: Option<&Path>) -> Self {
        let mut config = Self::load();
        if let Some(path) = path {
            config.merge(Self::load_from_path(path));
        }
        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "periconf").map(|dirs| {
            dirs.config_dir()
                .to_path_buf()
        })
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Values set in `other` win.
    fn merge(&mut self, other: Self) {
        if other.port.serial.is_some() {
            self.port.serial = other.port.serial;
        }

        if other.session.listen_ms.is_some() {
            self.session.listen_ms = other.session.listen_ms;
        }
        if other.session.poll_interval_ms.is_some() {
            self.session.poll_interval_ms = other.session.poll_interval_ms;
        }
        if other.session.show_binary.is_some() {
            self.session.show_binary = other.session.show_binary;
        }

        if other.flash.tool.is_some() {
            self.flash.tool = other.flash.tool;
        }
        if !other.flash.tool_args.is_empty() {
            self.flash.tool_args = other.flash.tool_args;
        }
        if other.flash.firmware_dir.is_some() {
            self.flash.firmware_dir = other.flash.firmware_dir;
        }
        if other.flash.baud.is_some() {
            self.flash.baud = other.flash.baud;
        }
    }

    /// Reply window after a command.
    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(
            self.session
                .listen_ms
                .unwrap_or(DEFAULT_LISTEN_MS),
        )
    }

    /// Delay between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.session
                .poll_interval_ms
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
                .max(1),
        )
    }

    /// Whether binary previews are printed.
    pub fn show_binary(&self) -> bool {
        self.session
            .show_binary
            .unwrap_or(false)
    }

    /// Flashing program.
    pub fn flash_tool(&self) -> &str {
        self.flash
            .tool
            .as_deref()
            .unwrap_or(DEFAULT_TOOL)
    }

    /// Remember `serial` in the local config file, keeping its other sections.
    pub fn save_port(&mut self, serial: &str) -> anyhow::Result<()> {
        self.save_port_to(Path::new(LOCAL_CONFIG_FILE), serial)
    }

    fn save_port_to(&mut self, path: &Path, serial: &str) -> anyhow::Result<()> {
        let mut local = Self::load_from_file(path).unwrap_or_default();
        local
            .port
            .serial = Some(serial.to_string());

        let content = toml::to_string_pretty(&local)?;
        fs::write(path, content)?;
        info!("Saved port configuration to {}", path.display());

        self.port
            .serial = Some(serial.to_string());
        Ok(())
    }
}
