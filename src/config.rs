//! Configuration management for msa-sim.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (MSA_SIM_DEFAULT_BANDWIDTH, etc.)
//! 2. Project-local config file (`./msa-sim.toml`)
//! 3. User config file (`~/.config/msa-sim/config.toml`)
//! 4. Built-in defaults
//!
//! Values in a scenario manifest's `[simulation]` table, and command-line
//! flags, take precedence over all of the above.
//!
//! # Config File Format
//!
//! ```toml
//! # msa-sim.toml
//!
//! # Default memory bandwidth in bytes/second
//! default_memory_bytes_per_second = 100e9
//!
//! # Memory space id of the alternate (fast) memory
//! alternate_memory_space = 1
//!
//! # Which estimate to report: "baseline", "full" or "both"
//! mode = "full"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use thiserror::Error;

use crate::program::ALTERNATE_MEMORY_SPACE;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Default memory bandwidth used when nothing else is configured.
pub const DEFAULT_MEMORY_BYTES_PER_SECOND: f64 = 100.0e9;

/// Which elapsed-time estimate to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulationMode {
    /// Per-instruction costs only, copies assumed free.
    Baseline,
    /// Full simulation with default-memory contention.
    #[default]
    Full,
    /// Both estimates side by side.
    Both,
}

impl SimulationMode {
    pub fn runs_baseline(self) -> bool {
        matches!(self, Self::Baseline | Self::Both)
    }

    pub fn runs_full(self) -> bool {
        matches!(self, Self::Full | Self::Both)
    }
}

/// Unrecognized simulation mode string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown simulation mode `{0}` (expected baseline, full or both)")]
pub struct ParseModeError(String);

impl FromStr for SimulationMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "full" => Ok(Self::Full),
            "both" => Ok(Self::Both),
            _ => Err(ParseModeError(s.to_string())),
        }
    }
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Baseline => "baseline",
            Self::Full => "full",
            Self::Both => "both",
        })
    }
}

/// msa-sim configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Default memory bandwidth in bytes/second.
    pub default_memory_bytes_per_second: Option<f64>,

    /// Memory space id treated as alternate memory.
    pub alternate_memory_space: Option<i64>,

    /// Estimate(s) to report.
    pub mode: Option<SimulationMode>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `msa-sim.toml`
    /// 3. User config `~/.config/msa-sim/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Default memory bandwidth, with fallback to 100 GB/s.
    pub fn default_memory_bytes_per_second(&self) -> f64 {
        self.default_memory_bytes_per_second
            .unwrap_or(DEFAULT_MEMORY_BYTES_PER_SECOND)
    }

    /// Alternate memory space id, with fallback to 1.
    pub fn alternate_memory_space(&self) -> i64 {
        self.alternate_memory_space.unwrap_or(ALTERNATE_MEMORY_SPACE)
    }

    /// Simulation mode, with fallback to [`SimulationMode::Full`].
    pub fn mode(&self) -> SimulationMode {
        self.mode.unwrap_or_default()
    }

    fn load_user_config() -> Option<Self> {
        let path = Self::user_config_path()?;
        Self::load_from_file(&path)
    }

    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("msa-sim.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("msa-sim.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    pub fn merge(&mut self, other: Self) {
        if other.default_memory_bytes_per_second.is_some() {
            self.default_memory_bytes_per_second = other.default_memory_bytes_per_second;
        }
        if other.alternate_memory_space.is_some() {
            self.alternate_memory_space = other.alternate_memory_space;
        }
        if other.mode.is_some() {
            self.mode = other.mode;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("MSA_SIM_DEFAULT_BANDWIDTH") {
            match value.parse::<f64>() {
                Ok(bandwidth) => {
                    log::info!("Using MSA_SIM_DEFAULT_BANDWIDTH from environment: {}", bandwidth);
                    self.default_memory_bytes_per_second = Some(bandwidth);
                }
                Err(e) => log::warn!("Ignoring MSA_SIM_DEFAULT_BANDWIDTH={}: {}", value, e),
            }
        }
        if let Ok(value) = std::env::var("MSA_SIM_ALTERNATE_SPACE") {
            match value.parse::<i64>() {
                Ok(space) => {
                    log::info!("Using MSA_SIM_ALTERNATE_SPACE from environment: {}", space);
                    self.alternate_memory_space = Some(space);
                }
                Err(e) => log::warn!("Ignoring MSA_SIM_ALTERNATE_SPACE={}: {}", value, e),
            }
        }
        if let Ok(value) = std::env::var("MSA_SIM_MODE") {
            match value.parse::<SimulationMode>() {
                Ok(mode) => {
                    log::info!("Using MSA_SIM_MODE from environment: {}", mode);
                    self.mode = Some(mode);
                }
                Err(e) => log::warn!("Ignoring MSA_SIM_MODE: {}", e),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("msa-sim").join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# msa-sim configuration
# Place this file at ~/.config/msa-sim/config.toml or ./msa-sim.toml

# Default (slow) memory bandwidth in bytes/second
default_memory_bytes_per_second = 100e9

# Memory space id of the alternate (fast) memory
alternate_memory_space = 1

# Which estimate to report: "baseline", "full" or "both"
# mode = "full"
"#
        .to_string()
    }
}
