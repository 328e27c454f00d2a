//! Configuration file loading
//!
//! Loads user configuration from `~/.config/srtcast/config.toml`. The file
//! doubles as the settings store for named servers and profiles.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EncodingProfile, QualityPreset};
use crate::endpoint::TransportEndpoint;
use crate::error::{Result, SrtcastError};

/// Source of persisted servers and profiles
///
/// Hosts that keep these elsewhere implement this themselves.
pub trait SettingsStore: Send + Sync {
    /// All saved encoding profiles
    fn profiles(&self) -> Vec<NamedProfile>;

    /// All saved ingest servers
    fn servers(&self) -> Vec<NamedServer>;

    /// Look up a profile by name
    fn profile(&self, name: &str) -> Option<EncodingProfile> {
        self.profiles()
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.profile)
    }

    /// Look up a server by name
    fn server(&self, name: &str) -> Option<TransportEndpoint> {
        self.servers()
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| s.endpoint)
    }
}

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Default selections
    #[serde(default)]
    pub defaults: DefaultSettings,

    /// Engine discovery and supervision
    #[serde(default)]
    pub engine: EngineSettings,

    /// Saved ingest servers
    #[serde(default)]
    pub servers: Vec<NamedServer>,

    /// Saved encoding profiles
    #[serde(default)]
    pub profiles: Vec<NamedProfile>,
}

/// Default selections used when the CLI is not told otherwise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// Quality preset used when no profile is named
    #[serde(default)]
    pub quality: QualityPreset,

    /// Server used when none is given
    #[serde(default)]
    pub server: Option<String>,

    /// Profile used when none is given (overrides `quality`)
    #[serde(default)]
    pub profile: Option<String>,

    /// Stream over UDP when the engine lacks SRT
    #[serde(default)]
    pub allow_fallback: bool,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            quality: QualityPreset::default(),
            server: None,
            profile: None,
            allow_fallback: false,
        }
    }
}

/// Engine discovery and process supervision settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engine executable tried before the well-known locations
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Bundled engine used when nothing else responds
    #[serde(default)]
    pub bundled_path: Option<PathBuf>,

    /// Bound on each `-version` probe
    #[serde(default = "default_version_timeout")]
    pub version_timeout_ms: u64,

    /// Bound on the `-protocols` probe
    #[serde(default = "default_protocol_timeout")]
    pub protocol_timeout_ms: u64,

    /// Grace period between the termination signal and a forced kill
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

fn default_version_timeout() -> u64 {
    3000
}

fn default_protocol_timeout() -> u64 {
    3000
}

fn default_stop_grace() -> u64 {
    5000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            path: None,
            bundled_path: None,
            version_timeout_ms: default_version_timeout(),
            protocol_timeout_ms: default_protocol_timeout(),
            stop_grace_ms: default_stop_grace(),
        }
    }
}

impl EngineSettings {
    pub fn version_timeout(&self) -> Duration {
        Duration::from_millis(self.version_timeout_ms)
    }

    pub fn protocol_timeout(&self) -> Duration {
        Duration::from_millis(self.protocol_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// A saved ingest server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedServer {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub endpoint: TransportEndpoint,
}

/// A saved encoding profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub profile: EncodingProfile,
}

impl SettingsStore for ConfigFile {
    fn profiles(&self) -> Vec<NamedProfile> {
        self.profiles.clone()
    }

    fn servers(&self) -> Vec<NamedServer> {
        self.servers.clone()
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("srtcast").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("srtcast")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/srtcast/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| SrtcastError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)?;

        let problems = config.validate();
        for problem in &problems {
            warn!("{}: {}", path.display(), problem);
        }

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SrtcastError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SrtcastError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| SrtcastError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Problems with saved entries, one line each
    ///
    /// Entries are still loaded; they fail again when used.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for (index, server) in self.servers.iter().enumerate() {
            if server.name.trim().is_empty() {
                problems.push(format!("Server {}: name is required", index + 1));
            }
            if let Err(errors) = server.endpoint.validate() {
                problems.push(format!("Server '{}': {}", server.name, errors));
            }
        }

        for (index, profile) in self.profiles.iter().enumerate() {
            if profile.name.trim().is_empty() {
                problems.push(format!("Profile {}: name is required", index + 1));
            }
            if let Err(errors) = profile.profile.validate() {
                problems.push(format!("Profile '{}': {}", profile.name, errors));
            }
        }

        if let Some(ref name) = self.defaults.server {
            if !self.servers.iter().any(|s| &s.name == name) {
                problems.push(format!("Default server '{}' is not defined", name));
            }
        }

        if let Some(ref name) = self.defaults.profile {
            if !self.profiles.iter().any(|p| &p.name == name) {
                problems.push(format!("Default profile '{}' is not defined", name));
            }
        }

        problems
    }

    /// Profile to use when the caller names none
    pub fn default_profile(&self) -> EncodingProfile {
        self.defaults
            .profile
            .as_deref()
            .and_then(|name| self.profile(name))
            .unwrap_or_else(|| self.defaults.quality.profile())
    }

    /// Server to use when the caller names none
    pub fn default_server(&self) -> Option<TransportEndpoint> {
        self.defaults
            .server
            .as_deref()
            .and_then(|name| self.server(name))
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# srtcast configuration
# https://github.com/ghostkellz/srtcast

[defaults]
# Quality preset used when no profile is named:
#   ultra-low, low, medium, high, ultra-high
quality = "medium"

# Server and profile picked when the command line names none
server = "local"
# profile = "gaming"

# Stream over plain UDP when the installed ffmpeg lacks SRT support
allow_fallback = false

[engine]
# Explicit ffmpeg binary, tried before the usual install locations
# path = "/opt/ffmpeg/bin/ffmpeg"

# Bundled ffmpeg used when nothing else responds (no SRT support assumed)
# bundled_path = "/usr/lib/srtcast/ffmpeg"

# Probe and shutdown bounds in milliseconds
version_timeout_ms = 3000
protocol_timeout_ms = 3000
stop_grace_ms = 5000

[[servers]]
name = "local"
description = "Local SRT server for testing"
host = "localhost"
port = 9999
mode = "caller"
latency = 120
maxbw = 10000
# passphrase = "change me"
# pbkeylen = 16
# streamid = "live/stream"

[[profiles]]
name = "gaming"
description = "1080p60 for fast motion"
resolution = "1920x1080"
frame_rate = 60
bitrate = 8000
preset = "veryfast"
profile = "high"
keyframe_interval = 120
"#
    .to_string()
}
