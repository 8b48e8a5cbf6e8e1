//! Configuration management for surfsync
//!
//! Settings are layered: defaults, then the system config file, then the
//! user config file, then `SURFSYNC_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::utils::error::{IntoSyncError, Result, SyncError};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sync engine configuration
    pub sync: SyncConfig,

    /// Video pipeline configuration
    pub video: VideoConfig,

    /// Audio configuration
    pub audio: AudioConfig,

    /// General application settings
    pub general: GeneralConfig,
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Fixed delay added to the audio clock before comparing (milliseconds)
    pub audio_delay_ms: i32,

    /// Output pipeline latency subtracted from the video clock (90 kHz ticks)
    pub output_latency_ticks: i64,

    /// Repeat every sixth field to show 50 Hz content on a 60 Hz display
    pub pulldown_60hz: bool,

    /// Replace held video with a black picture while draining
    pub black_picture: bool,

    /// Draining ticks before the black picture replaces held video
    pub black_picture_after_ticks: u32,

    /// Ticks without input after `set_closing` before the stream counts as drained
    pub closing_ticks: u32,

    /// Whether the first decoder of a group syncs its display to audio
    pub sync_to_audio: bool,
}

/// Video pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Decoded surfaces that may be pending display
    pub ring_capacity: usize,

    /// Surfaces allocated when the codec does not report a requirement
    pub pool_capacity: usize,

    /// Prefer a hardware decode backend over host-memory surfaces
    pub hw_accel: bool,
}

/// Which audio paths the drift corrector adjusts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftCorrection {
    /// No correction
    None,

    /// Resampler compensation for decoded PCM
    Pcm,

    /// Burst size adjustment for AC-3 passthrough
    Passthrough,

    /// Both paths
    Both,
}

impl DriftCorrection {
    /// Whether resampler compensation is enabled
    pub fn corrects_pcm(self) -> bool {
        matches!(self, Self::Pcm | Self::Both)
    }

    /// Whether passthrough burst correction is enabled
    pub fn corrects_passthrough(self) -> bool {
        matches!(self, Self::Passthrough | Self::Both)
    }
}

/// Audio configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Drift correction mode
    pub drift_correction: DriftCorrection,

    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            audio_delay_ms: 0,
            output_latency_ticks: 0,
            pulldown_60hz: false,
            black_picture: false,
            black_picture_after_ticks: 50,
            closing_ticks: 25,
            sync_to_audio: true,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 8,
            pool_capacity: 12,
            hw_accel: true,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            drift_correction: DriftCorrection::Pcm,
            sample_rate: 48000,
            channels: 2,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Audio delay offset in 90 kHz ticks
    pub fn audio_delay_ticks(&self) -> i64 {
        self.audio_delay_ms as i64 * 90
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/surfsync/config.toml on Linux)
    /// 3. User config file (~/.config/surfsync/config.toml on Linux)
    /// 4. Environment variables (SURFSYNC_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::read_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::read_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self)
            .config_err("Failed to serialize config")?;

        std::fs::write(path, toml)
            .config_err("Failed to write config file")?;

        Ok(())
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| SyncError::Config("Cannot determine user config path".to_string()))?;
        self.save_to(&path)
    }

    /// Parse a TOML file. Missing keys keep their defaults.
    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .config_err("Failed to read config file")?;

        toml::from_str(&contents)
            .config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // Example: SURFSYNC_AUDIO_DELAY_MS=-40
        if let Ok(delay) = std::env::var("SURFSYNC_AUDIO_DELAY_MS") {
            self.sync.audio_delay_ms = delay.parse()
                .map_err(|_| SyncError::Config("Invalid SURFSYNC_AUDIO_DELAY_MS".to_string()))?;
        }

        if let Ok(capacity) = std::env::var("SURFSYNC_RING_CAPACITY") {
            self.video.ring_capacity = capacity.parse()
                .map_err(|_| SyncError::Config("Invalid SURFSYNC_RING_CAPACITY".to_string()))?;
        }

        if let Ok(pulldown) = std::env::var("SURFSYNC_PULLDOWN_60HZ") {
            self.sync.pulldown_60hz = pulldown.parse()
                .map_err(|_| SyncError::Config("Invalid SURFSYNC_PULLDOWN_60HZ".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("SURFSYNC_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Interlaced display needs the shown frame plus both fields of the next pair.
        if self.video.ring_capacity < 4 {
            return Err(SyncError::Config("Ring capacity must be at least 4".to_string()));
        }

        if self.video.pool_capacity == 0 {
            return Err(SyncError::Config("Pool capacity must be non-zero".to_string()));
        }

        if !(-5000..=5000).contains(&self.sync.audio_delay_ms) {
            return Err(SyncError::Config("Audio delay must be within +/-5000 ms".to_string()));
        }

        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return Err(SyncError::Config("Audio format must be non-zero".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(SyncError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("PROGRAMDATA").ok()
                .map(|p| PathBuf::from(p).join("surfsync").join("config.toml"))
        } else if cfg!(target_os = "macos") {
            Some(PathBuf::from("/Library/Application Support/surfsync/config.toml"))
        } else {
            Some(PathBuf::from("/etc/surfsync/config.toml"))
        }
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("surfsync").join("config.toml"))
    }
}
