use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::gl::TextureFilter;
use crate::validate_enum;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,

    #[serde(default)]
    pub playback: PlaybackSettings,

    #[serde(default)]
    pub pump: PumpSettings,

    #[serde(default)]
    pub texture: TextureSettings,

    #[serde(default)]
    pub engine: EngineSettings,
}

/// General settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralSettings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Transport state applied right after a movie loads
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlaybackSettings {
    #[serde(default = "default_true")]
    pub autoplay: bool,

    #[serde(default)]
    pub looping: bool,

    /// Negative values load the movie muted
    #[serde(default = "default_volume")]
    pub volume: f32,

    #[serde(default = "default_rate")]
    pub rate: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            autoplay: true,
            looping: false,
            volume: default_volume(),
            rate: default_rate(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_volume() -> f32 {
    1.0
}
fn default_rate() -> f64 {
    1.0
}

/// How often and how long the engine gets pumped
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PumpSettings {
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    #[serde(default = "default_task_budget_ms")]
    pub task_budget_ms: u64,

    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            task_budget_ms: default_task_budget_ms(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_tick_hz() -> u32 {
    60
}
fn default_task_budget_ms() -> u64 {
    10
}
fn default_stats_interval_secs() -> u64 {
    5
}

impl PumpSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn task_budget(&self) -> Duration {
        Duration::from_millis(self.task_budget_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}

/// Texture sampling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextureSettings {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "linear".to_string()
}

impl TextureSettings {
    /// Filter mode; anything unrecognised samples linearly
    pub fn filter_mode(&self) -> TextureFilter {
        match self.filter.as_str() {
            "nearest" => TextureFilter::Nearest,
            _ => TextureFilter::Linear,
        }
    }
}

/// Decode engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineSettings {
    /// Upper bound on the wait for a movie's dimensions at load time
    #[serde(default = "default_preroll_timeout_ms")]
    pub preroll_timeout_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            preroll_timeout_ms: default_preroll_timeout_ms(),
        }
    }
}

fn default_preroll_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded configuration from {}", path.display());
        config.validate()?;

        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("movietex");

        Ok(config_dir.join("config.toml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        self.validate_log_level(&self.general.log_level)?;
        self.validate_filter(&self.texture.filter)?;

        let volume = self.playback.volume;
        if !(-1.0..=1.0).contains(&volume) {
            anyhow::bail!("Invalid volume (must be -1.0 to 1.0): {}", volume);
        }
        if !self.playback.rate.is_finite() {
            anyhow::bail!("Invalid playback rate: {}", self.playback.rate);
        }

        if !(1..=1000).contains(&self.pump.tick_hz) {
            anyhow::bail!("Invalid tick rate (must be 1-1000 Hz): {}", self.pump.tick_hz);
        }
        if self.pump.task_budget_ms == 0 {
            anyhow::bail!("Task budget must be at least 1 ms");
        }

        Ok(())
    }

    fn validate_log_level(&self, level: &str) -> Result<()> {
        validate_enum!(level, "trace", "debug", "info", "warn", "error")
    }

    fn validate_filter(&self, filter: &str) -> Result<()> {
        validate_enum!(filter, "linear", "nearest")
    }
}
