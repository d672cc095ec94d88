use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    /// Past this position, Previous restarts the current track instead of
    /// moving back in the queue.
    #[serde(default = "default_restart_threshold_ms")]
    pub restart_threshold_ms: u64,
    #[serde(default = "default_skip_retry_delay_ms")]
    pub skip_retry_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_end_confirm_delay_ms")]
    pub end_confirm_delay_ms: u64,
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub transcode: Option<TranscodeConfig>,
    #[serde(default)]
    pub search_endpoint: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeConfig {
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
}

fn default_volume() -> u8 {
    70
}

fn default_volume_step() -> u8 {
    5
}

fn default_restart_threshold_ms() -> u64 {
    3000
}

fn default_skip_retry_delay_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_end_confirm_delay_ms() -> u64 {
    500
}

fn default_user_agent() -> String {
    "TubeQueue/0.1.0".to_string()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_codec() -> String {
    "mp3".to_string()
}

fn default_bitrate() -> String {
    "192k".to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            codec: default_codec(),
            bitrate: default_bitrate(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            volume_step: default_volume_step(),
            restart_threshold_ms: default_restart_threshold_ms(),
            skip_retry_delay_ms: default_skip_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            end_confirm_delay_ms: default_end_confirm_delay_ms(),
            fetch_timeout_secs: None,
            cache_dir: None,
            transcode: None,
            search_endpoint: None,
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    pub fn config_dir() -> AppResult<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Config("Cannot find home directory".into()))?;
        Ok(home.join(".tubequeue"))
    }

    pub fn config_path() -> AppResult<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn load() -> AppResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> AppResult<()> {
        let dir = Self::config_dir()?;
        std::fs::create_dir_all(&dir)?;
        let path = Self::config_path()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Load the saved config, or fall back to defaults and write them out so
    /// the file exists next time.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            log::warn!("Failed to load config: {}. Using defaults.", e);
            let default_config = Self::default();
            if let Err(save_err) = default_config.save() {
                log::error!("Failed to save default config: {}", save_err);
            }
            default_config
        })
    }

    /// Where fetched tracks are cached. Falls back to the OS temp dir when
    /// the platform has no cache directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tubequeue")
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    pub fn tuning(&self) -> PlayerTuning {
        PlayerTuning {
            volume: self.volume.min(100),
            volume_step: self.volume_step,
            restart_threshold: Duration::from_millis(self.restart_threshold_ms),
            skip_retry_delay: Duration::from_millis(self.skip_retry_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            end_confirm_delay: Duration::from_millis(self.end_confirm_delay_ms),
            fetch_timeout: self.fetch_timeout(),
        }
    }
}

/// Timing and volume knobs the playback controller runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTuning {
    pub volume: u8,
    pub volume_step: u8,
    pub restart_threshold: Duration,
    pub skip_retry_delay: Duration,
    pub poll_interval: Duration,
    pub end_confirm_delay: Duration,
    pub fetch_timeout: Option<Duration>,
}

impl Default for PlayerTuning {
    fn default() -> Self {
        AppConfig::default().tuning()
    }
}
