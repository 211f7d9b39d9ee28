//! Settings consumed by the update monitor
//!
//! Loaded from a TOML file. Every section and key is optional and falls back
//! to the defaults of a stock dedicated server install.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `server.rcon_password`
pub const PASSWORD_ENV: &str = "PZ_RCON_PASSWORD";

/// Longest accepted restart countdown, minutes
pub const MAX_LEAD_MINUTES: u64 = 24 * 60;

/// Main settings object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub steam: SteamSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub restart: RestartSettings,
    #[serde(default)]
    pub logs: LogSettings,
}

/// Game server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// RCON host
    pub host: String,
    /// RCON port (RCONPort in the server ini)
    pub rcon_port: u16,
    /// RCON password (RCONPassword in the server ini)
    pub rcon_password: String,
    /// systemd unit running the dedicated server
    pub service_name: String,
    /// Prefix `systemctl` with `sudo`
    pub use_sudo: bool,
    /// Connect and round-trip timeout, seconds
    pub timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            rcon_port: 27015,
            rcon_password: String::new(),
            service_name: "zomboid".to_string(),
            use_sudo: true,
            timeout_secs: 10,
        }
    }
}

impl ServerSettings {
    /// `host:port` of the admin listener
    pub fn rcon_address(&self) -> String {
        format!("{}:{}", self.host, self.rcon_port)
    }
}

/// Steam version source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamSettings {
    /// Dedicated server app id
    pub app_id: String,
    /// Branch whose build id is tracked
    pub branch: String,
    /// Workshop item ids to track individually
    pub workshop_items: Vec<String>,
    /// HTTP request timeout, seconds
    pub timeout_secs: u64,
}

impl Default for SteamSettings {
    fn default() -> Self {
        Self {
            app_id: "108600".to_string(),
            branch: "public".to_string(),
            workshop_items: Vec::new(),
            timeout_secs: 10,
        }
    }
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Seconds between cycles
    pub check_interval_secs: u64,
    /// Seconds added to the interval after a failed cycle
    pub error_cooldown_secs: u64,
    /// Track the server build through the version source
    pub check_game: bool,
    /// Ask the server to evaluate its workshop mods each cycle
    pub check_mods: bool,
    /// Path of the version database
    pub database_path: PathBuf,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 300,
            error_cooldown_secs: 60,
            check_game: true,
            check_mods: true,
            database_path: PathBuf::from("pz_versions.db"),
        }
    }
}

impl MonitorSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        Duration::from_secs(self.error_cooldown_secs)
    }

    /// Pause before the cycle following a failed one. Never shorter than
    /// the regular interval.
    pub fn retry_delay(&self) -> Duration {
        self.check_interval().saturating_add(self.error_cooldown())
    }
}

/// Restart countdown settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartSettings {
    /// Countdown between the first notice and the restart, minutes
    pub lead_minutes: u64,
    /// Short-lead warning is sent this many minutes before the restart
    pub final_warning_minutes: u64,
    /// Pause after the final broadcast so players can read it, seconds
    pub notice_pause_secs: u64,
    /// Pause after `save` before restarting, seconds
    pub save_settle_secs: u64,
}

impl Default for RestartSettings {
    fn default() -> Self {
        Self {
            lead_minutes: 30,
            final_warning_minutes: 1,
            notice_pause_secs: 5,
            save_settle_secs: 10,
        }
    }
}

impl RestartSettings {
    pub fn lead(&self) -> Duration {
        Duration::from_secs(self.lead_minutes.saturating_mul(60))
    }

    pub fn notice_pause(&self) -> Duration {
        Duration::from_secs(self.notice_pause_secs)
    }

    pub fn save_settle(&self) -> Duration {
        Duration::from_secs(self.save_settle_secs)
    }

    /// Offset from arming at which the short-lead warning fires
    pub fn final_warning_at(&self) -> Duration {
        let minutes = self.lead_minutes.saturating_sub(self.final_warning_minutes);
        Duration::from_secs(minutes.saturating_mul(60))
    }
}

/// Server log evidence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Explicit log files to scan. Empty means auto-discover.
    pub files: Vec<PathBuf>,
    /// Directories searched when `files` is empty
    pub search_dirs: Vec<PathBuf>,
    /// Bytes read from the end of the chosen log
    pub window_bytes: u64,
    /// Fall back to `journalctl -u <service>` when no file is found
    pub use_journal: bool,
    /// Journal lookback, minutes
    pub journal_minutes: u64,
    /// Wait between `checkModsNeedUpdate` and scanning, seconds
    pub settle_secs: u64,
}

impl Default for LogSettings {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            files: Vec::new(),
            search_dirs: vec![
                PathBuf::from(&home).join("Zomboid/Logs"),
                PathBuf::from(&home).join("Zomboid"),
            ],
            window_bytes: 50 * 1024,
            use_journal: true,
            journal_minutes: 10,
            settle_secs: 8,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut settings = Self::from_toml(&content)?;
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            settings.server.rcon_password = password;
        }
        Ok(settings)
    }

    /// Parse settings from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.rcon_password.is_empty() {
            return Err(MonitorError::Config(
                "server.rcon_password is required".to_string(),
            ));
        }
        if self.monitor.check_interval_secs == 0 {
            return Err(MonitorError::Config(
                "monitor.check_interval_secs must be positive".to_string(),
            ));
        }
        if self.restart.lead_minutes > MAX_LEAD_MINUTES {
            return Err(MonitorError::Config(format!(
                "restart.lead_minutes ({}) must be at most {}",
                self.restart.lead_minutes, MAX_LEAD_MINUTES
            )));
        }
        if self.restart.final_warning_minutes >= self.restart.lead_minutes {
            return Err(MonitorError::Config(format!(
                "restart.final_warning_minutes ({}) must be less than restart.lead_minutes ({})",
                self.restart.final_warning_minutes, self.restart.lead_minutes
            )));
        }
        Ok(())
    }
}
