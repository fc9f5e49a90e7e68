use std::str::FromStr;

use chrono_tz::Tz;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite database file.
    pub database_path: String,
    /// IANA timezone all scheduling arithmetic happens in.
    pub timezone: String,
    /// Local hour (0..=23) at which the daily digest goes out.
    pub digest_hour: u32,
    /// Seconds between reminder scan ticks.
    pub scan_interval_secs: u64,
    /// Default wall-clock time for quick-due presets.
    pub default_due_hour: u32,
    pub default_due_minute: u32,
    /// Category names offered when filing tasks.
    pub categories: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "nudge.db".to_string(),
            timezone: "Asia/Tashkent".to_string(),
            digest_hour: 9,
            scan_interval_secs: 60,
            default_due_hour: nudge_core::quick_due::DEFAULT_DUE_HOUR,
            default_due_minute: nudge_core::quick_due::DEFAULT_DUE_MINUTE,
            categories: [
                "Work", "Personal", "Study", "Health", "Family", "Project",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Config {
    /// Loads from the given TOML file (missing file is fine) with
    /// `NUDGE_`-prefixed environment variables layered on top.
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("NUDGE_"))
            .extract()
    }

    pub fn timezone(&self) -> anyhow::Result<Tz> {
        Tz::from_str(&self.timezone).map_err(|_| {
            anyhow::anyhow!(
                "Invalid timezone: '{}'. Use IANA timezone names like 'Asia/Tashkent'",
                self.timezone
            )
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.digest_hour > 23 {
            anyhow::bail!("digest_hour must be 0..=23, got {}", self.digest_hour);
        }
        if self.default_due_hour > 23 || self.default_due_minute > 59 {
            anyhow::bail!(
                "default due time {:02}:{:02} is not a valid wall-clock time",
                self.default_due_hour,
                self.default_due_minute
            );
        }
        if self.scan_interval_secs == 0 {
            anyhow::bail!("scan_interval_secs must be positive");
        }
        if self.categories.is_empty() {
            anyhow::bail!("at least one category is required");
        }
        self.timezone()?;
        Ok(())
    }
}
