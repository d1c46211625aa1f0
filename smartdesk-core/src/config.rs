//! Smart Desk configuration.
//!
//! Read from `<config_dir>/smartdesk/config.toml`, overridden by
//! `SMARTDESK_`-prefixed environment variables (`__` between section and
//! key, e.g. `SMARTDESK_BACKEND__URL`). Durations are humantime strings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUFFER_DAYS, DEFAULT_CACHE_KEY_PREFIX, DEFAULT_CACHE_MAX_AGE_HOURS,
    GOOGLE_REQUEST_TIMEOUT_SECS,
};
use crate::error::{SmartDeskError, SmartDeskResult};
use crate::event_cache::BufferDays;
use crate::feed::FeedOptions;
use crate::query_cache::PersistedCache;
use crate::retry::RetryPolicy;
use crate::sync::SyncSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL of the REST backend, e.g. `https://xyz.supabase.co`.
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub access_token: Option<String>,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub refetch_interval: String,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        GoogleConfig {
            access_token: None,
            api_base: "https://www.googleapis.com/calendar/v3".into(),
            request_timeout_secs: GOOGLE_REQUEST_TIMEOUT_SECS,
            refetch_interval: "5m".into(),
        }
    }
}

/// A feed listed in the config file rather than stored in the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcsFeedConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IcsConfig {
    pub refetch_interval: String,
    pub feeds: Vec<IcsFeedConfig>,
}

impl Default for IcsConfig {
    fn default() -> Self {
        IcsConfig {
            refetch_interval: "15m".into(),
            feeds: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub buffer_days_before: i64,
    pub buffer_days_after: i64,
    pub key_prefix: String,
    pub max_age_hours: u64,
    /// Defaults to `<cache_dir>/smartdesk`.
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            buffer_days_before: DEFAULT_BUFFER_DAYS,
            buffer_days_after: DEFAULT_BUFFER_DAYS,
            key_prefix: DEFAULT_CACHE_KEY_PREFIX.into(),
            max_age_hours: DEFAULT_CACHE_MAX_AGE_HOURS,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tick_every: String,
    pub stale_after: String,
    /// Per-feature overrides, keyed by feature (`tasks = "30s"`).
    pub intervals: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            tick_every: "15s".into(),
            stale_after: "5m".into(),
            intervals: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: String,
    pub max_delay: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay: "1s".into(),
            max_delay: "30s".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmartDeskConfig {
    pub backend: BackendConfig,
    pub google: GoogleConfig,
    pub ics: IcsConfig,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    /// IANA zone used for all-day and floating times.
    pub time_zone: String,
}

impl Default for SmartDeskConfig {
    fn default() -> Self {
        SmartDeskConfig {
            backend: BackendConfig::default(),
            google: GoogleConfig::default(),
            ics: IcsConfig::default(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
            retry: RetryConfig::default(),
            time_zone: "UTC".into(),
        }
    }
}

impl SmartDeskConfig {
    pub fn config_path() -> SmartDeskResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SmartDeskError::Config("Could not determine config directory".into()))?
            .join("smartdesk");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, writing a commented default file the
    /// first time.
    pub fn load() -> SmartDeskResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            if let Err(e) = Self::create_default_config(&path) {
                tracing::warn!("{}", e);
            }
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> SmartDeskResult<Self> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("SMARTDESK")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SmartDeskError::Config(e.to_string()))
    }

    /// Write a config file with every option commented out.
    pub fn create_default_config(path: &Path) -> SmartDeskResult<()> {
        let contents = format!(
            "\
# Smart Desk configuration

# time_zone = \"UTC\"

[backend]
# url = \"https://your-project.supabase.co\"
# anon_key = \"...\"
# access_token = \"...\"
# user_id = \"...\"

[google]
# access_token = \"...\"
# request_timeout_secs = {GOOGLE_REQUEST_TIMEOUT_SECS}
# refetch_interval = \"5m\"

[ics]
# refetch_interval = \"15m\"
# feeds = [{{ name = \"Holidays\", url = \"webcal://example.com/holidays.ics\", color = \"#33aa55\" }}]

[cache]
# buffer_days_before = {DEFAULT_BUFFER_DAYS}
# buffer_days_after = {DEFAULT_BUFFER_DAYS}
# max_age_hours = {DEFAULT_CACHE_MAX_AGE_HOURS}

[sync]
# tick_every = \"15s\"
# stale_after = \"5m\"

[sync.intervals]
# tasks = \"30s\"

[retry]
# max_attempts = 3
# base_delay = \"1s\"
# max_delay = \"30s\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SmartDeskError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SmartDeskError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn time_zone(&self) -> SmartDeskResult<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| SmartDeskError::Config(format!("Unknown time zone '{}'", self.time_zone)))
    }

    pub fn buffer(&self) -> BufferDays {
        BufferDays {
            before: self.cache.buffer_days_before,
            after: self.cache.buffer_days_after,
        }
    }

    pub fn retry_policy(&self) -> SmartDeskResult<RetryPolicy> {
        Ok(RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: parse_duration("retry.base_delay", &self.retry.base_delay)?,
            max_delay: parse_duration("retry.max_delay", &self.retry.max_delay)?,
        })
    }

    pub fn google_feed_options(&self) -> SmartDeskResult<FeedOptions> {
        self.feed_options("google.refetch_interval", &self.google.refetch_interval)
    }

    pub fn ics_feed_options(&self) -> SmartDeskResult<FeedOptions> {
        self.feed_options("ics.refetch_interval", &self.ics.refetch_interval)
    }

    pub fn sync_settings(&self) -> SmartDeskResult<SyncSettings> {
        Ok(SyncSettings {
            tick_every: parse_duration("sync.tick_every", &self.sync.tick_every)?,
            stale_after: parse_duration("sync.stale_after", &self.sync.stale_after)?,
        })
    }

    /// Interval for one sync feature, falling back to `default`.
    pub fn sync_interval(&self, key: &str, default: Duration) -> SmartDeskResult<Duration> {
        match self.sync.intervals.get(key) {
            Some(value) => parse_duration(&format!("sync.intervals.{key}"), value),
            None => Ok(default),
        }
    }

    pub fn persisted_cache(&self) -> SmartDeskResult<PersistedCache> {
        let dir = match &self.cache.dir {
            Some(dir) => dir.clone(),
            None => PersistedCache::default_dir()?,
        };
        Ok(PersistedCache::new(
            dir,
            self.cache.key_prefix.clone(),
            Duration::from_secs(self.cache.max_age_hours.saturating_mul(3600)),
        ))
    }

    fn feed_options(&self, field: &str, refetch_interval: &str) -> SmartDeskResult<FeedOptions> {
        Ok(FeedOptions {
            buffer: self.buffer(),
            refetch_interval: parse_duration(field, refetch_interval)?,
            retry: self.retry_policy()?,
        })
    }
}

fn parse_duration(field: &str, value: &str) -> SmartDeskResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| SmartDeskError::Config(format!("Invalid duration for {field} ('{value}'): {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SmartDeskConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.time_zone().unwrap(), chrono_tz::UTC);
        assert_eq!(config.buffer(), BufferDays::default());
        assert_eq!(config.google.request_timeout_secs, 10);
        assert_eq!(config.retry_policy().unwrap(), RetryPolicy::default());
    }

    #[test]
    fn default_file_parses_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smartdesk").join("config.toml");
        SmartDeskConfig::create_default_config(&path).unwrap();

        let config = SmartDeskConfig::load_from(&path).unwrap();
        assert_eq!(config.cache.key_prefix, DEFAULT_CACHE_KEY_PREFIX);
        assert!(config.ics.feeds.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
time_zone = "Europe/Berlin"

[cache]
buffer_days_before = 7

[sync.intervals]
tasks = "45s"

[[ics.feeds]]
name = "Holidays"
url = "webcal://example.com/h.ics"
"#,
        )
        .unwrap();

        let config = SmartDeskConfig::load_from(&path).unwrap();

        assert_eq!(config.time_zone().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.buffer().before, 7);
        assert_eq!(config.buffer().after, DEFAULT_BUFFER_DAYS);
        assert_eq!(
            config.sync_interval("tasks", Duration::from_secs(60)).unwrap(),
            Duration::from_secs(45)
        );
        assert_eq!(
            config.sync_interval("notes", Duration::from_secs(60)).unwrap(),
            Duration::from_secs(60)
        );
        assert_eq!(config.ics.feeds[0].name, "Holidays");
    }

    #[test]
    fn huge_cache_max_age_saturates() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SmartDeskConfig::default();
        config.cache.dir = Some(dir.path().to_path_buf());
        config.cache.max_age_hours = u64::MAX;

        let cache = config.persisted_cache().unwrap();
        cache.save("events", &vec![1, 2, 3]).unwrap();
        assert_eq!(cache.load::<Vec<i32>>("events"), Some(vec![1, 2, 3]));
    }

    #[test]
    fn bad_values_are_config_errors() {
        let config = SmartDeskConfig {
            time_zone: "Mars/Olympus".into(),
            ..SmartDeskConfig::default()
        };
        assert!(matches!(config.time_zone(), Err(SmartDeskError::Config(_))));

        let mut config = SmartDeskConfig::default();
        config.retry.base_delay = "soon".into();
        let err = config.retry_policy().unwrap_err();
        assert!(err.to_string().contains("retry.base_delay"));
    }
}
