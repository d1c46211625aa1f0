//! Disk-backed warm-start cache.
//!
//! Entries are JSON envelopes stamped with their save time and dropped once
//! older than the configured max age. Nothing here is authoritative: a miss
//! or a corrupt file just means the next fetch starts cold.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{SmartDeskError, SmartDeskResult};

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    saved_at: DateTime<Utc>,
    data: T,
}

#[derive(Debug, Clone)]
pub struct PersistedCache {
    dir: PathBuf,
    key_prefix: String,
    max_age: Duration,
}

impl PersistedCache {
    pub fn new(dir: impl Into<PathBuf>, key_prefix: impl Into<String>, max_age: Duration) -> Self {
        PersistedCache {
            dir: dir.into(),
            key_prefix: key_prefix.into(),
            max_age,
        }
    }

    /// `<cache_dir>/smartdesk`
    pub fn default_dir() -> SmartDeskResult<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("smartdesk"))
            .ok_or_else(|| SmartDeskError::Config("Could not determine cache directory".into()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> SmartDeskResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let envelope = Envelope {
            saved_at: Utc::now(),
            data,
        };
        let content = serde_json::to_string(&envelope)?;
        std::fs::write(self.path_for(key), content)?;
        Ok(())
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let content = std::fs::read_to_string(&path).ok()?;

        let envelope: Envelope<T> = match serde_json::from_str(&content) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Discarding unreadable cache entry {}: {}", path.display(), e);
                let _ = std::fs::remove_file(&path);
                return None;
            }
        };

        let age = (Utc::now() - envelope.saved_at).to_std().unwrap_or_default();
        if age > self.max_age {
            tracing::debug!("Cache entry {} expired", key);
            let _ = std::fs::remove_file(&path);
            return None;
        }

        Some(envelope.data)
    }

    /// Remove every entry carrying this cache's prefix. Returns how many went.
    pub fn clear(&self) -> SmartDeskResult<usize> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Ok(0);
        };

        let mut removed = 0;
        for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
            let owned = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&self.key_prefix) && n.ends_with(".json"));
            if owned {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}{}.json", self.key_prefix, safe))
    }
}
