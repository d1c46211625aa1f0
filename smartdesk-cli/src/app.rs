use std::sync::Arc;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use smartdesk_core::SmartDeskConfig;
use smartdesk_core::backend::{RestBackend, RestSession};

pub struct App {
    pub config: SmartDeskConfig,
    pub tz: Tz,
}

impl App {
    pub fn load() -> Result<Self> {
        let mut config = SmartDeskConfig::load()?;
        // An untouched config follows the machine's zone.
        if config.time_zone == "UTC" {
            if let Ok(system) = iana_time_zone::get_timezone() {
                config.time_zone = system;
            }
        }
        let tz = config.time_zone()?;
        Ok(App { config, tz })
    }

    /// The REST backend, if `[backend]` has a URL and key.
    pub fn backend(&self) -> Result<Option<Arc<RestBackend>>> {
        let backend = &self.config.backend;
        let (Some(url), Some(anon_key)) = (&backend.url, &backend.anon_key) else {
            return Ok(None);
        };

        let rest = RestBackend::new(url.as_str(), anon_key.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid backend configuration: {}", e))?;
        let rest = match (&backend.access_token, &backend.user_id) {
            (Some(access_token), Some(user_id)) => rest.with_session(RestSession {
                access_token: access_token.clone(),
                user_id: user_id.clone(),
            }),
            _ => rest,
        };
        Ok(Some(Arc::new(rest)))
    }

    pub fn require_backend(&self) -> Result<Arc<RestBackend>> {
        self.backend()?.with_context(|| {
            format!(
                "No backend configured.\n\n\
                Set [backend] url and anon_key in {}\n\
                or SMARTDESK_BACKEND__URL and SMARTDESK_BACKEND__ANON_KEY.",
                SmartDeskConfig::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "the config file".into())
            )
        })
    }
}
