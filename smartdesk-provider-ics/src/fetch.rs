use std::future::Future;
use std::time::Duration;

use smartdesk_core::{ProviderErrorKind, SmartDeskError, SmartDeskResult};
use url::Url;

const FETCH_TIMEOUT_SECS: u64 = 15;

/// Downloads the raw text of a feed.
pub trait FeedFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = SmartDeskResult<String>> + Send;
}

/// `webcal://` is plain HTTPS under another scheme.
pub fn normalize_feed_url(raw: &str) -> SmartDeskResult<Url> {
    let trimmed = raw.trim();
    let rewritten = match trimmed.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("webcal") => format!("https://{rest}"),
        _ => trimmed.to_string(),
    };
    let url = Url::parse(&rewritten).map_err(|e| {
        SmartDeskError::provider("ics", ProviderErrorKind::Other, format!("{raw}: {e}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SmartDeskError::provider(
            "ics",
            ProviderErrorKind::Other,
            format!("Unsupported feed scheme '{other}'"),
        )),
    }
}

pub struct HttpFeedFetcher {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new() -> SmartDeskResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("smartdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(http_error)?;
        Ok(HttpFeedFetcher {
            http,
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> SmartDeskResult<String> {
        let url = normalize_feed_url(url)?;
        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        if !status.is_success() {
            let kind = match status.as_u16() {
                401 | 403 => ProviderErrorKind::Auth,
                404 => ProviderErrorKind::NotFound,
                429 => ProviderErrorKind::RateLimited,
                s if s >= 500 => ProviderErrorKind::Network,
                _ => ProviderErrorKind::Other,
            };
            return Err(SmartDeskError::provider(
                "ics",
                kind,
                format!("{url} returned {status}"),
            ));
        }

        response.text().await.map_err(http_error)
    }
}

fn http_error(e: reqwest::Error) -> SmartDeskError {
    let kind = if e.is_timeout() || e.is_connect() || e.is_request() {
        ProviderErrorKind::Network
    } else {
        ProviderErrorKind::Other
    };
    SmartDeskError::provider("ics", kind, e.to_string())
}
