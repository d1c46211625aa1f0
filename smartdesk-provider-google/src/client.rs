//! Thin Google Calendar REST client.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use smartdesk_core::DateRange;
use smartdesk_core::config::GoogleConfig;
use smartdesk_core::constants::{GOOGLE_MAX_RESULTS, GOOGLE_REQUEST_TIMEOUT_SECS};
use url::Url;

use crate::error::GoogleCalendarError;
use crate::types::{ApiErrorBody, CalendarListResponse, EventsResponse, GoogleCalendar, GoogleEvent};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// The two calls the event source needs.
pub trait GoogleApi: Send + Sync {
    fn list_calendars(
        &self,
    ) -> impl Future<Output = Result<Vec<GoogleCalendar>, GoogleCalendarError>> + Send;

    /// Expanded (single) events of one calendar overlapping `range`.
    fn list_events(
        &self,
        calendar_id: &str,
        range: &DateRange,
    ) -> impl Future<Output = Result<Vec<GoogleEvent>, GoogleCalendarError>> + Send;
}

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base: Url,
    access_token: String,
    timeout: Duration,
}

impl GoogleCalendarClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, GoogleCalendarError> {
        Ok(GoogleCalendarClient {
            http: reqwest::Client::builder().build()?,
            base: Url::parse(DEFAULT_API_BASE)?,
            access_token: access_token.into(),
            timeout: Duration::from_secs(GOOGLE_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn from_config(config: &GoogleConfig) -> Result<Self, GoogleCalendarError> {
        let token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(GoogleCalendarError::MissingToken)?;
        Ok(GoogleCalendarClient::new(token)?
            .with_base_url(&config.api_base)?
            .with_timeout(Duration::from_secs(config.request_timeout_secs)))
    }

    pub fn with_base_url(mut self, base: &str) -> Result<Self, GoogleCalendarError> {
        self.base = Url::parse(base.trim_end_matches('/'))?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GoogleCalendarError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| GoogleCalendarError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) fn calendar_list_url(&self, page_token: Option<&str>) -> Result<Url, GoogleCalendarError> {
        let mut url = self.endpoint(&["users", "me", "calendarList"])?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        Ok(url)
    }

    pub(crate) fn events_url(
        &self,
        calendar_id: &str,
        range: &DateRange,
        page_token: Option<&str>,
    ) -> Result<Url, GoogleCalendarError> {
        let mut url = self.endpoint(&["calendars", calendar_id, "events"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("timeMin", &range.start_rfc3339())
                .append_pair("timeMax", &range.end_rfc3339())
                .append_pair("singleEvents", "true")
                .append_pair("orderBy", "startTime")
                .append_pair("maxResults", &GOOGLE_MAX_RESULTS.to_string());
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GoogleCalendarError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|b| b.error.message)
                .unwrap_or(body);
            return Err(GoogleCalendarError::from_status(status.as_u16(), message));
        }

        Ok(response.json::<T>().await?)
    }
}

impl GoogleApi for GoogleCalendarClient {
    async fn list_calendars(&self) -> Result<Vec<GoogleCalendar>, GoogleCalendarError> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.calendar_list_url(page_token.as_deref())?;
            let page: CalendarListResponse = self.get_json(url).await?;
            calendars.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(calendars)
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        range: &DateRange,
    ) -> Result<Vec<GoogleEvent>, GoogleCalendarError> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = self.events_url(calendar_id, range, page_token.as_deref())?;
            let page: EventsResponse = self.get_json(url).await?;
            events.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(events)
    }
}
