use smartdesk_core::{ProviderErrorKind, SmartDeskError};
use thiserror::Error;

/// Google Calendar API failures, classified by HTTP status.
#[derive(Error, Debug)]
pub enum GoogleCalendarError {
    #[error("No Google access token configured")]
    MissingToken,

    #[error("Google session expired, please sign in again")]
    Unauthorized,

    #[error("Access to Google Calendar denied: {0}")]
    Forbidden(String),

    #[error("Google calendar not found: {0}")]
    NotFound(String),

    #[error("Google Calendar rate limit exceeded, try again later")]
    RateLimited,

    #[error("Google Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Google Calendar request timed out")]
    Timeout,

    #[error("Google Calendar request failed: {0}")]
    Http(String),

    #[error("Unexpected Google Calendar response: {0}")]
    Decode(String),

    #[error("Invalid Google Calendar URL: {0}")]
    InvalidUrl(String),
}

impl GoogleCalendarError {
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => GoogleCalendarError::Unauthorized,
            403 => GoogleCalendarError::Forbidden(message),
            404 => GoogleCalendarError::NotFound(message),
            429 => GoogleCalendarError::RateLimited,
            _ => GoogleCalendarError::Api { status, message },
        }
    }

    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            GoogleCalendarError::MissingToken
            | GoogleCalendarError::Unauthorized
            | GoogleCalendarError::Forbidden(_) => ProviderErrorKind::Auth,
            GoogleCalendarError::NotFound(_) => ProviderErrorKind::NotFound,
            GoogleCalendarError::RateLimited => ProviderErrorKind::RateLimited,
            GoogleCalendarError::Timeout | GoogleCalendarError::Http(_) => ProviderErrorKind::Network,
            GoogleCalendarError::Api { status, .. } if *status >= 500 => ProviderErrorKind::Network,
            GoogleCalendarError::Api { .. }
            | GoogleCalendarError::Decode(_)
            | GoogleCalendarError::InvalidUrl(_) => ProviderErrorKind::Other,
        }
    }
}

impl From<reqwest::Error> for GoogleCalendarError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GoogleCalendarError::Timeout
        } else if e.is_decode() {
            GoogleCalendarError::Decode(e.to_string())
        } else {
            GoogleCalendarError::Http(e.to_string())
        }
    }
}

impl From<url::ParseError> for GoogleCalendarError {
    fn from(e: url::ParseError) -> Self {
        GoogleCalendarError::InvalidUrl(e.to_string())
    }
}

impl From<GoogleCalendarError> for SmartDeskError {
    fn from(e: GoogleCalendarError) -> Self {
        SmartDeskError::provider("google", e.kind(), e.to_string())
    }
}
