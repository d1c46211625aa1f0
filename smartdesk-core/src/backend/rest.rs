//! PostgREST-style table backend (Supabase `/rest/v1`).

use std::sync::RwLock;

use reqwest::{RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{BackendError, BackendResult, Row, TableBackend};

/// Signed-in user session handed over by the auth layer.
#[derive(Clone, PartialEq, Eq)]
pub struct RestSession {
    pub access_token: String,
    pub user_id: String,
}

impl std::fmt::Debug for RestSession {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestSession")
            .field("access_token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .finish()
    }
}

pub struct RestBackend {
    base_url: String,
    anon_key: String,
    session: RwLock<Option<RestSession>>,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> BackendResult<Self> {
        Ok(Self {
            base_url: normalize_base_url(base_url.into())?,
            anon_key: anon_key.into(),
            session: RwLock::new(None),
            client: reqwest::Client::builder().build()?,
        })
    }

    pub fn with_session(self, session: RestSession) -> Self {
        self.set_session(Some(session));
        self
    }

    /// Replace the session, e.g. after a token refresh or sign-out.
    pub fn set_session(&self, session: Option<RestSession>) {
        let mut guard = self.session.write().unwrap_or_else(|e| e.into_inner());
        *guard = session;
    }

    fn session(&self) -> Option<RestSession> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());

        request
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .header("Accept", "application/json")
    }
}

impl TableBackend for RestBackend {
    fn current_user_id(&self) -> Option<String> {
        self.session().map(|s| s.user_id)
    }

    async fn select_all(&self, table: &str) -> BackendResult<Vec<Row>> {
        let response = self
            .authorize(self.client.get(self.table_url(table)))
            .query(&[("select", "*")])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<Row>>().await?)
    }

    async fn upsert(&self, table: &str, row: Row, on_conflict: &str) -> BackendResult<Row> {
        let response = self
            .authorize(self.client.post(self.table_url(table)))
            .query(&[("on_conflict", on_conflict)])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&vec![Value::Object(row)])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        response
            .json::<Vec<Row>>()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Rejected("upsert returned no rows".to_string()))
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> BackendResult<()> {
        let response = self
            .authorize(self.client.patch(self.table_url(table)))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=minimal")
            .json(&Value::Object(patch))
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }

    async fn delete(&self, table: &str, id: &str) -> BackendResult<()> {
        let response = self
            .authorize(self.client.delete(self.table_url(table)))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: reqwest::Response) -> BackendResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Rejected(parse_api_error(status, &body)))
}

#[derive(Debug, Deserialize)]
struct RestErrorBody {
    message: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RestErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return match payload.hint {
                Some(hint) => format!("{} ({}; {})", message.trim(), status.as_u16(), hint.trim()),
                None => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_base_url(raw: String) -> BackendResult<String> {
    let url = raw.trim();
    if url.is_empty() {
        return Err(BackendError::Rejected("backend url must not be empty".to_string()));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.trim_end_matches('/').to_string())
    } else {
        Err(BackendError::Rejected(
            "backend url must include http:// or https://".to_string(),
        ))
    }
}
