//! PostgREST-backed remote store
//!
//! Talks to the `/rest/v1/<table>` endpoint exposed by Supabase. Rows are
//! filtered by the `user_id` column, and row-level security on the server
//! side is expected to agree with the access token we send.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::config::Config;
use crate::models::{RemoteRow, RowPayload};

/// Connect timeout in seconds
const CONNECT_TIMEOUT: u64 = 10;

/// Overall request timeout in seconds
const REQUEST_TIMEOUT: u64 = 30;

/// Remote store speaking the PostgREST dialect over HTTPS
#[derive(Debug, Clone)]
pub struct RestRemote {
    client: Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct InsertedRow {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
}

impl RestRemote {
    /// Create a client for `table` under `base_url`
    pub fn new(base_url: impl Into<String>, table: impl Into<String>) -> RemoteResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("hypo/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: table.into(),
            api_key: None,
            access_token: None,
        })
    }

    /// Build a client from configuration
    ///
    /// Returns `Ok(None)` when no remote URL is configured.
    pub fn from_config(config: &Config) -> RemoteResult<Option<Self>> {
        let Some(url) = config.remote_url.as_deref() else {
            return Ok(None);
        };

        let mut remote = Self::new(url, config.remote_table.clone())?;
        if let Some(key) = &config.remote_api_key {
            remote = remote.with_api_key(key.clone());
        }
        if let Some(token) = &config.access_token {
            remote = remote.with_access_token(token.clone());
        }
        Ok(Some(remote))
    }

    /// Project API key, sent as the `apikey` header
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// User access token, sent as a bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Endpoint for the configured table
    pub fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }
        // Without a user token PostgREST accepts the anon key as bearer
        if let Some(token) = self.access_token.as_ref().or(self.api_key.as_ref()) {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_connect() {
                RemoteError::Unreachable(e.to_string())
            } else {
                RemoteError::Http(e)
            }
        })?;
        check(response).await
    }
}

/// Turn a non-success response into [`RemoteError::Status`]
async fn check(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Render ids as a PostgREST `in` filter value
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected id {}", other))),
    }
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn select_by_owner(&self, owner_id: &str) -> RemoteResult<Vec<RemoteRow>> {
        let request = self.client.get(self.endpoint()).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", owner_id)),
            ("order", "created_at.asc".to_string()),
        ]);
        let response = self.send(request).await?;
        let rows: Vec<RemoteRow> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        debug!("Fetched {} remote rows", rows.len());
        Ok(rows)
    }

    async fn insert(&self, payload: &RowPayload) -> RemoteResult<String> {
        let request = self
            .client
            .post(self.endpoint())
            .header("Prefer", "return=representation")
            .json(payload);
        let response = self.send(request).await?;
        let inserted: Vec<InsertedRow> = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        inserted
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| RemoteError::InvalidResponse("insert returned no rows".into()))
    }

    async fn update(&self, id: &str, payload: &RowPayload) -> RemoteResult<()> {
        let request = self
            .client
            .patch(self.endpoint())
            .query(&[("id", format!("eq.{}", id))])
            .json(payload);
        self.send(request).await?;
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> RemoteResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .delete(self.endpoint())
            .query(&[("id", in_filter(ids))]);
        self.send(request).await?;
        debug!("Deleted {} remote rows", ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let remote = RestRemote::new("https://example.supabase.co/", "hypomnemata").unwrap();
        assert_eq!(
            remote.endpoint(),
            "https://example.supabase.co/rest/v1/hypomnemata"
        );
    }

    #[test]
    fn test_in_filter_quotes_ids() {
        let ids = vec!["a".to_string(), "b\"c".to_string()];
        assert_eq!(in_filter(&ids), r#"in.("a","b\"c")"#);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        assert!(RestRemote::from_config(&config).unwrap().is_none());

        config.remote_url = Some("https://example.supabase.co".into());
        config.remote_api_key = Some("anon".into());
        let remote = RestRemote::from_config(&config).unwrap().unwrap();
        assert_eq!(remote.api_key.as_deref(), Some("anon"));
        assert!(remote.access_token.is_none());
        assert!(remote.endpoint().ends_with("/rest/v1/entries"));
    }

    #[test]
    fn test_inserted_row_accepts_numeric_id() {
        let rows: Vec<InsertedRow> = serde_json::from_str(r#"[{"id": 7}]"#).unwrap();
        assert_eq!(rows[0].id, "7");
    }
}
