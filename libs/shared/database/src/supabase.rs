use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use shared_config::AppConfig;

use crate::error::StoreError;

/// PostgREST client for the shared store. Requests run with the service role;
/// tenant scoping is enforced by the handlers, not by row-level security.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            service_key: config.supabase_service_role_key.clone(),
        }
    }

    fn get_headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();

        let key = HeaderValue::from_str(&self.service_key)
            .map_err(|e| StoreError::Config(format!("Invalid service key: {}", e)))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.service_key))
            .map_err(|e| StoreError::Config(format!("Invalid service key: {}", e)))?;

        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers()?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("Store error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                409 => StoreError::Conflict(error_text),
                _ if error_text.contains("23505") => StoreError::Conflict(error_text),
                404 => StoreError::NotFound(error_text),
                code => StoreError::Api { status: code, message: error_text },
            });
        }

        let text = response.text().await?;
        let payload = if text.trim().is_empty() { "null" } else { text.as_str() };
        let data = serde_json::from_str::<T>(payload)?;
        Ok(data)
    }

    fn representation() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    /// GET a filtered table path, e.g. `/rest/v1/payments?id=eq.<id>`.
    pub async fn select<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn select_one<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = self.select(path).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn insert<T: DeserializeOwned>(&self, table: &str, body: Value) -> Result<T, StoreError> {
        let path = format!("/rest/v1/{}", table);
        let rows: Vec<T> = self
            .request_with_headers(Method::POST, &path, Some(body), Some(Self::representation()))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode(format!("Insert into {} returned no rows", table)))
    }

    /// Insert that silently skips rows violating `on_conflict`. Returns only
    /// the rows actually written, so an empty result means "already there".
    pub async fn insert_ignore_duplicates<T: DeserializeOwned>(
        &self,
        table: &str,
        on_conflict: &str,
        body: Value,
    ) -> Result<Vec<T>, StoreError> {
        let path = format!("/rest/v1/{}?on_conflict={}", table, on_conflict);
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=ignore-duplicates,return=representation"),
        );

        self.request_with_headers(Method::POST, &path, Some(body), Some(headers)).await
    }

    /// PATCH every row matched by `path` and return the rows that changed.
    pub async fn update<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Vec<T>, StoreError> {
        self.request_with_headers(Method::PATCH, path, Some(body), Some(Self::representation()))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<usize, StoreError> {
        let rows: Vec<Value> = self
            .request_with_headers(Method::DELETE, path, None, Some(Self::representation()))
            .await?;
        Ok(rows.len())
    }

    /// Call a Postgres function through `/rest/v1/rpc/<function>`. Each call
    /// runs in its own transaction.
    pub async fn rpc<T: DeserializeOwned>(&self, function: &str, args: Value) -> Result<T, StoreError> {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, Some(args)).await
    }
}

/// Timestamp formatted for a PostgREST filter value.
pub fn filter_timestamp(at: DateTime<Utc>) -> String {
    urlencoding::encode(&at.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn filter_timestamp_uses_utc_suffix() {
        let at = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
        assert_eq!(filter_timestamp(at), "2025-01-10T10%3A00%3A00Z");
    }
}
