//! HTTP adapter for the hosted platform's REST, storage and auth endpoints.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::{AuthEvent, Backend, Condition, Query, Row, Session, User};
use crate::config::PortalSettings;
use crate::error::{PortalError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestBackend {
    client: Client,
    base_url: String,
    anon_key: String,
    token: RwLock<Option<String>>,
    auth_tx: broadcast::Sender<AuthEvent>,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| PortalError::backend(format!("failed building HTTP client: {err}")))?;
        let (auth_tx, _) = broadcast::channel(16);
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            token: RwLock::new(None),
            auth_tx,
        })
    }

    pub fn from_settings(settings: &PortalSettings) -> Result<Self> {
        let url = settings
            .backend_url
            .as_deref()
            .ok_or_else(|| PortalError::validation("backend.url is not configured"))?;
        let key = settings
            .anon_key
            .as_deref()
            .ok_or_else(|| PortalError::validation("backend.anon_key is not configured"))?;
        let backend = Self::new(url, key)?;
        if let Some(token) = &settings.token {
            *backend.token.write() = Some(token.clone());
        }
        Ok(backend)
    }

    fn url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|err| PortalError::backend(format!("invalid URL {raw}: {err}")))
    }

    fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        let token = bearer
            .map(str::to_string)
            .or_else(|| self.token.read().clone())
            .unwrap_or_else(|| self.anon_key.clone());
        self.client
            .request(method, url)
            .header("apikey", self.anon_key.as_str())
            .header(AUTHORIZATION, format!("Bearer {token}"))
    }

    fn json_body(builder: RequestBuilder, body: &Value) -> Result<RequestBuilder> {
        Ok(builder
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(body)?))
    }

    async fn send(builder: RequestBuilder) -> Result<(StatusCode, HeaderMap, Vec<u8>)> {
        let response = builder
            .send()
            .await
            .map_err(|err| PortalError::backend(format!("request failed: {err}")))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| PortalError::backend(format!("failed reading response body: {err}")))?
            .to_vec();

        if status.is_success() {
            return Ok((status, headers, body));
        }

        let message = error_message(&body);
        warn!(status = %status, error = %message, "backend returned non-success status");
        Err(PortalError::from_status(status.as_u16(), message))
    }

    async fn send_json(builder: RequestBuilder) -> Result<Value> {
        let (_, _, body) = Self::send(builder).await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&body)?)
    }

    fn table_url(&self, table: &str, conditions: &[Condition]) -> Result<Url> {
        let mut url = self.url(&format!("rest/v1/{table}"))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in condition_params(conditions) {
                pairs.append_pair(&key, &value);
            }
        }
        Ok(url)
    }

    fn query_url(&self, query: &Query) -> Result<Url> {
        let mut url = self.table_url(&query.table, &query.conditions)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &select_clause(query));
            if let Some((column, ascending)) = &query.order {
                let dir = if *ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{column}.{dir}"));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    async fn fetch_user(&self, bearer: Option<&str>) -> Result<User> {
        let url = self.url("auth/v1/user")?;
        let value = Self::send_json(self.request(Method::GET, url, bearer)).await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn select_clause(query: &Query) -> String {
    let mut parts = vec![if query.columns.is_empty() {
        "*".to_string()
    } else {
        query.columns.join(",")
    }];
    for join in &query.joins {
        let columns = if join.columns.is_empty() {
            "*".to_string()
        } else {
            join.columns.join(",")
        };
        let modifier = if join.inner { "!inner" } else { "" };
        parts.push(format!("{}{modifier}({columns})", join.table));
    }
    parts.join(",")
}

fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn condition_params(conditions: &[Condition]) -> Vec<(String, String)> {
    conditions
        .iter()
        .map(|condition| match condition {
            Condition::Eq(column, Value::Null) => (column.clone(), "is.null".to_string()),
            Condition::Eq(column, value) => (column.clone(), format!("eq.{}", param_value(value))),
            Condition::In(column, values) => {
                let list = values.iter().map(param_value).collect::<Vec<_>>().join(",");
                (column.clone(), format!("in.({list})"))
            }
            Condition::Gte(column, value) => (column.clone(), format!("gte.{}", param_value(value))),
            Condition::Lte(column, value) => (column.clone(), format!("lte.{}", param_value(value))),
            Condition::Search { columns, term } => {
                let clauses = columns
                    .iter()
                    .map(|c| format!("{c}.ilike.*{term}*"))
                    .collect::<Vec<_>>()
                    .join(",");
                ("or".to_string(), format!("({clauses})"))
            }
        })
        .collect()
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
fn parse_content_range(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.trim().parse().ok())
}

fn error_message(body: &[u8]) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

fn rows_from(value: Value) -> Result<Vec<Row>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect()),
        Value::Object(row) => Ok(vec![row]),
        Value::Null => Ok(vec![]),
        other => Err(PortalError::backend(format!("unexpected response shape: {other}"))),
    }
}

#[async_trait]
impl Backend for RestBackend {
    #[tracing::instrument(skip(self))]
    async fn get_session(&self) -> Result<Option<Session>> {
        let Some(token) = self.token.read().clone() else {
            return Ok(None);
        };
        match self.fetch_user(Some(&token)).await {
            Ok(user) => Ok(Some(Session {
                access_token: token,
                refresh_token: None,
                expires_at: None,
                user,
            })),
            Err(PortalError::Authentication) => {
                debug!("stored token rejected; no session");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    #[tracing::instrument(skip(self, token))]
    async fn authenticate(&self, token: &str) -> Result<Session> {
        let user = self.fetch_user(Some(token)).await?;
        *self.token.write() = Some(token.to_string());
        let session = Session {
            access_token: token.to_string(),
            refresh_token: None,
            expires_at: None,
            user,
        };
        let _ = self.auth_tx.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    #[tracing::instrument(skip(self))]
    async fn sign_out(&self) -> Result<()> {
        let mut url = self.url("auth/v1/logout")?;
        url.query_pairs_mut().append_pair("scope", "global");
        let result = Self::send(self.request(Method::POST, url, None)).await;
        *self.token.write() = None;
        result?;
        let _ = self.auth_tx.send(AuthEvent::SignedOut);
        Ok(())
    }

    async fn update_user(&self, metadata: Map<String, Value>) -> Result<User> {
        let url = self.url("auth/v1/user")?;
        let builder = Self::json_body(
            self.request(Method::PUT, url, None),
            &json!({ "data": metadata }),
        )?;
        Ok(serde_json::from_value(Self::send_json(builder).await?)?)
    }

    #[tracing::instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        let url = self.query_url(query)?;
        rows_from(Self::send_json(self.request(Method::GET, url, None)).await?)
    }

    #[tracing::instrument(skip(self, query), fields(table = %query.table))]
    async fn count(&self, query: &Query) -> Result<u64> {
        let url = self.query_url(query)?;
        let builder = self
            .request(Method::HEAD, url, None)
            .header("Prefer", "count=exact");
        let (_, headers, _) = Self::send(builder).await?;
        parse_content_range(&headers)
            .ok_or_else(|| PortalError::backend("count response had no Content-Range total"))
    }

    #[tracing::instrument(skip(self, row))]
    async fn insert(&self, table: &str, row: Value) -> Result<Row> {
        let url = self.table_url(table, &[])?;
        let builder = Self::json_body(
            self.request(Method::POST, url, None)
                .header("Prefer", "return=representation"),
            &Value::Array(vec![row]),
        )?;
        rows_from(Self::send_json(builder).await?)?
            .into_iter()
            .next()
            .ok_or_else(|| PortalError::backend(format!("insert into {table} returned no row")))
    }

    #[tracing::instrument(skip(self, conditions, patch))]
    async fn update(&self, table: &str, conditions: &[Condition], patch: Value) -> Result<Vec<Row>> {
        let url = self.table_url(table, conditions)?;
        let builder = Self::json_body(
            self.request(Method::PATCH, url, None)
                .header("Prefer", "return=representation"),
            &patch,
        )?;
        rows_from(Self::send_json(builder).await?)
    }

    #[tracing::instrument(skip(self, conditions))]
    async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<u64> {
        let url = self.table_url(table, conditions)?;
        let builder = self
            .request(Method::DELETE, url, None)
            .header("Prefer", "return=representation");
        Ok(rows_from(Self::send_json(builder).await?)?.len() as u64)
    }

    #[tracing::instrument(skip(self, bytes))]
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = self.url(&format!("storage/v1/object/{bucket}/{path}"))?;
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|_| PortalError::validation(format!("invalid content type: {content_type}")))?;
        let builder = self
            .request(Method::POST, url, None)
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);
        Self::send(builder).await?;
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let url = self.url(&format!("storage/v1/object/{bucket}"))?;
        let builder = Self::json_body(
            self.request(Method::DELETE, url, None),
            &json!({ "prefixes": paths }),
        )?;
        Self::send(builder).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, args))]
    async fn rpc(&self, name: &str, args: Value) -> Result<Value> {
        let url = self.url(&format!("rest/v1/rpc/{name}"))?;
        let builder = Self::json_body(self.request(Method::POST, url, None), &args)?;
        Self::send_json(builder).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::Join;

    #[test]
    fn select_clause_embeds_joins() {
        let query = Query::table("maintenance_records")
            .join(Join::inner("machines", "machine_id", &["id", "machine_no"]));
        assert_eq!(select_clause(&query), "*,machines!inner(id,machine_no)");
    }

    #[test]
    fn conditions_use_operator_prefixes() {
        let params = condition_params(&[
            Condition::eq("status", "overdue"),
            Condition::In("status".into(), vec![json!("pending"), json!("in_progress")]),
            Condition::Gte("scheduled_date".into(), json!("2025-03-01")),
            Condition::eq("priority", 2),
            Condition::Search {
                columns: vec!["machine_no".into(), "machine_name".into()],
                term: "pres".into(),
            },
        ]);
        assert_eq!(params[0], ("status".into(), "eq.overdue".into()));
        assert_eq!(params[1], ("status".into(), "in.(pending,in_progress)".into()));
        assert_eq!(params[2], ("scheduled_date".into(), "gte.2025-03-01".into()));
        assert_eq!(params[3], ("priority".into(), "eq.2".into()));
        assert_eq!(
            params[4],
            ("or".into(), "(machine_no.ilike.*pres*,machine_name.ilike.*pres*)".into())
        );
    }

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(error_message(br#"{"message":"permission denied"}"#), "permission denied");
        assert_eq!(error_message(b"gateway timeout"), "gateway timeout");
    }

    #[test]
    fn content_range_total_is_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert("content-range", HeaderValue::from_static("*/42"));
        assert_eq!(parse_content_range(&headers), Some(42));
    }
}
