//! Capability surface of the managed backend: auth, row queries, object
//! storage and one remote procedure.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::error::Result;

pub use memory::MemoryBackend;
pub use rest::RestBackend;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
}

impl User {
    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// `full_name`, then `name`, then the local part of the e-mail.
    pub fn display_name(&self) -> Option<String> {
        self.metadata_str("full_name")
            .or_else(|| self.metadata_str("name"))
            .map(str::to_string)
            .or_else(|| {
                self.email
                    .as_deref()
                    .and_then(|e| e.split('@').next())
                    .filter(|local| !local.is_empty())
                    .map(str::to_string)
            })
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.metadata_str("avatar_url").map(str::to_string)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
    /// Case-insensitive substring match on any of the columns.
    Search { columns: Vec<String>, term: String },
}

impl Condition {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Condition::Eq(column.to_string(), value.into())
    }
}

/// Embedded relation: `local_key` on the queried row points at `id` in `table`.
/// The joined object is returned under the table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub local_key: String,
    pub columns: Vec<String>,
    pub inner: bool,
}

impl Join {
    pub fn inner(table: &str, local_key: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            local_key: local_key.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            inner: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    pub columns: Vec<String>,
    pub joins: Vec<Join>,
    pub conditions: Vec<Condition>,
    pub order: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: vec![],
            joins: vec![],
            conditions: vec![],
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::eq(column, value))
    }

    pub fn is_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filter(Condition::In(column.to_string(), values))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Gte(column.to_string(), value.into()))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Condition::Lte(column.to_string(), value.into()))
    }

    pub fn search(self, columns: &[&str], term: &str) -> Self {
        self.filter(Condition::Search {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            term: term.to_string(),
        })
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some((column.to_string(), ascending));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Everything the portal needs from the hosted platform.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Session currently held by the platform's session store, if any.
    async fn get_session(&self) -> Result<Option<Session>>;

    async fn authenticate(&self, token: &str) -> Result<Session>;

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_out(&self) -> Result<()>;

    async fn update_user(&self, metadata: Map<String, Value>) -> Result<User>;

    async fn select(&self, query: &Query) -> Result<Vec<Row>>;

    /// Row count only; no rows are transferred.
    async fn count(&self, query: &Query) -> Result<u64>;

    async fn insert(&self, table: &str, row: Value) -> Result<Row>;

    async fn update(&self, table: &str, conditions: &[Condition], patch: Value) -> Result<Vec<Row>>;

    async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<u64>;

    /// Stores `bytes` under `path` and returns the stored path.
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;

    fn public_url(&self, bucket: &str, path: &str) -> String;

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<()>;

    async fn rpc(&self, name: &str, args: Value) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn user(metadata: Value, email: Option<&str>) -> User {
        User {
            id: "u1".to_string(),
            email: email.map(str::to_string),
            user_metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn display_name_walks_the_fallback_chain() {
        assert_eq!(
            user(json!({"full_name": "Ayşe Yılmaz", "name": "ayse"}), None).display_name(),
            Some("Ayşe Yılmaz".to_string())
        );
        assert_eq!(
            user(json!({"name": "ayse"}), Some("a@x.test")).display_name(),
            Some("ayse".to_string())
        );
        assert_eq!(
            user(json!({}), Some("mehmet@glohe.test")).display_name(),
            Some("mehmet".to_string())
        );
        assert_eq!(user(json!({}), None).display_name(), None);
    }

    #[test]
    fn query_builder_collects_conditions_in_order() {
        let query = Query::table("maintenance_records")
            .is_in("status", ["pending", "overdue"])
            .gte("scheduled_date", "2025-03-01")
            .order("scheduled_date", true)
            .limit(5);
        assert_eq!(query.conditions.len(), 2);
        assert_eq!(query.order, Some(("scheduled_date".to_string(), true)));
        assert_eq!(query.limit, Some(5));
    }
}
