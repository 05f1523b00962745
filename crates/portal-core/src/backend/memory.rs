//! In-process backend used for offline runs and tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

use super::{AuthEvent, Backend, Condition, Join, Query, Row, Session, User};
use crate::error::{PortalError, Result};

type RpcHandler = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Row>>,
    session: Option<Session>,
    hidden_session_reads: usize,
    session_reads: usize,
    tokens: HashMap<String, User>,
    objects: BTreeMap<(String, String), (Vec<u8>, String)>,
    faults: HashMap<String, PortalError>,
    sign_out_fault: Option<PortalError>,
    rpc_handlers: HashMap<String, RpcHandler>,
    calls: Vec<String>,
}

/// Tables of JSON rows plus an object map. Every call is appended to a log so
/// tests can assert which operations reached the backend.
pub struct MemoryBackend {
    state: Mutex<State>,
    auth_tx: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (auth_tx, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(State::default()),
            auth_tx,
        }
    }

    pub fn with_session(session: Session) -> Self {
        let backend = Self::new();
        backend.set_session(Some(session));
        backend
    }

    pub fn set_session(&self, session: Option<Session>) {
        self.state.lock().session = session;
    }

    /// The first `reads` calls to `get_session` see no session, mimicking a
    /// session that is still propagating from another tab.
    pub fn hide_session_for(&self, reads: usize) {
        let mut state = self.state.lock();
        state.hidden_session_reads = reads;
        state.session_reads = 0;
    }

    pub fn register_token(&self, token: &str, user: User) {
        self.state.lock().tokens.insert(token.to_string(), user);
    }

    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut state = self.state.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        entry.extend(rows.into_iter().filter_map(|v| v.as_object().cloned()));
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Every call against `key` fails with `err`. Keys are table names,
    /// `storage` or `rpc:<name>`.
    pub fn fail(&self, key: &str, err: PortalError) {
        self.state.lock().faults.insert(key.to_string(), err);
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.faults.clear();
        state.sign_out_fault = None;
    }

    pub fn fail_sign_out(&self, err: PortalError) {
        self.state.lock().sign_out_fault = Some(err);
    }

    pub fn on_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .rpc_handlers
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Pushes an auth event to every subscriber.
    pub fn emit(&self, event: AuthEvent) {
        if let AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) = &event {
            self.state.lock().session = Some(session.clone());
        }
        if matches!(event, AuthEvent::SignedOut) {
            self.state.lock().session = None;
        }
        // No receivers is fine.
        let _ = self.auth_tx.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn object_paths(&self) -> Vec<String> {
        self.state
            .lock()
            .objects
            .keys()
            .map(|(bucket, path)| format!("{bucket}/{path}"))
            .collect()
    }

    fn record(state: &mut State, call: String) {
        trace!(call = %call, "memory backend call");
        state.calls.push(call);
    }

    fn check_fault(state: &State, key: &str) -> Result<()> {
        match state.faults.get(key) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn run_query(state: &State, query: &Query) -> Vec<Row> {
        let base = state.tables.get(&query.table).cloned().unwrap_or_default();
        let mut rows: Vec<Row> = base
            .into_iter()
            .filter(|row| query.conditions.iter().all(|c| matches(row, c)))
            .filter_map(|row| attach_joins(state, row, &query.joins))
            .collect();

        if let Some((column, ascending)) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare(a.get(column), b.get(column));
                if *ascending { ord } else { ord.reverse() }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        rows.into_iter()
            .map(|row| project(row, &query.columns, &query.joins))
            .collect()
    }
}

fn attach_joins(state: &State, mut row: Row, joins: &[Join]) -> Option<Row> {
    for join in joins {
        let key = row.get(&join.local_key).cloned().unwrap_or(Value::Null);
        let found = state.tables.get(&join.table).and_then(|rows| {
            rows.iter()
                .find(|candidate| candidate.get("id") == Some(&key) && !key.is_null())
        });
        match found {
            Some(joined) => {
                let joined = project(joined.clone(), &join.columns, &[]);
                row.insert(join.table.clone(), Value::Object(joined));
            }
            None if join.inner => return None,
            None => {
                row.insert(join.table.clone(), Value::Null);
            }
        }
    }
    Some(row)
}

fn project(row: Row, columns: &[String], joins: &[Join]) -> Row {
    if columns.is_empty() || columns.iter().any(|c| c == "*") {
        return row;
    }
    row.into_iter()
        .filter(|(key, _)| columns.contains(key) || joins.iter().any(|j| &j.table == key))
        .collect()
}

fn matches(row: &Row, condition: &Condition) -> bool {
    let null = Value::Null;
    match condition {
        Condition::Eq(column, value) => row.get(column).unwrap_or(&null) == value,
        Condition::In(column, values) => {
            let actual = row.get(column).unwrap_or(&null);
            values.iter().any(|v| v == actual)
        }
        Condition::Gte(column, value) => match row.get(column) {
            Some(actual) if !actual.is_null() => compare(Some(actual), Some(value)) != Ordering::Less,
            _ => false,
        },
        Condition::Lte(column, value) => match row.get(column) {
            Some(actual) if !actual.is_null() => {
                compare(Some(actual), Some(value)) != Ordering::Greater
            }
            _ => false,
        },
        Condition::Search { columns, term } => {
            let needle = term.to_lowercase();
            columns.iter().any(|column| {
                row.get(column)
                    .and_then(Value::as_str)
                    .map(|text| text.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        }
    }
}

/// Numbers numerically, everything else by string form; ISO dates and
/// timestamps therefore compare chronologically.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => value_text(x).cmp(&value_text(y)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe(conditions: &[Condition]) -> String {
    conditions
        .iter()
        .map(|c| match c {
            Condition::Eq(col, v) => format!("{col}={v}"),
            Condition::In(col, vs) => format!("{col} in {}", vs.len()),
            Condition::Gte(col, v) => format!("{col}>={v}"),
            Condition::Lte(col, v) => format!("{col}<={v}"),
            Condition::Search { term, .. } => format!("search {term}"),
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>> {
        let mut state = self.state.lock();
        Self::record(&mut state, "get_session".to_string());
        Self::check_fault(&state, "auth")?;
        state.session_reads += 1;
        if state.session_reads <= state.hidden_session_reads {
            debug!(read = state.session_reads, "session not yet visible");
            return Ok(None);
        }
        Ok(state.session.clone())
    }

    async fn authenticate(&self, token: &str) -> Result<Session> {
        let session = {
            let mut state = self.state.lock();
            Self::record(&mut state, "authenticate".to_string());
            Self::check_fault(&state, "auth")?;
            let user = state
                .tokens
                .get(token)
                .cloned()
                .ok_or(PortalError::Authentication)?;
            let session = Session {
                access_token: token.to_string(),
                refresh_token: None,
                expires_at: None,
                user,
            };
            state.session = Some(session.clone());
            session
        };
        let _ = self.auth_tx.send(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    fn subscribe_auth(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_tx.subscribe()
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, "sign_out".to_string());
        if let Some(err) = state.sign_out_fault.clone() {
            return Err(err);
        }
        state.session = None;
        Ok(())
    }

    async fn update_user(&self, metadata: Map<String, Value>) -> Result<User> {
        let mut state = self.state.lock();
        Self::record(&mut state, "update_user".to_string());
        Self::check_fault(&state, "auth")?;
        let session = state.session.as_mut().ok_or(PortalError::Authentication)?;
        session.user.user_metadata.extend(metadata);
        Ok(session.user.clone())
    }

    async fn select(&self, query: &Query) -> Result<Vec<Row>> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            format!("select {} [{}]", query.table, describe(&query.conditions)),
        );
        Self::check_fault(&state, &query.table)?;
        Ok(Self::run_query(&state, query))
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            format!("count {} [{}]", query.table, describe(&query.conditions)),
        );
        Self::check_fault(&state, &query.table)?;
        Ok(Self::run_query(&state, query).len() as u64)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Row> {
        let mut state = self.state.lock();
        Self::record(&mut state, format!("insert {table}"));
        Self::check_fault(&state, table)?;
        let Value::Object(mut row) = row else {
            return Err(PortalError::backend(format!("insert into {table}: payload is not an object")));
        };
        if !row.contains_key("id") {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        if !row.contains_key("created_at") {
            row.insert("created_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        state.tables.entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, conditions: &[Condition], patch: Value) -> Result<Vec<Row>> {
        let mut state = self.state.lock();
        Self::record(&mut state, format!("update {table} [{}]", describe(conditions)));
        Self::check_fault(&state, table)?;
        let Value::Object(patch) = patch else {
            return Err(PortalError::backend(format!("update {table}: patch is not an object")));
        };
        let rows = state.tables.entry(table.to_string()).or_default();
        let mut updated = vec![];
        for row in rows.iter_mut() {
            if conditions.iter().all(|c| matches(row, c)) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, conditions: &[Condition]) -> Result<u64> {
        let mut state = self.state.lock();
        Self::record(&mut state, format!("delete {table} [{}]", describe(conditions)));
        Self::check_fault(&state, table)?;
        let rows = state.tables.entry(table.to_string()).or_default();
        let before = rows.len();
        rows.retain(|row| !conditions.iter().all(|c| matches(row, c)));
        Ok((before - rows.len()) as u64)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let mut state = self.state.lock();
        Self::record(&mut state, format!("upload {bucket}/{path}"));
        Self::check_fault(&state, "storage")?;
        let key = (bucket.to_string(), path.to_string());
        if state.objects.contains_key(&key) {
            return Err(PortalError::Backend {
                status: Some(409),
                message: format!("object already exists: {path}"),
            });
        }
        state.objects.insert(key, (bytes, content_type.to_string()));
        Ok(path.to_string())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn remove_objects(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, format!("remove {bucket} [{}]", paths.join(",")));
        Self::check_fault(&state, "storage")?;
        for path in paths {
            state.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    async fn rpc(&self, name: &str, args: Value) -> Result<Value> {
        let handler = {
            let mut state = self.state.lock();
            Self::record(&mut state, format!("rpc {name} {args}"));
            Self::check_fault(&state, &format!("rpc:{name}"))?;
            state.rpc_handlers.get(name).cloned()
        };
        match handler {
            Some(handler) => handler(&args),
            None => Ok(Value::Null),
        }
    }
}
