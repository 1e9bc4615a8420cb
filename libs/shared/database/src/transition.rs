use std::fmt::Display;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::supabase::SupabaseClient;

/// Conditional status change: `UPDATE <table> SET status = <to> WHERE id = ?
/// AND status IN (<from>) [AND <guards>]`. The row is only changed when it is
/// still in one of the expected states, so concurrent callers (user action,
/// cron sweep, retried webhook) can race safely and at most one wins.
#[derive(Debug, Clone)]
pub struct Transition {
    table: String,
    id: Uuid,
    from: Vec<String>,
    to: String,
    guards: Vec<(String, String)>,
    changes: Map<String, Value>,
}

impl Transition {
    pub fn new<S: Display>(table: &str, id: Uuid, from: &[S], to: S) -> Self {
        Self {
            table: table.to_string(),
            id,
            from: from.iter().map(|s| s.to_string()).collect(),
            to: to.to_string(),
            guards: Vec::new(),
            changes: Map::new(),
        }
    }

    /// Extra PostgREST filter the row must also satisfy, e.g. `("doctor_id", "is.null")`.
    pub fn guard(mut self, column: &str, filter: impl Into<String>) -> Self {
        self.guards.push((column.to_string(), filter.into()));
        self
    }

    /// Additional column written together with the status.
    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.changes.insert(column.to_string(), value);
        self
    }

    pub fn path(&self) -> String {
        let mut path = format!(
            "/rest/v1/{}?id=eq.{}&status=in.({})",
            self.table,
            self.id,
            self.from.join(",")
        );
        for (column, filter) in &self.guards {
            path.push_str(&format!("&{}={}", column, filter));
        }
        path
    }

    pub fn body(&self) -> Value {
        let mut body = self.changes.clone();
        body.insert("status".to_string(), json!(self.to));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        Value::Object(body)
    }

    /// Returns the updated row, or `None` when another caller already moved it.
    pub async fn apply<T: DeserializeOwned>(self, client: &SupabaseClient) -> Result<Option<T>, StoreError> {
        let rows: Vec<T> = client.update(&self.path(), self.body()).await?;
        let applied = rows.into_iter().next();

        debug!(
            "Transition {} {} [{}] -> {}: {}",
            self.table,
            self.id,
            self.from.join(","),
            self.to,
            if applied.is_some() { "applied" } else { "skipped" }
        );

        Ok(applied)
    }
}
