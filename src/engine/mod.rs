//! Translate-and-execute pipeline.
//!
//! Owns the whole control flow: raw text → locator → evaluator → compiler →
//! session execution, plus the compound sequencing for `createMany`,
//! `upsert`, and `delete`. The compound sequences are check-then-act and
//! deliberately not transactional: a failure partway leaves prior effects
//! committed, and concurrent callers racing the same row can observe the
//! usual check-then-act anomalies.

use crate::compile::{
    count_query, delete_query, insert_query, select_query, update_query, Action, CompiledQuery,
};
use crate::config::Config;
use crate::exec::{SessionPool, SqlExecutor};
use crate::payload;
use crate::schema::{ModelDescriptor, SchemaRegistry};
use crate::statement::StatementLocator;
use crate::types::{EngineError, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Tagged result of one translate-and-execute call.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// Ordered human-readable record of what ran: selected statement,
    /// resolved model/action, fallback notices, SQL, parameters, row counts.
    pub trace: Vec<String>,
}

/// Explicit context object owning the registry, the session cache, and the
/// locator. Passed by reference into every operation; there is no
/// process-global state.
pub struct Engine {
    registry: SchemaRegistry,
    sessions: Arc<SessionPool>,
    locator: StatementLocator,
    config: Config,
}

impl Engine {
    pub fn new(config: Config, registry: SchemaRegistry) -> Result<Self> {
        let locator = StatementLocator::new(&config.entrypoints, config.max_block_lines)?;
        let sessions = Arc::new(SessionPool::from_config(&config));
        Ok(Self {
            registry,
            sessions,
            locator,
            config,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionPool> {
        &self.sessions
    }

    /// Spawn the periodic session-eviction sweep.
    pub fn start_sweeper(&self) -> tokio::task::JoinHandle<()> {
        SessionPool::spawn_sweeper(
            self.sessions.clone(),
            Duration::from_secs(self.config.sweep_interval_secs),
        )
    }

    /// Translate the pasted source's active statement and execute it on the
    /// session's connection.
    ///
    /// Never panics and never retries; every failure is terminal for this
    /// call and surfaces as a tagged `Outcome`.
    pub async fn translate_and_execute(&self, session_id: &str, source: &str) -> Outcome {
        let mut trace = Vec::new();
        match self.run(session_id, source, &mut trace).await {
            Ok(result) => Outcome {
                success: true,
                result: Some(result),
                error: None,
                trace,
            },
            Err(e) => Outcome {
                success: false,
                result: None,
                error: Some(e.to_string()),
                trace,
            },
        }
    }

    async fn run(
        &self,
        session_id: &str,
        source: &str,
        trace: &mut Vec<String>,
    ) -> Result<Value> {
        let stmt = self.locator.locate(source)?;
        trace.push(format!(
            "active statement: {}.{} (lines {}-{})",
            stmt.model_name, stmt.action_name, stmt.line_range.0, stmt.line_range.1
        ));
        if stmt.truncated {
            trace.push(format!(
                "statement block truncated at {} lines",
                self.config.max_block_lines
            ));
        }

        let model = self.registry.get(&stmt.model_name)?;
        let action = Action::parse(&stmt.action_name)
            .ok_or_else(|| EngineError::UnknownAction(stmt.action_name.clone()))?;

        let evaluated = payload::evaluate(&stmt.payload_text, action);
        if let Some(notice) = &evaluated.fallback_notice {
            trace.push(notice.clone());
        }

        info!(
            session = %session_id,
            model = %model.name,
            action = action.as_str(),
            "executing active statement"
        );
        let namespace = format!("{}{}", self.config.namespace_prefix, session_id);
        let conn = self.sessions.acquire(session_id, &namespace).await?;
        run_action(conn.as_ref(), model, action, evaluated.value.as_ref(), trace).await
    }
}

/// Execute one action against an executor. Compound actions issue their
/// sub-statements sequentially through the same executor.
async fn run_action(
    exec: &dyn SqlExecutor,
    model: &ModelDescriptor,
    action: Action,
    payload: Option<&Value>,
    trace: &mut Vec<String>,
) -> Result<Value> {
    match action {
        Action::FindMany | Action::GroupBy => {
            let query = select_query(model, payload, false);
            let rows = run_rows(exec, &query, trace).await?;
            Ok(Value::Array(rows))
        }
        Action::FindFirst => {
            let query = select_query(model, payload, true);
            let rows = run_rows(exec, &query, trace).await?;
            Ok(rows.into_iter().next().unwrap_or(Value::Null))
        }
        Action::FindUnique => {
            require_where(payload, action)?;
            let query = select_query(model, payload, true);
            let rows = run_rows(exec, &query, trace).await?;
            Ok(rows.into_iter().next().unwrap_or(Value::Null))
        }
        Action::Count => {
            let count = run_count(exec, model, payload, trace).await?;
            Ok(json!(count))
        }
        Action::Aggregate => {
            let count = run_count(exec, model, payload, trace).await?;
            Ok(json!({ "count": { "all": count } }))
        }
        Action::Create => {
            let fallback = Value::Object(Map::new());
            let data = object_field(payload, "data").unwrap_or(&fallback);
            let query = insert_query(model, data, Utc::now());
            let rows = run_rows(exec, &query, trace).await?;
            Ok(rows.into_iter().next().unwrap_or(Value::Null))
        }
        Action::CreateMany => {
            let items: Vec<Value> = object_field(payload, "data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            // Sequential single-row inserts, no wrapping transaction: a
            // failure leaves earlier inserts committed.
            let mut count: u64 = 0;
            for item in &items {
                let query = insert_query(model, item, Utc::now());
                let rows = run_rows(exec, &query, trace).await?;
                count += rows.len() as u64;
            }
            trace.push(format!("createMany inserted {count} rows"));
            Ok(json!({ "count": count }))
        }
        Action::Update => {
            let query = update_query(
                model,
                object_field(payload, "where"),
                object_field(payload, "data"),
                true,
                Utc::now(),
            )?;
            let rows = run_rows(exec, &query, trace).await?;
            rows.into_iter().next().ok_or_else(|| {
                EngineError::NotFound(format!("{}.update matched no rows", model.name))
            })
        }
        Action::UpdateMany => {
            let query = update_query(
                model,
                object_field(payload, "where"),
                object_field(payload, "data"),
                false,
                Utc::now(),
            )?;
            let count = run_execute(exec, &query, trace).await?;
            Ok(json!({ "count": count }))
        }
        Action::Upsert => {
            let where_filter = object_field(payload, "where");
            let existing = lookup_one(exec, model, where_filter, trace).await?;
            if let Some(_row) = existing {
                trace.push("upsert: row exists, updating".to_string());
                let query = update_query(
                    model,
                    where_filter,
                    object_field(payload, "update"),
                    true,
                    Utc::now(),
                )?;
                let rows = run_rows(exec, &query, trace).await?;
                Ok(rows.into_iter().next().unwrap_or(Value::Null))
            } else {
                trace.push("upsert: no existing row, creating".to_string());
                let data = merge_over(where_filter, object_field(payload, "create"));
                let query = insert_query(model, &data, Utc::now());
                let rows = run_rows(exec, &query, trace).await?;
                Ok(rows.into_iter().next().unwrap_or(Value::Null))
            }
        }
        Action::Delete => {
            let where_filter = object_field(payload, "where");
            let record = lookup_one(exec, model, where_filter, trace)
                .await?
                .ok_or_else(|| {
                    EngineError::NotFound(format!("{}.delete matched no rows", model.name))
                })?;
            let query = delete_query(model, where_filter);
            run_execute(exec, &query, trace).await?;
            // The pre-fetched record, not a post-delete confirmation.
            Ok(record)
        }
        Action::DeleteMany => {
            let query = delete_query(model, object_field(payload, "where"));
            let count = run_execute(exec, &query, trace).await?;
            Ok(json!({ "count": count }))
        }
    }
}

fn object_field<'a>(payload: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    payload.and_then(|p| p.get(key))
}

fn require_where(payload: Option<&Value>, action: Action) -> Result<()> {
    let present = object_field(payload, "where")
        .and_then(Value::as_object)
        .map(|m| !m.is_empty())
        .unwrap_or(false);
    if present {
        Ok(())
    } else {
        Err(EngineError::MalformedPayload(format!(
            "{} requires a where filter",
            action.as_str()
        )))
    }
}

/// Overlay `overlay`'s entries on top of `base`'s (upsert's
/// create-merged-over-where).
fn merge_over(base: Option<&Value>, overlay: Option<&Value>) -> Value {
    let mut map = Map::new();
    if let Some(Value::Object(entries)) = base {
        for (k, v) in entries {
            map.insert(k.clone(), v.clone());
        }
    }
    if let Some(Value::Object(entries)) = overlay {
        for (k, v) in entries {
            map.insert(k.clone(), v.clone());
        }
    }
    Value::Object(map)
}

/// findUnique-style existence lookup for the check-then-act actions.
async fn lookup_one(
    exec: &dyn SqlExecutor,
    model: &ModelDescriptor,
    where_filter: Option<&Value>,
    trace: &mut Vec<String>,
) -> Result<Option<Value>> {
    let lookup_payload = json!({
        "where": where_filter.cloned().unwrap_or_else(|| json!({}))
    });
    let query = select_query(model, Some(&lookup_payload), true);
    let rows = run_rows(exec, &query, trace).await?;
    Ok(rows.into_iter().next())
}

async fn run_rows(
    exec: &dyn SqlExecutor,
    query: &CompiledQuery,
    trace: &mut Vec<String>,
) -> Result<Vec<Value>> {
    trace.push(format!("sql: {}", query.sql));
    trace.push(format!("params: {}", query.render_params()));
    let rows = exec.query(query).await?;
    trace.push(format!("rows returned: {}", rows.len()));
    Ok(rows)
}

async fn run_execute(
    exec: &dyn SqlExecutor,
    query: &CompiledQuery,
    trace: &mut Vec<String>,
) -> Result<u64> {
    trace.push(format!("sql: {}", query.sql));
    trace.push(format!("params: {}", query.render_params()));
    let count = exec.execute(query).await?;
    trace.push(format!("rows affected: {count}"));
    Ok(count)
}

async fn run_count(
    exec: &dyn SqlExecutor,
    model: &ModelDescriptor,
    payload: Option<&Value>,
    trace: &mut Vec<String>,
) -> Result<i64> {
    let query = count_query(model, payload);
    let rows = run_rows(exec, &query, trace).await?;
    rows.first()
        .and_then(Value::as_object)
        .and_then(|m| m.values().next())
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::Internal("count query returned no scalar".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builtin::builtin_registry;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MockExecutor {
        query_results: StdMutex<VecDeque<Vec<Value>>>,
        execute_results: StdMutex<VecDeque<u64>>,
        issued: StdMutex<Vec<CompiledQuery>>,
    }

    impl MockExecutor {
        fn queue_rows(&self, rows: Vec<Value>) {
            self.query_results.lock().unwrap().push_back(rows);
        }

        fn queue_affected(&self, count: u64) {
            self.execute_results.lock().unwrap().push_back(count);
        }

        fn issued_sql(&self) -> Vec<String> {
            self.issued.lock().unwrap().iter().map(|q| q.sql.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl SqlExecutor for MockExecutor {
        async fn query(&self, query: &CompiledQuery) -> Result<Vec<Value>> {
            self.issued.lock().unwrap().push(query.clone());
            Ok(self
                .query_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn execute(&self, query: &CompiledQuery) -> Result<u64> {
            self.issued.lock().unwrap().push(query.clone());
            Ok(self
                .execute_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(0))
        }
    }

    fn post_model() -> ModelDescriptor {
        builtin_registry().get("post").unwrap().clone()
    }

    #[tokio::test]
    async fn test_find_many_returns_rows_and_trace() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![json!({ "id": 1 }), json!({ "id": 2 })]);
        let mut trace = Vec::new();
        let payload = json!({ "where": { "published": true } });
        let result = run_action(
            &exec,
            &post_model(),
            Action::FindMany,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        assert_eq!(result.as_array().unwrap().len(), 2);
        assert!(trace.iter().any(|l| l.starts_with("sql: SELECT * FROM \"posts\"")));
        assert!(trace.iter().any(|l| l == "params: [true]"));
        assert!(trace.iter().any(|l| l == "rows returned: 2"));
    }

    #[tokio::test]
    async fn test_find_unique_requires_where() {
        let exec = MockExecutor::default();
        let mut trace = Vec::new();
        let err = run_action(
            &exec,
            &post_model(),
            Action::FindUnique,
            Some(&json!({})),
            &mut trace,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::MalformedPayload(_)));
        assert!(exec.issued_sql().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![]);
        let mut trace = Vec::new();
        let payload = json!({ "where": { "id": 99 }, "data": { "title": "X" } });
        let err = run_action(
            &exec,
            &post_model(),
            Action::Update,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        let issued = exec.issued_sql();
        assert_eq!(issued.len(), 1);
        assert!(issued[0].starts_with("UPDATE \"posts\" SET"));
        assert!(trace.iter().any(|l| l == "rows returned: 0"));
    }

    #[tokio::test]
    async fn test_upsert_existing_row_updates_only() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![json!({ "id": 5, "title": "old" })]);
        exec.queue_rows(vec![json!({ "id": 5, "title": "new" })]);
        let mut trace = Vec::new();
        let payload = json!({
            "where": { "id": 5 },
            "create": { "title": "new" },
            "update": { "title": "new" }
        });
        let result = run_action(
            &exec,
            &post_model(),
            Action::Upsert,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        assert_eq!(result["title"], json!("new"));
        let issued = exec.issued_sql();
        assert_eq!(issued.len(), 2);
        assert!(issued[0].starts_with("SELECT * FROM \"posts\""));
        assert!(issued[1].starts_with("UPDATE \"posts\""));
        assert!(!issued.iter().any(|s| s.starts_with("INSERT")));
    }

    #[tokio::test]
    async fn test_upsert_absent_row_creates_with_where_merged() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![]);
        exec.queue_rows(vec![json!({ "id": 5, "title": "new" })]);
        let mut trace = Vec::new();
        let payload = json!({
            "where": { "id": 5 },
            "create": { "title": "new" },
            "update": { "title": "ignored" }
        });
        let result = run_action(
            &exec,
            &post_model(),
            Action::Upsert,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        assert_eq!(result["id"], json!(5));
        let issued = exec.issued.lock().unwrap();
        assert_eq!(issued.len(), 2);
        assert!(issued[0].sql.starts_with("SELECT * FROM \"posts\""));
        // Where fields merge under the create data: id lands first.
        assert!(issued[1]
            .sql
            .starts_with("INSERT INTO \"posts\" (\"id\", \"title\""));
        assert_eq!(issued[1].params[0], crate::types::SqlParam::Int(5));
    }

    #[tokio::test]
    async fn test_delete_returns_prefetched_record() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![json!({ "id": 3, "title": "doomed" })]);
        exec.queue_affected(1);
        let mut trace = Vec::new();
        let payload = json!({ "where": { "id": 3 } });
        let result = run_action(
            &exec,
            &post_model(),
            Action::Delete,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        assert_eq!(result, json!({ "id": 3, "title": "doomed" }));
        let issued = exec.issued_sql();
        assert_eq!(issued.len(), 2);
        assert!(issued[0].starts_with("SELECT * FROM \"posts\""));
        assert!(issued[0].ends_with("LIMIT 1"));
        assert_eq!(issued[1], "DELETE FROM \"posts\" WHERE \"id\" = $1");
    }

    #[tokio::test]
    async fn test_delete_missing_row_skips_delete() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![]);
        let mut trace = Vec::new();
        let payload = json!({ "where": { "id": 3 } });
        let err = run_action(
            &exec,
            &post_model(),
            Action::Delete,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        assert_eq!(exec.issued_sql().len(), 1);
    }

    #[tokio::test]
    async fn test_create_many_counts_sequential_inserts() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![json!({ "id": 1 })]);
        exec.queue_rows(vec![json!({ "id": 2 })]);
        exec.queue_rows(vec![json!({ "id": 3 })]);
        let mut trace = Vec::new();
        let payload = json!({
            "data": [
                { "title": "a" },
                { "title": "b" },
                { "title": "c" }
            ]
        });
        let result = run_action(
            &exec,
            &post_model(),
            Action::CreateMany,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        assert_eq!(result, json!({ "count": 3 }));
        let issued = exec.issued_sql();
        assert_eq!(issued.len(), 3);
        assert!(issued.iter().all(|s| s.starts_with("INSERT INTO \"posts\"")));
        assert!(trace.iter().any(|l| l == "createMany inserted 3 rows"));
    }

    #[tokio::test]
    async fn test_count_and_aggregate_shapes() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![json!({ "count": 7 })]);
        let mut trace = Vec::new();
        let result = run_action(&exec, &post_model(), Action::Count, None, &mut trace)
            .await
            .unwrap();
        assert_eq!(result, json!(7));

        exec.queue_rows(vec![json!({ "count": 7 })]);
        let result = run_action(&exec, &post_model(), Action::Aggregate, None, &mut trace)
            .await
            .unwrap();
        assert_eq!(result, json!({ "count": { "all": 7 } }));
    }

    #[tokio::test]
    async fn test_update_many_returns_affected_count() {
        let exec = MockExecutor::default();
        exec.queue_affected(4);
        let mut trace = Vec::new();
        let payload = json!({ "where": { "published": false }, "data": { "published": true } });
        let result = run_action(
            &exec,
            &post_model(),
            Action::UpdateMany,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        assert_eq!(result, json!({ "count": 4 }));
        assert!(trace.iter().any(|l| l == "rows affected: 4"));
        assert!(!exec.issued_sql()[0].contains("RETURNING"));
    }

    #[tokio::test]
    async fn test_delete_many_without_where_deletes_all() {
        let exec = MockExecutor::default();
        exec.queue_affected(10);
        let mut trace = Vec::new();
        let result = run_action(&exec, &post_model(), Action::DeleteMany, None, &mut trace)
            .await
            .unwrap();
        assert_eq!(result, json!({ "count": 10 }));
        assert_eq!(exec.issued_sql()[0], "DELETE FROM \"posts\"");
    }

    #[tokio::test]
    async fn test_group_by_returns_raw_rows() {
        let exec = MockExecutor::default();
        exec.queue_rows(vec![json!({ "authorId": 1 }), json!({ "authorId": 1 })]);
        let mut trace = Vec::new();
        let payload = json!({ "where": { "published": true } });
        let result = run_action(
            &exec,
            &post_model(),
            Action::GroupBy,
            Some(&payload),
            &mut trace,
        )
        .await
        .unwrap();
        // Raw matching rows, no grouping applied.
        assert_eq!(result.as_array().unwrap().len(), 2);
    }
}
