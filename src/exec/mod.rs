//! Session-scoped execution of compiled queries.
//!
//! Each session is pinned to exactly one pooled connection whose
//! `search_path` is set to the session's namespace. Statements for one
//! session run sequentially behind the connection's mutex; distinct sessions
//! run concurrently. A background sweep evicts connections past their TTL
//! without interrupting in-flight statements (the `Arc` keeps an evicted
//! connection alive until its last caller finishes).

use crate::compile::{quote_ident, CompiledQuery};
use crate::config::Config;
use crate::types::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, info, warn};

/// Seam between compound-action sequencing and the database, so the
/// two-step behaviors are testable without a live server.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a row-returning statement.
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Value>>;

    /// Run a statement and return the affected-row count.
    async fn execute(&self, query: &CompiledQuery) -> Result<u64>;
}

/// One session's pinned connection.
pub struct SessionConnection {
    pub session_id: String,
    client: Mutex<Client>,
    created_at: Instant,
}

#[async_trait]
impl SqlExecutor for SessionConnection {
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Value>> {
        let client = self.client.lock().await;
        let params: Vec<&(dyn ToSql + Sync)> = query
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let rows = client.query(query.sql.as_str(), &params).await?;
        debug!(session = %self.session_id, rows = rows.len(), "query complete");
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<u64> {
        let client = self.client.lock().await;
        let params: Vec<&(dyn ToSql + Sync)> = query
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        let count = client.execute(query.sql.as_str(), &params).await?;
        debug!(session = %self.session_id, affected = count, "execute complete");
        Ok(count)
    }
}

/// Shared cache of session connections.
pub struct SessionPool {
    database_url: String,
    ttl: Duration,
    sessions: Mutex<HashMap<String, Arc<SessionConnection>>>,
}

impl SessionPool {
    pub fn new(database_url: String, ttl: Duration) -> Self {
        Self {
            database_url,
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.database_url.clone(),
            Duration::from_secs(config.session_ttl_secs),
        )
    }

    /// Return the session's connection, opening and namespace-pinning one on
    /// first use.
    ///
    /// The map lock is held across connect so two concurrent first requests
    /// for the same session cannot open two connections.
    pub async fn acquire(&self, session_id: &str, namespace: &str) -> Result<Arc<SessionConnection>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(conn) = sessions.get(session_id) {
            return Ok(conn.clone());
        }

        let (client, connection) = tokio_postgres::connect(&self.database_url, NoTls).await?;
        let driver_session = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(session = %driver_session, error = %e, "connection driver ended with error");
            }
        });
        client.batch_execute(&search_path_sql(namespace)).await?;

        info!(session = %session_id, namespace = %namespace, "opened session connection");
        let conn = Arc::new(SessionConnection {
            session_id: session_id.to_string(),
            client: Mutex::new(client),
            created_at: Instant::now(),
        });
        sessions.insert(session_id.to_string(), conn.clone());
        Ok(conn)
    }

    /// Drop the cache entry. In-flight statements on the connection run to
    /// completion; nothing is cancelled.
    pub async fn release(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(session_id).is_some();
        if removed {
            info!(session = %session_id, "released session connection");
        }
        removed
    }

    /// Evict entries older than the TTL; returns the evicted session ids.
    pub async fn evict_expired(&self) -> Vec<String> {
        let mut sessions = self.sessions.lock().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, conn)| is_expired(conn.created_at, self.ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
            debug!(session = %id, "evicted expired session connection");
        }
        expired
    }

    /// Number of cached sessions.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Spawn the periodic eviction sweep.
    pub fn spawn_sweeper(pool: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = pool.evict_expired().await;
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "session sweep evicted connections");
                }
            }
        })
    }
}

fn is_expired(created_at: Instant, ttl: Duration) -> bool {
    created_at.elapsed() > ttl
}

fn search_path_sql(namespace: &str) -> String {
    format!("SET search_path TO {}, public", quote_ident(namespace))
}

/// Convert a driver row to a JSON object keyed by column name.
fn row_to_json(row: &Row) -> Value {
    let mut map = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), column_value(row, idx, column.type_()));
    }
    Value::Object(map)
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> Value {
    if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(i64::from(v)))
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(i64::from(v)))
            .unwrap_or(Value::Null)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(f64::from(v)))
            .unwrap_or(Value::Null)
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null)
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<chrono::NaiveDate>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx)
            .ok()
            .flatten()
            .unwrap_or(Value::Null)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        row.try_get::<_, Option<String>>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null)
    } else {
        // No JSON mapping for this type.
        Value::Null
    }
}
