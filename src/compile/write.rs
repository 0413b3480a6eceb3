//! INSERT, UPDATE, and DELETE compilation.

use crate::compile::filter::where_clause;
use crate::compile::{quote_ident, CompiledQuery, ParamList};
use crate::schema::ModelDescriptor;
use crate::types::{EngineError, Result, SqlParam};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Compile a single-row INSERT with `RETURNING *`.
///
/// Timestamp-role fields the caller did not supply are populated with `now`,
/// after the caller's fields so parameter order still follows payload
/// encounter order.
pub fn insert_query(
    model: &ModelDescriptor,
    data: &Value,
    now: DateTime<Utc>,
) -> CompiledQuery {
    let mut params = ParamList::new();
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();

    let empty = Map::new();
    let map = data.as_object().unwrap_or(&empty);
    for (key, value) in map {
        let column = match model.column_for(key) {
            Some(c) => c,
            None => continue,
        };
        let param = match SqlParam::from_json(value) {
            Some(p) => p,
            None => continue,
        };
        let n = params.push(param);
        columns.push(quote_ident(column));
        placeholders.push(format!("${n}"));
    }

    let timestamp_fields = [model.created_at_field(), model.updated_at_field()];
    for field in timestamp_fields.into_iter().flatten() {
        if map.contains_key(field.name.as_str()) {
            continue;
        }
        let n = params.push(SqlParam::Timestamp(now));
        columns.push(quote_ident(&field.column));
        placeholders.push(format!("${n}"));
    }

    let sql = if columns.is_empty() {
        format!(
            "INSERT INTO {} DEFAULT VALUES RETURNING *",
            quote_ident(&model.table)
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            quote_ident(&model.table),
            columns.join(", "),
            placeholders.join(", ")
        )
    };

    CompiledQuery {
        sql,
        params: params.into_vec(),
    }
}

/// Compile an UPDATE; SET parameters precede WHERE parameters.
///
/// The update-timestamp field is auto-assigned when the descriptor declares
/// one and the caller did not supply it.
///
/// # Errors
///
/// Returns `EngineError::MalformedPayload` when no assignment survives
/// field mapping (an UPDATE without SET is unrepresentable).
pub fn update_query(
    model: &ModelDescriptor,
    where_filter: Option<&Value>,
    data: Option<&Value>,
    returning: bool,
    now: DateTime<Utc>,
) -> Result<CompiledQuery> {
    let mut params = ParamList::new();
    let mut assignments = Vec::new();

    let empty = Map::new();
    let map = data.and_then(Value::as_object).unwrap_or(&empty);
    for (key, value) in map {
        let column = match model.column_for(key) {
            Some(c) => c,
            None => continue,
        };
        let param = match SqlParam::from_json(value) {
            Some(p) => p,
            None => continue,
        };
        let n = params.push(param);
        assignments.push(format!("{} = ${n}", quote_ident(column)));
    }

    if let Some(field) = model.updated_at_field() {
        if !map.contains_key(field.name.as_str()) {
            let n = params.push(SqlParam::Timestamp(now));
            assignments.push(format!("{} = ${n}", quote_ident(&field.column)));
        }
    }

    if assignments.is_empty() {
        return Err(EngineError::MalformedPayload(
            "no updatable fields in data".to_string(),
        ));
    }

    let mut sql = format!(
        "UPDATE {} SET {}",
        quote_ident(&model.table),
        assignments.join(", ")
    );
    if let Some(clause) = where_clause(model, where_filter, &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    if returning {
        sql.push_str(" RETURNING *");
    }

    Ok(CompiledQuery {
        sql,
        params: params.into_vec(),
    })
}

/// Compile a DELETE. No filter means no WHERE clause: the whole table.
pub fn delete_query(model: &ModelDescriptor, where_filter: Option<&Value>) -> CompiledQuery {
    let mut params = ParamList::new();
    let mut sql = format!("DELETE FROM {}", quote_ident(&model.table));
    if let Some(clause) = where_clause(model, where_filter, &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    CompiledQuery {
        sql,
        params: params.into_vec(),
    }
}
