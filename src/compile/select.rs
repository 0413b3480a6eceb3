//! SELECT and COUNT compilation.

use crate::compile::{quote_ident, CompiledQuery, ParamList};
use crate::compile::filter::{order_by_clause, where_clause};
use crate::schema::ModelDescriptor;
use serde_json::Value;

/// Compile a row-returning SELECT.
///
/// `force_limit_one` overrides any caller-supplied `take` (findFirst and
/// findUnique semantics).
pub fn select_query(
    model: &ModelDescriptor,
    payload: Option<&Value>,
    force_limit_one: bool,
) -> CompiledQuery {
    let mut params = ParamList::new();
    let mut sql = format!("SELECT * FROM {}", quote_ident(&model.table));

    if let Some(clause) = where_clause(model, payload.and_then(|p| p.get("where")), &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    if let Some(clause) = order_by_clause(model, payload.and_then(|p| p.get("orderBy"))) {
        sql.push_str(" ORDER BY ");
        sql.push_str(&clause);
    }
    if force_limit_one {
        sql.push_str(" LIMIT 1");
    } else if let Some(take) = payload.and_then(|p| p.get("take")).and_then(Value::as_u64) {
        sql.push_str(&format!(" LIMIT {take}"));
    }
    if let Some(skip) = payload.and_then(|p| p.get("skip")).and_then(Value::as_u64) {
        sql.push_str(&format!(" OFFSET {skip}"));
    }

    CompiledQuery {
        sql,
        params: params.into_vec(),
    }
}

/// Compile a filtered `COUNT(*)`.
pub fn count_query(model: &ModelDescriptor, payload: Option<&Value>) -> CompiledQuery {
    let mut params = ParamList::new();
    let mut sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&model.table));
    if let Some(clause) = where_clause(model, payload.and_then(|p| p.get("where")), &mut params) {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    CompiledQuery {
        sql,
        params: params.into_vec(),
    }
}
