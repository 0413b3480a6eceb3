//! WHERE and ORDER BY construction from flat payload maps.

use crate::compile::{quote_ident, ParamList};
use crate::schema::ModelDescriptor;
use crate::types::SqlParam;
use serde_json::Value;
use tracing::debug;

/// Build an equality conjunction from a flat filter map.
///
/// Keys missing from the descriptor and non-scalar values are dropped.
/// Returns `None` when nothing usable remains, so callers omit the clause.
pub fn where_clause(
    model: &ModelDescriptor,
    filter: Option<&Value>,
    params: &mut ParamList,
) -> Option<String> {
    let map = filter?.as_object()?;
    let mut clauses = Vec::new();
    for (key, value) in map {
        let column = match model.column_for(key) {
            Some(c) => c,
            None => {
                debug!(model = %model.name, field = %key, "dropping unmapped filter field");
                continue;
            }
        };
        let param = match SqlParam::from_json(value) {
            Some(p) => p,
            None => {
                debug!(model = %model.name, field = %key, "dropping non-scalar filter value");
                continue;
            }
        };
        let n = params.push(param);
        clauses.push(format!("{} = ${n}", quote_ident(column)));
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}

/// Build an ORDER BY list from a single spec map or an array of one-entry
/// spec maps (`{ field: "asc" | "desc" }`).
pub fn order_by_clause(model: &ModelDescriptor, order: Option<&Value>) -> Option<String> {
    let order = order?;
    let specs: Vec<&Value> = match order {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut parts = Vec::new();
    for spec in specs {
        let map = match spec.as_object() {
            Some(m) => m,
            None => continue,
        };
        for (key, direction) in map {
            let column = match model.column_for(key) {
                Some(c) => c,
                None => continue,
            };
            let keyword = match direction.as_str().map(str::to_ascii_lowercase).as_deref() {
                Some("asc") => "ASC",
                Some("desc") => "DESC",
                _ => continue,
            };
            parts.push(format!("{} {keyword}", quote_ident(column)));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}
