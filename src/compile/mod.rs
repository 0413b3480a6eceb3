//! Query compilation: (model, action, payload) → SQL text + parameters.
//!
//! Identifiers are only ever derived from descriptor data; payload keys that
//! do not map to a descriptor field are dropped, never interpolated.
//! Placeholders are positional (`$1`, `$2`, ...) and numbered in payload
//! encounter order.

pub mod filter;
pub mod select;
pub mod write;

pub use filter::{order_by_clause, where_clause};
pub use select::{count_query, select_query};
pub use write::{delete_query, insert_query, update_query};

use crate::types::SqlParam;

/// The closed set of supported actions.
///
/// A fieldless enum rather than string dispatch: unsupported actions cannot
/// reach the per-action compilation paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    FindMany,
    FindUnique,
    FindFirst,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Count,
    Aggregate,
    GroupBy,
}

impl Action {
    /// Parse an action name; `None` for anything outside the set.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "findMany" => Some(Self::FindMany),
            "findUnique" => Some(Self::FindUnique),
            "findFirst" => Some(Self::FindFirst),
            "create" => Some(Self::Create),
            "createMany" => Some(Self::CreateMany),
            "update" => Some(Self::Update),
            "updateMany" => Some(Self::UpdateMany),
            "upsert" => Some(Self::Upsert),
            "delete" => Some(Self::Delete),
            "deleteMany" => Some(Self::DeleteMany),
            "count" => Some(Self::Count),
            "aggregate" => Some(Self::Aggregate),
            "groupBy" => Some(Self::GroupBy),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FindMany => "findMany",
            Self::FindUnique => "findUnique",
            Self::FindFirst => "findFirst",
            Self::Create => "create",
            Self::CreateMany => "createMany",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
            Self::Count => "count",
            Self::Aggregate => "aggregate",
            Self::GroupBy => "groupBy",
        }
    }

    /// Read-only actions take the empty-filter payload fallback.
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::FindMany
                | Self::FindUnique
                | Self::FindFirst
                | Self::Count
                | Self::Aggregate
                | Self::GroupBy
        )
    }
}

/// One executable statement: SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl CompiledQuery {
    /// Render the parameter list for trace output.
    pub fn render_params(&self) -> String {
        let rendered: Vec<String> = self.params.iter().map(SqlParam::render).collect();
        format!("[{}]", rendered.join(", "))
    }
}

/// Ordered parameter accumulator; `push` returns the 1-based placeholder
/// number for the value.
#[derive(Debug, Default)]
pub struct ParamList {
    params: Vec<SqlParam>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, param: SqlParam) -> usize {
        self.params.push(param);
        self.params.len()
    }

    pub fn into_vec(self) -> Vec<SqlParam> {
        self.params
    }
}

/// Double-quote an identifier, escaping embedded quotes.
///
/// Callers only pass descriptor-derived names; the escaping is belt and
/// suspenders for odd physical column names.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for name in [
            "findMany",
            "findUnique",
            "findFirst",
            "create",
            "createMany",
            "update",
            "updateMany",
            "upsert",
            "delete",
            "deleteMany",
            "count",
            "aggregate",
            "groupBy",
        ] {
            let action = Action::parse(name).unwrap();
            assert_eq!(action.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_action() {
        assert!(Action::parse("findAll").is_none());
        assert!(Action::parse("").is_none());
    }

    #[test]
    fn test_read_split() {
        assert!(Action::Count.is_read());
        assert!(Action::GroupBy.is_read());
        assert!(!Action::Create.is_read());
        assert!(!Action::DeleteMany.is_read());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_param_numbering() {
        let mut params = ParamList::new();
        assert_eq!(params.push(SqlParam::Int(1)), 1);
        assert_eq!(params.push(SqlParam::Int(2)), 2);
        assert_eq!(params.into_vec().len(), 2);
    }
}
