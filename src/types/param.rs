//! Scalar SQL parameter values.
//!
//! Payload-derived values are dynamically typed while Postgres infers a
//! concrete type per placeholder, so `SqlParam` encodes itself against the
//! statement's inferred type: integers widen or narrow across the INT family,
//! and text coerces into timestamp/date/uuid columns when the string parses.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// A single positional parameter of a compiled query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlParam {
    /// Convert a scalar JSON value into a parameter.
    ///
    /// Objects and arrays have no scalar binding and return `None`; callers
    /// drop such entries rather than interpolating them.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Self::Null),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// Render the parameter for trace output.
    pub fn render(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => format!("{s:?}"),
            Self::Timestamp(t) => t.to_rfc3339(),
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => v.to_sql(ty, out),
            Self::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Self::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Self::Text(v) => {
                if *ty == Type::TIMESTAMPTZ {
                    DateTime::parse_from_rfc3339(v)?
                        .with_timezone(&Utc)
                        .to_sql(ty, out)
                } else if *ty == Type::TIMESTAMP {
                    DateTime::parse_from_rfc3339(v)?.naive_utc().to_sql(ty, out)
                } else if *ty == Type::DATE {
                    NaiveDate::parse_from_str(v, "%Y-%m-%d")?.to_sql(ty, out)
                } else if *ty == Type::UUID {
                    uuid::Uuid::parse_str(v)?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Self::Timestamp(v) => {
                if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
