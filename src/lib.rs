//! querypad - pasted ORM-call translation and execution.
//!
//! Takes free-form pasted source text containing ORM-style call expressions,
//! selects the single "active" statement, and runs it:
//!
//! raw text → statement locator → payload evaluator → query compiler →
//! session-scoped execution → rows/counts + trace
//!
//! - Statement selection follows the log-of-binding convention (last log
//!   call wins) with a first-declaration fallback.
//! - Payloads are evaluated under a restricted literal grammar; pasted code
//!   is never executed.
//! - SQL identifiers come only from the static schema registry; compiled
//!   statements use positional parameters throughout.
//! - Each session is pinned to one namespace-scoped Postgres connection.

pub mod compile;
pub mod config;
pub mod engine;
pub mod exec;
pub mod payload;
pub mod scan;
pub mod schema;
pub mod statement;
pub mod types;

pub use config::Config;
pub use engine::{Engine, Outcome};
pub use types::{EngineError, Result};
