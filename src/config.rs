//! Runtime configuration.
//!
//! Everything is env-driven with workable defaults; the CLI overlays its own
//! flags on top. The core never reads the environment outside `from_env`.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Postgres connection string
    pub database_url: String,
    /// Age bound for cached session connections (seconds since open)
    pub session_ttl_secs: u64,
    /// Eviction sweep period (seconds)
    pub sweep_interval_secs: u64,
    /// Bounded statement-block accumulation (lines)
    pub max_block_lines: usize,
    /// Prepended to the session id to form the connection namespace
    pub namespace_prefix: String,
    /// Object names recognized as the ORM entrypoint in pasted text
    pub entrypoints: Vec<String>,
    /// Schema registry YAML; builtin demo models when unset
    pub schema_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost:5432/querypad".to_string(),
            session_ttl_secs: 900,
            sweep_interval_secs: 60,
            max_block_lines: 40,
            namespace_prefix: "session_".to_string(),
            entrypoints: vec![
                "client".to_string(),
                "prisma".to_string(),
                "db".to_string(),
            ],
            schema_path: None,
        }
    }
}

impl Config {
    /// Load configuration from `QUERYPAD_*` environment variables, falling
    /// back to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = env::var("QUERYPAD_DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(ttl) = env_parse("QUERYPAD_SESSION_TTL_SECS") {
            config.session_ttl_secs = ttl;
        }
        if let Some(interval) = env_parse("QUERYPAD_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = interval;
        }
        if let Some(lines) = env_parse("QUERYPAD_MAX_BLOCK_LINES") {
            config.max_block_lines = lines;
        }
        if let Ok(prefix) = env::var("QUERYPAD_NAMESPACE_PREFIX") {
            config.namespace_prefix = prefix;
        }
        if let Ok(list) = env::var("QUERYPAD_ENTRYPOINTS") {
            let names: Vec<String> = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !names.is_empty() {
                config.entrypoints = names;
            }
        }
        if let Ok(path) = env::var("QUERYPAD_SCHEMA_PATH") {
            config.schema_path = Some(PathBuf::from(path));
        }
        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.parse::<T>().ok())
}
