//! Environment configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::{RecomputeDispatch, DEFAULT_TOP_PRODUCTS};
use crate::services::orders::DEFAULT_NUMBER_PREFIX;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub nats_url: Option<String>,
    pub nats_subject_prefix: String,
    pub order_number_prefix: String,
    pub top_products_limit: usize,
    pub recompute: RecomputeDispatch,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let recompute = match get("RECOMPUTE_MODE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("inline") => RecomputeDispatch::Inline,
            Some("background") => RecomputeDispatch::Background {
                max_attempts: parse(&get, "RECOMPUTE_MAX_ATTEMPTS", 3)?,
                retry_delay: Duration::from_millis(parse(&get, "RECOMPUTE_RETRY_DELAY_MS", 200)?),
            },
            Some(other) => return Err(ConfigError::InvalidValue { var: "RECOMPUTE_MODE", value: other.to_string() }),
        };

        let top_products_limit = parse(&get, "TOP_PRODUCTS_LIMIT", DEFAULT_TOP_PRODUCTS)?;
        if top_products_limit == 0 {
            return Err(ConfigError::InvalidValue { var: "TOP_PRODUCTS_LIMIT", value: "0".into() });
        }

        Ok(Config {
            port: parse(&get, "PORT", 8083)?,
            database_url: get("DATABASE_URL"),
            database_max_connections: parse(&get, "DATABASE_MAX_CONNECTIONS", 10)?,
            nats_url: get("NATS_URL"),
            nats_subject_prefix: get("NATS_SUBJECT_PREFIX").unwrap_or_else(|| "backoffice.notifications".to_string()),
            order_number_prefix: get("ORDER_NUMBER_PREFIX").unwrap_or_else(|| DEFAULT_NUMBER_PREFIX.to_string()),
            top_products_limit,
            recompute,
        })
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError> {
    match get(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
