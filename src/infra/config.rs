//! Centralized configuration (environment variables + defaults).
//!
//! Call [`load_env`] once at startup so a local `.env` file is honoured.

use crate::app::collection::DEFAULT_PAGINATION_PARAMS;
use std::net::SocketAddr;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:3000";

/// Loads `.env` if present. Missing file is not an error.
pub fn load_env() {
    dotenv::dotenv().ok();
}

/// HTTP adapter bind address (`GUARD_HTTP_ADDR`, default `0.0.0.0:3000`).
pub fn http_addr() -> anyhow::Result<SocketAddr> {
    let raw = std::env::var("GUARD_HTTP_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());
    raw.parse()
        .map_err(|e| anyhow::anyhow!("GUARD_HTTP_ADDR must be host:port, got {:?}: {}", raw, e))
}

/// Param keys left out of live-count keys (`GUARD_PAGINATION_PARAMS`, comma separated).
pub fn pagination_params() -> Vec<String> {
    match std::env::var("GUARD_PAGINATION_PARAMS") {
        Ok(v) => parse_list(&v),
        Err(_) => DEFAULT_PAGINATION_PARAMS.iter().map(|s| s.to_string()).collect(),
    }
}

/// Whether the demo server seeds example posts (`GUARD_SEED_DEMO`, default true).
pub fn seed_demo() -> bool {
    std::env::var("GUARD_SEED_DEMO")
        .map(|v| parse_flag(&v))
        .unwrap_or(true)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
