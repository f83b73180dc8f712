//! Environment-driven server configuration.

use std::env;
use std::net::ToSocketAddrs;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "0.0.0.0:8050";
pub const DEFAULT_ES_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EMBED_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;
pub const DEFAULT_CHEAP_PERMITS: usize = 64;
pub const DEFAULT_MEDIUM_PERMITS: usize = 16;
pub const DEFAULT_HEAVY_PERMITS: usize = 4;

pub fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

pub fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

pub fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

pub fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

/// Compose-first default: prefer the `elasticsearch` service hostname when
/// it resolves, otherwise assume a node on the loopback.
#[must_use]
pub fn default_es_url() -> String {
    if ("elasticsearch", 9200).to_socket_addrs().is_ok() {
        "http://elasticsearch:9200".to_string()
    } else {
        "http://localhost:9200".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub es_url: String,
    pub article_index: String,
    pub author_index: String,
    pub embedder_url: Option<String>,
    pub es_timeout: Duration,
    pub embed_timeout: Duration,
    pub cheap_permits: usize,
    pub medium_permits: usize,
    pub heavy_permits: usize,
    pub rate_limit_rps: u64,
    pub rate_limit_burst: u64,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            es_url: "http://localhost:9200".to_string(),
            article_index: scholaris_model::ARTICLE_INDEX.to_string(),
            author_index: scholaris_model::AUTHOR_INDEX.to_string(),
            embedder_url: None,
            es_timeout: Duration::from_millis(DEFAULT_ES_TIMEOUT_MS),
            embed_timeout: Duration::from_millis(DEFAULT_EMBED_TIMEOUT_MS),
            cheap_permits: DEFAULT_CHEAP_PERMITS,
            medium_permits: DEFAULT_MEDIUM_PERMITS,
            heavy_permits: DEFAULT_HEAVY_PERMITS,
            rate_limit_rps: 0,
            rate_limit_burst: 0,
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let rate_limit_rps = env_u64("SCHOLARIS_RATE_LIMIT_RPS", 0);
        Self {
            bind_addr: env_string("SCHOLARIS_BIND", DEFAULT_BIND),
            es_url: env::var(scholaris_core::ENV_SCHOLARIS_ES_URL)
                .unwrap_or_else(|_| default_es_url()),
            article_index: env_string("SCHOLARIS_ARTICLE_INDEX", scholaris_model::ARTICLE_INDEX),
            author_index: env_string("SCHOLARIS_AUTHOR_INDEX", scholaris_model::AUTHOR_INDEX),
            embedder_url: env::var(scholaris_core::ENV_SCHOLARIS_EMBEDDER_URL)
                .ok()
                .filter(|v| !v.trim().is_empty()),
            es_timeout: env_duration_ms("SCHOLARIS_ES_TIMEOUT_MS", DEFAULT_ES_TIMEOUT_MS),
            embed_timeout: env_duration_ms("SCHOLARIS_EMBED_TIMEOUT_MS", DEFAULT_EMBED_TIMEOUT_MS),
            cheap_permits: env_usize("SCHOLARIS_MAX_CONCURRENCY_CHEAP", DEFAULT_CHEAP_PERMITS),
            medium_permits: env_usize("SCHOLARIS_MAX_CONCURRENCY_MEDIUM", DEFAULT_MEDIUM_PERMITS),
            heavy_permits: env_usize("SCHOLARIS_MAX_CONCURRENCY_HEAVY", DEFAULT_HEAVY_PERMITS),
            rate_limit_rps,
            rate_limit_burst: env_u64("SCHOLARIS_RATE_LIMIT_BURST", rate_limit_rps),
            shutdown_grace: env_duration_ms(
                "SCHOLARIS_SHUTDOWN_GRACE_MS",
                DEFAULT_SHUTDOWN_GRACE_MS,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_expose_the_contract_port() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8050");
        assert_eq!(config.article_index, "scientific_articles");
        assert_eq!(config.author_index, "authors");
        assert!(config.embedder_url.is_none());
        assert_eq!(config.rate_limit_rps, 0);
    }

    #[test]
    fn env_bool_accepts_common_spellings() {
        assert!(env_bool("SCHOLARIS_TEST_UNSET_BOOL", true));
        assert!(!env_bool("SCHOLARIS_TEST_UNSET_BOOL", false));
    }
}
