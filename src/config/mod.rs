//! Environment-driven configuration (§6). Every knob spec.md lists is a flat
//! env var, so this crate is Figment + `Env::raw()` rather than a TOML file
//! the way the teacher's legacy `config.rs` did it.

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::{net::Ipv4Addr, sync::LazyLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    RoundRobin,
    #[default]
    WeightedRoundRobin,
    LeastUsed,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub admin_key: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub load_balance_strategy: LoadBalanceStrategy,

    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
    #[serde(default = "default_cb_threshold")]
    pub circuit_breaker_error_threshold: u32,
    #[serde(default = "default_cb_recovery")]
    pub circuit_breaker_recovery_timeout: u64,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,

    #[serde(default)]
    pub enable_cache_simulation: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    #[serde(default)]
    pub enable_auto_refresh: bool,
    #[serde(default = "default_refresh_interval_hours")]
    pub token_refresh_interval_hours: u64,

    #[serde(default)]
    pub zero_input_token_models: Vec<String>,

    #[serde(default)]
    pub disable_input_validation: bool,
    #[serde(default = "default_max_input_tokens")]
    pub amazonq_max_input_tokens: u32,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Redesign decision (SPEC_FULL §4): thinking defaults *off* across every
    /// channel, honoring Claude's own default-off semantics. The source's
    /// always-on behavior is still reachable per-account via `thinking: true`.
    #[serde(default)]
    pub thinking_default_enabled: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,

    #[serde(default = "default_request_deadline_margin")]
    pub request_deadline_margin_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: default_port(),
            admin_key: None,
            api_key: None,
            database_url: default_database_url(),
            load_balance_strategy: LoadBalanceStrategy::default(),
            circuit_breaker_enabled: true,
            circuit_breaker_error_threshold: default_cb_threshold(),
            circuit_breaker_recovery_timeout: default_cb_recovery(),
            health_check_interval: default_health_check_interval(),
            enable_cache_simulation: false,
            cache_ttl_seconds: default_cache_ttl(),
            max_cache_entries: default_max_cache_entries(),
            enable_auto_refresh: false,
            token_refresh_interval_hours: default_refresh_interval_hours(),
            zero_input_token_models: Vec::new(),
            disable_input_validation: false,
            amazonq_max_input_tokens: default_max_input_tokens(),
            base_url: None,
            thinking_default_enabled: false,
            max_retries: default_max_retries(),
            ping_interval_seconds: default_ping_interval(),
            request_deadline_margin_seconds: default_request_deadline_margin(),
        }
    }
}

fn default_port() -> u16 {
    8080
}
fn default_database_url() -> String {
    "sqlite://relaymux.db".to_string()
}
fn default_true() -> bool {
    true
}
fn default_cb_threshold() -> u32 {
    5
}
fn default_cb_recovery() -> u64 {
    300
}
fn default_health_check_interval() -> u64 {
    300
}
fn default_cache_ttl() -> u64 {
    86_400
}
fn default_max_cache_entries() -> usize {
    5_000
}
fn default_refresh_interval_hours() -> u64 {
    5
}
fn default_max_input_tokens() -> u32 {
    100_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_ping_interval() -> u64 {
    15
}
fn default_request_deadline_margin() -> u64 {
    30
}

impl Config {
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Env::raw())
    }

    pub fn from_env() -> Self {
        let mut cfg: Self = Self::figment()
            .extract()
            .expect("failed to extract configuration from environment");
        cfg.cache_ttl_seconds = cfg.cache_ttl_seconds.clamp(60, 604_800);
        cfg.max_cache_entries = cfg.max_cache_entries.clamp(100, 100_000);
        cfg
    }

    pub fn listen_addr(&self) -> std::net::SocketAddr {
        (Ipv4Addr::UNSPECIFIED, self.port).into()
    }
}

/// Global, lazily-initialized configuration instance, matching the teacher's
/// `CONFIG: LazyLock<Config>` pattern for library call sites that cannot
/// thread a `Config` value through every function signature.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.circuit_breaker_error_threshold, 5);
        assert_eq!(cfg.circuit_breaker_recovery_timeout, 300);
        assert_eq!(cfg.amazonq_max_input_tokens, 100_000);
        assert_eq!(cfg.load_balance_strategy, LoadBalanceStrategy::WeightedRoundRobin);
        assert!(!cfg.thinking_default_enabled);
    }
}
