//! Environment-driven configuration.
//!
//! All settings come from `REPLY_RELAY_*` environment variables. Only the
//! webhook secret and the platform API token are required; everything else
//! has a sensible default.
//!
//! | Variable | Default |
//! |---|---|
//! | `REPLY_RELAY_BIND_ADDR` | `0.0.0.0:3000` |
//! | `REPLY_RELAY_WEBHOOK_SECRET` | required |
//! | `REPLY_RELAY_API_BASE_URL` | `https://api.platform.example` |
//! | `REPLY_RELAY_API_TOKEN` | required |
//! | `REPLY_RELAY_LEDGER_DIR` | `./ledger` |
//! | `REPLY_RELAY_RULES_PATH` | `./rules.json` |
//! | `REPLY_RELAY_QUEUE_CAPACITY` | `256` |
//! | `REPLY_RELAY_POSTS_PER_TICK` | `10` |
//! | `REPLY_RELAY_TICK_INTERVAL_SECS` | `5` |
//! | `REPLY_RELAY_REQUEST_TIMEOUT_SECS` | `10` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_API_BASE_URL: &str = "https://api.platform.example";
const DEFAULT_LEDGER_DIR: &str = "./ledger";
const DEFAULT_RULES_PATH: &str = "./rules.json";
const DEFAULT_QUEUE_CAPACITY: usize = 256;
const DEFAULT_POSTS_PER_TICK: usize = 10;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable was not set.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable was set to an unparseable value.
    #[error("invalid value for {variable}: {value}")]
    Invalid {
        variable: &'static str,
        value: String,
    },
}

/// Runtime configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Shared secret for webhook signature verification.
    pub webhook_secret: String,

    /// Base URL of the platform API.
    pub api_base_url: String,

    /// Bearer token for the platform API.
    pub api_token: String,

    /// Directory backing the dedupe ledger.
    pub ledger_dir: PathBuf,

    /// JSON file holding the reply rules.
    pub rules_path: PathBuf,

    /// Dispatch queue capacity.
    pub queue_capacity: usize,

    /// Rate budget: post attempts per tick.
    pub posts_per_tick: usize,

    /// Interval between dispatcher ticks.
    pub tick_interval: Duration,

    /// Timeout for each outbound post.
    pub request_timeout: Duration,
}

impl RelayConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary lookup function.
    ///
    /// Split out from [`from_env`](Self::from_env) so tests can exercise
    /// parsing without mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse(
            "REPLY_RELAY_BIND_ADDR",
            lookup("REPLY_RELAY_BIND_ADDR"),
            DEFAULT_BIND_ADDR.parse().expect("default addr parses"),
        )?;

        let webhook_secret = lookup("REPLY_RELAY_WEBHOOK_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("REPLY_RELAY_WEBHOOK_SECRET"))?;

        let api_token = lookup("REPLY_RELAY_API_TOKEN")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("REPLY_RELAY_API_TOKEN"))?;

        let api_base_url =
            lookup("REPLY_RELAY_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let ledger_dir = lookup("REPLY_RELAY_LEDGER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_DIR));

        let rules_path = lookup("REPLY_RELAY_RULES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RULES_PATH));

        let queue_capacity = parse(
            "REPLY_RELAY_QUEUE_CAPACITY",
            lookup("REPLY_RELAY_QUEUE_CAPACITY"),
            DEFAULT_QUEUE_CAPACITY,
        )?;

        let posts_per_tick = parse(
            "REPLY_RELAY_POSTS_PER_TICK",
            lookup("REPLY_RELAY_POSTS_PER_TICK"),
            DEFAULT_POSTS_PER_TICK,
        )?;

        let tick_interval = Duration::from_secs(parse(
            "REPLY_RELAY_TICK_INTERVAL_SECS",
            lookup("REPLY_RELAY_TICK_INTERVAL_SECS"),
            DEFAULT_TICK_INTERVAL_SECS,
        )?);

        let request_timeout = Duration::from_secs(parse(
            "REPLY_RELAY_REQUEST_TIMEOUT_SECS",
            lookup("REPLY_RELAY_REQUEST_TIMEOUT_SECS"),
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        Ok(RelayConfig {
            bind_addr,
            webhook_secret,
            api_base_url,
            api_token,
            ledger_dir,
            rules_path,
            queue_capacity,
            posts_per_tick,
            tick_interval,
            request_timeout,
        })
    }
}

fn parse<T: std::str::FromStr>(
    variable: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { variable, value: raw }),
    }
}
