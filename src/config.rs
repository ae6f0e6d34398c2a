use std::env;
use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub riot: RiotConfig,
    pub discord: DiscordConfig,
    pub rate_limit: RateLimitConfig,
    pub tracker: TrackerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token for the admin routes. Unset leaves them open.
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiotConfig {
    pub api_key: String,
    /// Per-attempt timeout. A timed-out attempt is retried like a transport error.
    pub request_timeout_seconds: u64,
    /// Maximum physical attempts per call (including the first).
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: String,
}

/// Token bucket settings for outbound stats API calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimitConfig {
    /// Refill rate of the bucket every request consumes from.
    pub per_second: f64,
    pub burst: u32,
    /// Extra buckets for endpoint path prefixes (longest prefix wins).
    pub prefixes: Vec<PrefixLimit>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrefixLimit {
    pub prefix: String,
    pub per_second: f64,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Whether the poll loop runs at all.
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    /// Upper bound for one whole tick, external calls included.
    pub tick_timeout_seconds: u64,
    /// Maximum simultaneously in-flight live probes.
    pub probe_concurrency: usize,
    /// Give up on a post-game summary this long after the match was last seen live.
    pub abandon_after_seconds: u64,
    /// Notification records older than this are deleted regardless of state.
    pub retention_hours: u64,
    pub post_retry_base_seconds: u64,
    pub post_retry_max_seconds: u64,
    /// Maximum pending records resolved per tick.
    pub pending_batch_limit: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/tracker.db".to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5),
            },
            riot: RiotConfig {
                api_key: env::var("RIOT_API_KEY")
                    .map_err(|_| ConfigError::MissingEnv("RIOT_API_KEY".to_string()))?,
                request_timeout_seconds: env_or("RIOT_REQUEST_TIMEOUT_SECONDS", 10),
                max_attempts: env_or("RIOT_MAX_ATTEMPTS", 4),
                backoff_base_ms: env_or("RIOT_BACKOFF_BASE_MS", 500),
                backoff_max_ms: env_or("RIOT_BACKOFF_MAX_MS", 10_000),
            },
            discord: DiscordConfig {
                bot_token: env::var("DISCORD_BOT_TOKEN")
                    .map_err(|_| ConfigError::MissingEnv("DISCORD_BOT_TOKEN".to_string()))?,
            },
            rate_limit: RateLimitConfig::from_env()?,
            tracker: TrackerConfig {
                enabled: match env::var("TRACKER_ENABLED") {
                    Ok(v) => match v.to_lowercase().as_str() {
                        "1" | "true" | "yes" => true,
                        "0" | "false" | "no" => false,
                        _ => true,
                    },
                    Err(_) => true,
                },
                poll_interval_seconds: env_or("TRACKER_POLL_INTERVAL_SECONDS", 60),
                tick_timeout_seconds: env_or("TRACKER_TICK_TIMEOUT_SECONDS", 120),
                probe_concurrency: env_or("TRACKER_PROBE_CONCURRENCY", 8),
                abandon_after_seconds: env_or("TRACKER_ABANDON_AFTER_SECONDS", 2 * 60 * 60),
                retention_hours: env_or("TRACKER_RETENTION_HOURS", 7 * 24),
                post_retry_base_seconds: env_or("TRACKER_POST_RETRY_BASE_SECONDS", 15),
                post_retry_max_seconds: env_or("TRACKER_POST_RETRY_MAX_SECONDS", 5 * 60),
                pending_batch_limit: env_or("TRACKER_PENDING_BATCH_LIMIT", 50),
            },
        })
    }
}

impl RateLimitConfig {
    /// Read only the rate limit settings; used again on configuration reload.
    pub fn from_env() -> Result<Self, ConfigError> {
        let per_second: f64 = env_or("RIOT_RATE_LIMIT_PER_SECOND", 20.0);
        if !per_second.is_finite() || per_second <= 0.0 {
            return Err(ConfigError::InvalidValue(
                "RIOT_RATE_LIMIT_PER_SECOND".to_string(),
            ));
        }

        let prefixes = match env::var("RIOT_RATE_LIMIT_PREFIXES") {
            Ok(raw) => parse_prefix_limits(&raw)
                .map_err(|_| ConfigError::InvalidValue("RIOT_RATE_LIMIT_PREFIXES".to_string()))?,
            Err(_) => Self::default().prefixes,
        };

        Ok(RateLimitConfig {
            per_second,
            burst: env_or("RIOT_RATE_LIMIT_BURST", 20),
            prefixes,
        })
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        RateLimitConfig {
            per_second: 20.0,
            burst: 20,
            prefixes: vec![PrefixLimit {
                prefix: "/lol/match/v5".to_string(),
                per_second: 2.0,
                burst: 20,
            }],
        }
    }
}

/// Parse `prefix=rps:burst` pairs separated by commas.
///
/// `/lol/match/v5=2:20,/lol/league/v4=1:10`
pub fn parse_prefix_limits(raw: &str) -> Result<Vec<PrefixLimit>, String> {
    let mut limits = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (prefix, spec) = entry
            .split_once('=')
            .ok_or_else(|| format!("missing '=' in {}", entry))?;
        let (rps, burst) = spec
            .split_once(':')
            .ok_or_else(|| format!("missing ':' in {}", entry))?;

        let per_second: f64 = rps
            .trim()
            .parse()
            .map_err(|_| format!("invalid rate in {}", entry))?;
        let burst: u32 = burst
            .trim()
            .parse()
            .map_err(|_| format!("invalid burst in {}", entry))?;
        if !per_second.is_finite() || per_second <= 0.0 || burst == 0 || prefix.trim().is_empty() {
            return Err(format!("invalid limit {}", entry));
        }

        limits.push(PrefixLimit {
            prefix: prefix.trim().to_string(),
            per_second,
            burst,
        });
    }
    Ok(limits)
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            enabled: true,
            poll_interval_seconds: 60,
            tick_timeout_seconds: 120,
            probe_concurrency: 8,
            abandon_after_seconds: 2 * 60 * 60,
            retention_hours: 7 * 24,
            post_retry_base_seconds: 15,
            post_retry_max_seconds: 5 * 60,
            pending_batch_limit: 50,
        }
    }
}

impl Default for RiotConfig {
    fn default() -> Self {
        RiotConfig {
            api_key: String::new(),
            request_timeout_seconds: 10,
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 10_000,
        }
    }
}
