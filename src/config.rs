//! Environment-driven configuration.
//!
//! All the knobs that used to differ between near-identical deployments
//! live here: inference endpoint, result schema, reply templates, TTLs,
//! warn scope, and pool sizing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::dispatch::ReplyTemplates;
use crate::dispatch::warn::WarnScope;
use crate::error::ConfigError;
use crate::pipeline::ReplyFormat;

/// Bridge configuration, read once at startup. Anything invalid here is
/// fatal; nothing past startup ever re-reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the webhook endpoint.
    pub bind_addr: SocketAddr,
    /// Platform bot token, used for downloads and replies.
    pub bot_token: SecretString,
    /// The bridge's own user id, for self-event filtering.
    pub bot_user_id: Option<String>,
    /// Vision inference endpoint URL.
    pub inference_url: String,
    /// Result schema this deployment expects.
    pub reply_format: ReplyFormat,
    /// Ledger database path. `None` selects the in-memory backend.
    pub store_path: Option<PathBuf>,
    /// Dedup marker lifetime. Must exceed the platform's retry span and
    /// must be bounded.
    pub dedup_ttl: Duration,
    /// Warn marker lifetime, independent of `dedup_ttl`.
    pub warn_ttl: Duration,
    pub warn_scope: WarnScope,
    /// Timeout applied to every outbound HTTP call.
    pub http_timeout: Duration,
    /// Timeout for the inbound acknowledgment path.
    pub request_timeout: Duration,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub templates: ReplyTemplates,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bot_token = SecretString::from(require("SLACK_BOT_TOKEN")?);
        let inference_url = require("VISION_API_URL")?;

        let bind_addr = parse_bind_addr(optional("LENS_RELAY_BIND"))?;
        let reply_format = parse_enum("VISION_RESULT_FORMAT", optional("VISION_RESULT_FORMAT"))?
            .unwrap_or(ReplyFormat::ObjectCount);
        let warn_scope = parse_enum("LENS_RELAY_WARN_SCOPE", optional("LENS_RELAY_WARN_SCOPE"))?
            .unwrap_or(WarnScope::PerUser);

        let dedup_ttl = parse_ttl(
            "LENS_RELAY_DEDUP_TTL_SECS",
            optional("LENS_RELAY_DEDUP_TTL_SECS"),
            600,
        )?;
        let warn_ttl = parse_ttl(
            "LENS_RELAY_WARN_TTL_SECS",
            optional("LENS_RELAY_WARN_TTL_SECS"),
            21_600,
        )?;
        let http_timeout = parse_ttl(
            "LENS_RELAY_HTTP_TIMEOUT_SECS",
            optional("LENS_RELAY_HTTP_TIMEOUT_SECS"),
            30,
        )?;
        let request_timeout = parse_ttl(
            "LENS_RELAY_REQUEST_TIMEOUT_SECS",
            optional("LENS_RELAY_REQUEST_TIMEOUT_SECS"),
            10,
        )?;

        let worker_count =
            parse_count("LENS_RELAY_WORKERS", optional("LENS_RELAY_WORKERS"), 4)?;
        let queue_capacity = parse_count(
            "LENS_RELAY_QUEUE_CAPACITY",
            optional("LENS_RELAY_QUEUE_CAPACITY"),
            64,
        )?;

        let mut templates = ReplyTemplates::default();
        if let Some(prompt) = optional("LENS_RELAY_REGISTER_PROMPT") {
            templates.register_prompt = prompt;
        }

        Ok(Self {
            bind_addr,
            bot_token,
            bot_user_id: optional("SLACK_BOT_USER_ID"),
            inference_url,
            reply_format,
            store_path: optional("LENS_RELAY_DB_PATH").map(PathBuf::from),
            dedup_ttl,
            warn_ttl,
            warn_scope,
            http_timeout,
            request_timeout,
            worker_count,
            queue_capacity,
            templates,
        })
    }
}

fn require(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Read an env var; empty values count as unset.
fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bind_addr(raw: Option<String>) -> Result<SocketAddr, ConfigError> {
    raw.unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .parse()
        .map_err(|e| ConfigError::InvalidValue {
            key: "LENS_RELAY_BIND".to_string(),
            message: format!("not a socket address: {e}"),
        })
}

/// Parse a seconds-valued TTL or timeout. Zero is rejected: unbounded
/// markers grow the store forever, and unbounded calls hang.
fn parse_ttl(key: &str, raw: Option<String>, default_secs: u64) -> Result<Duration, ConfigError> {
    let secs = match raw {
        None => default_secs,
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("not a number of seconds: {e}"),
        })?,
    };
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be non-zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_count(key: &str, raw: Option<String>, default: usize) -> Result<usize, ConfigError> {
    let count = match raw {
        None => default,
        Some(raw) => raw.parse::<usize>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("not a count: {e}"),
        })?,
    };
    if count == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(count)
}

fn parse_enum<T>(key: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr<Err = String>,
{
    raw.map(|raw| {
        raw.parse().map_err(|message| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        })
    })
    .transpose()
}
