//! Presence channel configuration.
//!
//! [`PresenceConfig::from_env`] reads the deployment settings; tests and
//! embedders build the struct directly.

use std::str::FromStr;
use std::time::Duration;

use carelink_core::types::UserId;
use reqwest::Url;

use crate::reconnect::ReconnectConfig;
use crate::transport::TransportKind;

/// Where and how the channel connects.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Hub base URL, e.g. `http://localhost:3000`. `ws`/`wss` schemes are
    /// accepted too.
    pub base_url: String,
    /// Path segment under the base URL (default `presence`). One plain
    /// segment: ASCII letters, digits, `-`, `_` or `.`.
    pub namespace: String,
    /// Identity announced to the hub so that targeted signals reach this
    /// session.
    pub user_id: Option<UserId>,
    /// Transports to try, most preferred first.
    pub transports: Vec<TransportKind>,
    pub reconnect: ReconnectConfig,
    /// A WebSocket that receives nothing, not even a hub ping, for this
    /// long is treated as dropped. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

/// Default read timeout: two hub heartbeat intervals.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised while building a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value that does not parse.
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The base URL cannot be turned into a transport endpoint.
    #[error("Invalid presence URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            namespace: "presence".into(),
            user_id: None,
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            reconnect: ReconnectConfig::default(),
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
        }
    }
}

impl PresenceConfig {
    /// Create a configuration for `base_url` with every other setting at
    /// its default.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Builder-style setter for the announced user.
    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                   |
    /// |-----------------------------------|---------------------------|
    /// | `PRESENCE_URL`                    | `http://localhost:3000`   |
    /// | `PRESENCE_NAMESPACE`              | `presence`                |
    /// | `PRESENCE_USER_ID`                | unset                     |
    /// | `PRESENCE_TRANSPORTS`             | `websocket,polling`       |
    /// | `PRESENCE_RECONNECT`              | `true`                    |
    /// | `PRESENCE_RECONNECT_ATTEMPTS`     | `5` (`0` retries forever) |
    /// | `PRESENCE_RECONNECT_DELAY_MS`     | `1000`                    |
    /// | `PRESENCE_RECONNECT_DELAY_MAX_MS` | `5000`                    |
    /// | `PRESENCE_TIMEOUT_MS`             | `20000`                   |
    /// | `PRESENCE_READ_TIMEOUT_MS`        | `60000` (`0` disables)    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let policy = ReconnectConfig::default();

        let base_url = lookup("PRESENCE_URL").unwrap_or(defaults.base_url);
        let namespace = lookup("PRESENCE_NAMESPACE")
            .map(|s| s.trim().trim_matches('/').to_string())
            .unwrap_or(defaults.namespace);
        let user_id = lookup("PRESENCE_USER_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let transports = match lookup("PRESENCE_TRANSPORTS") {
            Some(raw) => parse_transports(&raw)?,
            None => defaults.transports,
        };

        let enabled = parse_or(&lookup, "PRESENCE_RECONNECT", policy.enabled)?;
        let max_attempts = match parse_or(&lookup, "PRESENCE_RECONNECT_ATTEMPTS", 5u32)? {
            0 => None,
            n => Some(n),
        };
        let initial_delay = Duration::from_millis(parse_or(
            &lookup,
            "PRESENCE_RECONNECT_DELAY_MS",
            policy.initial_delay.as_millis() as u64,
        )?);
        let max_delay = Duration::from_millis(parse_or(
            &lookup,
            "PRESENCE_RECONNECT_DELAY_MAX_MS",
            policy.max_delay.as_millis() as u64,
        )?);
        let timeout = Duration::from_millis(parse_or(
            &lookup,
            "PRESENCE_TIMEOUT_MS",
            policy.timeout.as_millis() as u64,
        )?);
        let read_timeout = match parse_or(
            &lookup,
            "PRESENCE_READ_TIMEOUT_MS",
            DEFAULT_READ_TIMEOUT.as_millis() as u64,
        )? {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        let config = Self {
            base_url,
            namespace,
            user_id,
            transports,
            reconnect: ReconnectConfig {
                enabled,
                max_attempts,
                initial_delay,
                max_delay,
                timeout,
                ..policy
            },
            read_timeout,
        };

        // Surface URL problems at load time rather than on first connect.
        config.websocket_url()?;
        Ok(config)
    }

    /// WebSocket endpoint: `ws(s)://<host>/<namespace>?userId=<id>`.
    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.namespace_url()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ConfigError::InvalidUrl {
                    url: self.base_url.clone(),
                    reason: format!("unsupported scheme {other}"),
                })
            }
        };
        url.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: format!("cannot switch scheme to {scheme}"),
        })?;
        Ok(url)
    }

    /// Long-polling endpoint: `http(s)://<host>/<namespace>/poll?userId=<id>`.
    pub fn polling_url(&self) -> Result<Url, ConfigError> {
        let mut url = self.namespace_url()?;
        let scheme = match url.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => {
                return Err(ConfigError::InvalidUrl {
                    url: self.base_url.clone(),
                    reason: format!("unsupported scheme {other}"),
                })
            }
        };
        url.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: format!("cannot switch scheme to {scheme}"),
        })?;
        url.path_segments_mut()
            .map_err(|()| self.not_a_base())?
            .push("poll");
        Ok(url)
    }

    fn namespace_url(&self) -> Result<Url, ConfigError> {
        if !is_valid_namespace(&self.namespace) {
            return Err(ConfigError::Invalid {
                key: "PRESENCE_NAMESPACE",
                value: self.namespace.clone(),
                reason: "must be a single path segment of letters, digits, '-', '_' or '.'"
                    .into(),
            });
        }

        let mut url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        {
            let mut segments = url.path_segments_mut().map_err(|()| self.not_a_base())?;
            segments.pop_if_empty().push(&self.namespace);
        }
        url.set_query(None);
        if let Some(user_id) = &self.user_id {
            url.query_pairs_mut().append_pair("userId", user_id);
        }
        Ok(url)
    }

    fn not_a_base(&self) -> ConfigError {
        ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: "URL cannot carry a path".into(),
        }
    }
}

/// The hub mounts the namespace as one route segment, so the same rule
/// applies on both sides.
fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn parse_transports(raw: &str) -> Result<Vec<TransportKind>, ConfigError> {
    let kinds = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<TransportKind>().map_err(|reason| ConfigError::Invalid {
                key: "PRESENCE_TRANSPORTS",
                value: raw.to_string(),
                reason,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if kinds.is_empty() {
        return Err(ConfigError::Invalid {
            key: "PRESENCE_TRANSPORTS",
            value: raw.to_string(),
            reason: "at least one transport is required".into(),
        });
    }
    Ok(kinds)
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
