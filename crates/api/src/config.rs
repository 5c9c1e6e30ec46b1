use std::time::Duration;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Path segment clients connect under (default: `presence`).
    pub namespace: String,
    /// Seconds between heartbeat passes (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// How long a long-poll request waits for a first frame (default: `25`).
    pub poll_timeout_secs: u64,
    /// Polling sessions idle for longer than this are dropped (default: `60`).
    pub poll_session_ttl_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `PRESENCE_NAMESPACE`      | `presence`                 |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                       |
    /// | `POLL_TIMEOUT_SECS`       | `25`                       |
    /// | `POLL_SESSION_TTL_SECS`   | `60`                       |
    ///
    /// Panics on invalid values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let namespace = std::env::var("PRESENCE_NAMESPACE")
            .unwrap_or_else(|_| "presence".into())
            .trim_matches('/')
            .to_string();
        assert!(
            is_valid_namespace(&namespace),
            "PRESENCE_NAMESPACE must be a single non-empty path segment, got '{namespace}'"
        );

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: secs_var("REQUEST_TIMEOUT_SECS", 30),
            namespace,
            heartbeat_interval_secs: secs_var("HEARTBEAT_INTERVAL_SECS", 30),
            poll_timeout_secs: secs_var("POLL_TIMEOUT_SECS", 25),
            poll_session_ttl_secs: secs_var("POLL_SESSION_TTL_SECS", 60),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn poll_session_ttl(&self) -> Duration {
        Duration::from_secs(self.poll_session_ttl_secs)
    }
}

fn secs_var(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid u64, got '{value}'")),
        Err(_) => default,
    }
}

/// The namespace becomes a route segment, so it may not contain path or
/// route-pattern syntax.
fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_must_be_one_plain_segment() {
        assert!(is_valid_namespace("presence"));
        assert!(is_valid_namespace("presence-v2"));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("a/b"));
        assert!(!is_valid_namespace("{sid}"));
    }
}
