/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long to wait for in-flight requests after a shutdown signal.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default   |
    /// |-------------------------|-----------|
    /// | `HOST`                  | `0.0.0.0` |
    /// | `PORT`                  | `3000`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`      |
    ///
    /// Unparsable numbers fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| -> u64 {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, default, "Invalid number, using default");
                    default
                }),
                None => default,
            }
        };

        let port = u16::try_from(number("PORT", 3000)).unwrap_or_else(|_| {
            tracing::warn!("PORT out of range, using 3000");
            3000
        });

        Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            request_timeout_secs: number("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: number("SHUTDOWN_TIMEOUT_SECS", 30),
        }
    }
}
