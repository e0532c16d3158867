//! Client configuration.

use std::{env, time::Duration};

use tracing::warn;

/// Default bound on a single HTTP exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default path of the WebUI below the daemon's root.
pub const DEFAULT_WEB_ROOT: &str = "gui";

/// Configuration for the [`crate::WebUiClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout applied to every HTTP exchange, token page included.
    pub request_timeout: Duration,
    /// Path of the WebUI, `gui` on stock daemons.
    pub web_root: String,
    /// User agent sent with every request. `reqwest`'s default when unset.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            web_root: DEFAULT_WEB_ROOT.to_owned(),
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Reads the configuration from the environment, falling back to the defaults:
    /// - `UTORRENT_REQUEST_TIMEOUT_SECS`
    /// - `UTORRENT_WEB_ROOT`
    /// - `UTORRENT_USER_AGENT`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            request_timeout: lookup("UTORRENT_REQUEST_TIMEOUT_SECS")
                .and_then(|raw| parse_timeout(&raw))
                .unwrap_or(defaults.request_timeout),
            web_root: lookup("UTORRENT_WEB_ROOT").unwrap_or(defaults.web_root),
            user_agent: lookup("UTORRENT_USER_AGENT").filter(|s| !s.is_empty()),
        }
    }
}

/// Whole seconds, at least one.
fn parse_timeout(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) => {
            warn!("UTORRENT_REQUEST_TIMEOUT_SECS must be at least 1, using the default");
            None
        }
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(err) => {
            warn!("ignoring UTORRENT_REQUEST_TIMEOUT_SECS={raw:?}: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn lookup_overrides_defaults() {
        let vars = HashMap::from([
            ("UTORRENT_REQUEST_TIMEOUT_SECS", "3"),
            ("UTORRENT_WEB_ROOT", "webui"),
            ("UTORRENT_USER_AGENT", "poller/1.0"),
        ]);
        let config = ClientConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.web_root, "webui");
        assert_eq!(config.user_agent.as_deref(), Some("poller/1.0"));
    }

    #[test_log::test]
    fn unparsable_values_fall_back() {
        let config = ClientConfig::from_lookup(|key| match key {
            "UTORRENT_REQUEST_TIMEOUT_SECS" => Some("soon".into()),
            "UTORRENT_USER_AGENT" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config, ClientConfig::default());
    }

    #[test_log::test]
    fn zero_timeout_falls_back() {
        let config = ClientConfig::from_lookup(|key| {
            (key == "UTORRENT_REQUEST_TIMEOUT_SECS").then(|| " 0 ".to_owned())
        });
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(parse_timeout("1"), Some(Duration::from_secs(1)));
        assert_eq!(parse_timeout("-5"), None);
    }
}
