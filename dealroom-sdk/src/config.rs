//! Runtime configuration for the sync client.
//!
//! Values come from [`SyncConfig::default`], the process environment
//! ([`SyncConfig::from_env`]), or are filled in by the embedding binary.

use std::time::Duration;

/// Default push-channel endpoint.
pub const DEFAULT_SOCKET_URL: &str = "ws://127.0.0.1:3001/socket";
/// Default REST base URL.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:3001/api";

pub const ENV_SOCKET_URL: &str = "DEALROOM_SOCKET_URL";
pub const ENV_API_URL: &str = "DEALROOM_API_URL";
pub const ENV_DEMO_MODE: &str = "DEALROOM_DEMO_MODE";
pub const ENV_TOKEN: &str = "DEALROOM_TOKEN";

/// Configuration for the push-channel connection and REST client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket URL of the push channel.
    pub socket_url: String,
    /// Base URL of the REST API.
    pub api_url: String,
    /// In demo mode the push channel is never opened.
    pub demo_mode: bool,
    /// Upper bound for `connect()` to receive the `connected` acknowledgement.
    pub connect_timeout: Duration,
    /// Cookie header sent on the upgrade request when no bearer token is available.
    pub cookie: Option<String>,
    pub reconnect: ReconnectConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            demo_mode: false,
            connect_timeout: Duration::from_secs(15),
            cookie: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Build a config from `DEALROOM_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_SOCKET_URL).filter(|s| !s.is_empty()) {
            config.socket_url = url;
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|s| !s.is_empty()) {
            config.api_url = url;
        }
        if let Some(flag) = lookup(ENV_DEMO_MODE) {
            config.demo_mode = parse_flag(&flag);
        }
        config
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Retry policy for the initial connect and for automatic reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Consecutive failed attempts tolerated before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait after the `attempt`-th consecutive failure (1-based),
    /// before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }

    /// [`delay_for`](Self::delay_for) plus up to 25% random jitter, still capped.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        use rand::Rng;
        let base = self.delay_for(attempt);
        let spread = base.as_millis() as u64 / 4;
        let jitter = if spread == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..spread)
        };
        (base + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_defaults() {
        let env: HashMap<&str, &str> = [
            (ENV_SOCKET_URL, "wss://sync.example.com/socket"),
            (ENV_DEMO_MODE, "TRUE"),
        ]
        .into_iter()
        .collect();
        let config = SyncConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.socket_url, "wss://sync.example.com/socket");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.demo_mode);
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
    }

    #[test]
    fn empty_values_keep_defaults() {
        let config = SyncConfig::from_lookup(|k| (k == ENV_SOCKET_URL).then(String::new));
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert!(!config.demo_mode);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectConfig::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
        for attempt in 1..6 {
            let d = policy.jittered_delay(attempt);
            assert!(d >= policy.delay_for(attempt));
            assert!(d <= policy.max_delay);
        }
    }
}
