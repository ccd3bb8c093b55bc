//! Persistent configuration for the dealroom CLI.
//!
//! Config file lives at `~/.config/dealroom/cli.toml`. Every field is
//! optional; unset fields fall back to the environment and built-in
//! defaults. Command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dealroom_sdk::SyncConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Push-channel WebSocket URL.
    pub socket_url: Option<String>,
    /// REST API base URL.
    pub api_url: Option<String>,
    /// Never open the push channel.
    pub demo_mode: Option<bool>,
    /// Cookie header for servers using session cookies instead of tokens.
    pub cookie: Option<String>,
    /// Seconds to wait for the server to acknowledge a connection.
    pub connect_timeout_secs: Option<u64>,
    /// Connection attempts before giving up.
    pub max_reconnect_attempts: Option<u32>,
}

fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dealroom")
}

pub fn config_path() -> PathBuf {
    config_dir().join("cli.toml")
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(s) => match toml::from_str(&s) {
                    Ok(c) => return c,
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "Bad config file"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Can't read config file"),
            }
        }
        Self::default()
    }

    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overlay the fields that are set onto `sync`.
    pub fn apply(&self, sync: &mut SyncConfig) {
        if let Some(url) = &self.socket_url {
            sync.socket_url = url.clone();
        }
        if let Some(url) = &self.api_url {
            sync.api_url = url.clone();
        }
        if let Some(demo) = self.demo_mode {
            sync.demo_mode = demo;
        }
        if self.cookie.is_some() {
            sync.cookie = self.cookie.clone();
        }
        if let Some(secs) = self.connect_timeout_secs {
            sync.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = self.max_reconnect_attempts {
            sync.reconnect.max_attempts = attempts.max(1);
        }
    }

    /// Copy every field set in `other` over this one.
    pub fn merge(&mut self, other: &Config) {
        let Config {
            socket_url,
            api_url,
            demo_mode,
            cookie,
            connect_timeout_secs,
            max_reconnect_attempts,
        } = other;
        if socket_url.is_some() {
            self.socket_url = socket_url.clone();
        }
        if api_url.is_some() {
            self.api_url = api_url.clone();
        }
        if demo_mode.is_some() {
            self.demo_mode = *demo_mode;
        }
        if cookie.is_some() {
            self.cookie = cookie.clone();
        }
        if connect_timeout_secs.is_some() {
            self.connect_timeout_secs = *connect_timeout_secs;
        }
        if max_reconnect_attempts.is_some() {
            self.max_reconnect_attempts = *max_reconnect_attempts;
        }
    }
}
