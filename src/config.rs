//! Configuration loading and persistence.
//!
//! Settings are read from `config.json` in the platform config directory,
//! then overridden by `WEECLIENT_*` environment variables. The relay
//! password is never written to disk; it comes from `WEECLIENT_PASSWORD`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::fs;

use crate::commands::startup_commands;
use crate::constants::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_HISTORY_LINES, DEFAULT_WEBSOCKET_PATH, MAX_FRAME_SIZE,
    MAX_NESTING_DEPTH,
};
use crate::dispatch::{DispatchConfig, LineOrder};
use crate::protocol::DecoderConfig;
use crate::session::SessionConfig;
use crate::transport::TransportKind;

/// Configuration for the relay client.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Relay address: `host[:port]` for TCP, host (and optional port) for WebSocket.
    pub relay: String,
    /// Carrier to connect with.
    pub transport: TransportKind,
    /// Path of the WebSocket endpoint.
    pub websocket_path: String,
    /// Use `wss://` for the WebSocket transport.
    pub tls: bool,
    /// Relay password - NOT serialized to disk.
    #[serde(skip)]
    pub password: String,
    /// History lines requested per buffer at startup.
    pub history_lines: u32,
    /// Capacity of the session event channel.
    pub event_capacity: usize,
    /// Seconds without a frame before the connection is considered dead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_secs: Option<u64>,
    /// Largest frame accepted from a TCP relay.
    pub max_frame_size: usize,
    /// Ask the relay to zlib-compress its messages.
    pub compression: bool,
    /// Log every decoded message at trace level.
    pub trace_protocol: bool,
    /// Order of rows in a live line notification.
    pub live_line_order: LineOrder,
    /// Order of rows in a history response.
    pub history_line_order: LineOrder,
}

impl Default for Config {
    fn default() -> Self {
        let dispatch = DispatchConfig::default();
        Self {
            relay: "localhost".to_string(),
            transport: TransportKind::Relay,
            websocket_path: DEFAULT_WEBSOCKET_PATH.to_string(),
            tls: false,
            password: String::new(),
            history_lines: DEFAULT_HISTORY_LINES,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            read_timeout_secs: None,
            max_frame_size: MAX_FRAME_SIZE,
            compression: true,
            trace_protocol: false,
            live_line_order: dispatch.live_order,
            history_line_order: dispatch.history_order,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `WEECLIENT_CONFIG_DIR` overrides the platform directory
    /// (e.g. `~/.config/weeclient` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("WEECLIENT_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("weeclient"))
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Loads configuration from the default file (if present), with
    /// environment variable overrides.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            log::debug!("[Config] No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a specific file, without overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Persists the configuration to the default file.
    /// Note: the password is NOT saved.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        self.save_to(&path)
    }

    /// Persists the configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }

    /// Apply `WEECLIENT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `WEECLIENT_*` overrides from `lookup`. Unparsable values are
    /// ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(relay) = lookup("WEECLIENT_RELAY") {
            self.relay = relay;
        }

        // Password from env var only; never read from the config file
        if let Some(password) = lookup("WEECLIENT_PASSWORD") {
            self.password = password;
        }

        if let Some(path) = lookup("WEECLIENT_WEBSOCKET_PATH") {
            self.websocket_path = path;
        }

        override_parsed(&lookup, "WEECLIENT_TRANSPORT", &mut self.transport);
        override_parsed(&lookup, "WEECLIENT_HISTORY_LINES", &mut self.history_lines);
        override_parsed(&lookup, "WEECLIENT_EVENT_CAPACITY", &mut self.event_capacity);
        override_parsed(&lookup, "WEECLIENT_MAX_FRAME_SIZE", &mut self.max_frame_size);
        override_flag(&lookup, "WEECLIENT_TLS", &mut self.tls);
        override_flag(&lookup, "WEECLIENT_COMPRESSION", &mut self.compression);
        override_flag(&lookup, "WEECLIENT_TRACE", &mut self.trace_protocol);

        if let Some(secs) = lookup("WEECLIENT_READ_TIMEOUT") {
            match secs.parse::<u64>() {
                Ok(0) => self.read_timeout_secs = None,
                Ok(secs) => self.read_timeout_secs = Some(secs),
                Err(e) => log::warn!("[Config] Ignoring WEECLIENT_READ_TIMEOUT={secs:?}: {e}"),
            }
        }
    }

    /// Read deadline, if one is configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Decoder settings derived from this configuration.
    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            trace: self.trace_protocol,
            max_depth: MAX_NESTING_DEPTH,
            max_payload: self.max_frame_size,
        }
    }

    /// Dispatcher settings derived from this configuration.
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            live_order: self.live_line_order,
            history_order: self.history_line_order,
        }
    }

    /// Session settings, startup commands included.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            decoder: self.decoder_config(),
            dispatch: self.dispatch_config(),
            event_capacity: self.event_capacity,
            read_timeout: self.read_timeout(),
            startup: startup_commands(self),
        }
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T)
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        match raw.parse::<T>() {
            Ok(value) => *target = value,
            Err(e) => log::warn!("[Config] Ignoring {key}={raw:?}: {e}"),
        }
    }
}

fn override_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut bool) {
    if let Some(raw) = lookup(key) {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => *target = true,
            "0" | "false" | "no" | "off" => *target = false,
            _ => log::warn!("[Config] Ignoring {key}={raw:?}: expected a boolean"),
        }
    }
}
