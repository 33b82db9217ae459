//! Bridge configuration loaded from environment variables.
//!
//! All settings have working defaults; `TVBRIDGE_*` variables (or a `.env`
//! file loaded by the binary) override them. CLI flags override both.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::ConfigError;

/// Default HTTP port.
const DEFAULT_PORT: u16 = 3000;

/// Default TV-side ports for pairing and remote control.
const DEFAULT_PAIRING_PORT: u16 = 6467;
const DEFAULT_REMOTE_PORT: u16 = 6466;

/// Display name shown on the TV's pairing screen when the caller
/// does not supply one.
const DEFAULT_CLIENT_NAME: &str = "Hubitat";

/// How long `pair/start` waits for the TV to report its code on screen.
const DEFAULT_CODE_WAIT_MS: u64 = 1000;

/// How long `pair/complete` waits for the handshake to finish.
const DEFAULT_PAIRING_TIMEOUT_MS: u64 = 3000;

/// How long `connect` waits for an authenticated session to become ready.
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Runtime configuration for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address to bind the HTTP listener to.
    pub bind: IpAddr,
    /// HTTP port to listen on.
    pub port: u16,
    /// Default display name presented to TVs during pairing.
    pub client_name: String,
    /// TV-side pairing port.
    pub pairing_port: u16,
    /// TV-side remote-control port.
    pub remote_port: u16,
    /// Bound on waiting for the code-displayed signal during `pair/start`.
    pub code_wait: Duration,
    /// Bound on waiting for the handshake to finish during `pair/complete`.
    pub pairing_timeout: Duration,
    /// Bound on waiting for a session to become ready during `connect`.
    pub connect_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            pairing_port: DEFAULT_PAIRING_PORT,
            remote_port: DEFAULT_REMOTE_PORT,
            code_wait: Duration::from_millis(DEFAULT_CODE_WAIT_MS),
            pairing_timeout: Duration::from_millis(DEFAULT_PAIRING_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through a lookup function. Tests use this to
    /// avoid mutating process-global environment state.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("TVBRIDGE_BIND") {
            config.bind = parse(&raw, "TVBRIDGE_BIND", "must be an IP address")?;
        }
        if let Some(raw) = lookup("TVBRIDGE_PORT") {
            config.port = parse(&raw, "TVBRIDGE_PORT", "must be a port number")?;
        }
        if let Some(name) = lookup("TVBRIDGE_CLIENT_NAME") {
            config.client_name = name;
        }
        if let Some(raw) = lookup("TVBRIDGE_PAIRING_PORT") {
            config.pairing_port = parse(&raw, "TVBRIDGE_PAIRING_PORT", "must be a port number")?;
        }
        if let Some(raw) = lookup("TVBRIDGE_REMOTE_PORT") {
            config.remote_port = parse(&raw, "TVBRIDGE_REMOTE_PORT", "must be a port number")?;
        }
        if let Some(raw) = lookup("TVBRIDGE_CODE_WAIT_MS") {
            config.code_wait = parse_millis(&raw, "TVBRIDGE_CODE_WAIT_MS")?;
        }
        if let Some(raw) = lookup("TVBRIDGE_PAIRING_TIMEOUT_MS") {
            config.pairing_timeout = parse_millis(&raw, "TVBRIDGE_PAIRING_TIMEOUT_MS")?;
        }
        if let Some(raw) = lookup("TVBRIDGE_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = parse_millis(&raw, "TVBRIDGE_CONNECT_TIMEOUT_MS")?;
        }

        Ok(config)
    }

    /// Socket address the HTTP server binds to.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse<T: std::str::FromStr>(raw: &str, key: &str, message: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{message} (got {raw:?})"),
    })
}

fn parse_millis(raw: &str, key: &str) -> Result<Duration, ConfigError> {
    let ms: u64 = parse(raw, key, "must be a duration in milliseconds")?;
    Ok(Duration::from_millis(ms))
}
