//! Remote session provider abstraction.
//!
//! The pairing cryptography and the remote-control wire protocol live
//! behind these traits. The bridge only drives session lifecycle and
//! forwards commands; it never inspects certificate material beyond
//! carrying it between the caller and the session.

pub mod simulator;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ProviderError;

/// Asynchronous lifecycle signals emitted by a session.
///
/// Mirrors the event surface of the TV remote service: `Secret` when the
/// pairing code is on screen, `Ready` when the channel is authenticated
/// and usable, `Unpaired` when the TV does not recognize the client
/// certificate.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Secret,
    Ready,
    Unpaired,
    Powered(bool),
    Volume {
        level: u32,
        maximum: u32,
        muted: bool,
    },
    Error(String),
}

/// How a key press is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    Short,
    Long,
}

/// Parameters for opening a session against one TV.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// TV host (dotted-quad address).
    pub host: String,
    /// TV-side pairing port.
    pub pairing_port: u16,
    /// TV-side remote-control port.
    pub remote_port: u16,
    /// Name shown on the TV's pairing screen.
    pub client_name: String,
    /// Certificate material from a previous pairing; empty means the
    /// session starts unpaired.
    pub certificate: Certificate,
}

/// Opaque certificate material produced by the pairing handshake.
///
/// The bridge stores and serializes it for the caller but never
/// interprets it; the provider owns its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate(serde_json::Value);

impl Certificate {
    /// Material for a not-yet-paired session.
    pub fn empty() -> Self {
        Certificate(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Wrap raw provider material.
    pub fn new(value: serde_json::Value) -> Self {
        Certificate(value)
    }

    /// Parse serialized material. Returns `None` when the input is not
    /// valid JSON; callers decide whether that degrades to `empty()`.
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok().map(Certificate)
    }

    /// Serialize for caller-side persistence.
    pub fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl Default for Certificate {
    fn default() -> Self {
        Self::empty()
    }
}

/// One stateful remote-control channel to a TV.
///
/// Implementations own the socket and the protocol; callers subscribe to
/// events before `start` so no signal is missed.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Open the underlying connection and begin the pairing or
    /// authentication exchange.
    async fn start(&self) -> Result<(), ProviderError>;

    /// Submit a pairing code previously displayed on the TV.
    async fn send_code(&self, code: &str) -> Result<(), ProviderError>;

    /// Send a key press.
    async fn send_key(&self, key_code: i32, press: KeyPress) -> Result<(), ProviderError>;

    /// Send an app-link activation request.
    async fn send_app_link(&self, url: &str) -> Result<(), ProviderError>;

    /// Certificate material once pairing has completed.
    async fn certificate(&self) -> Option<Certificate>;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Tear the session down. Idempotent.
    async fn stop(&self);
}

/// Factory for remote sessions.
#[async_trait]
pub trait RemoteSessionProvider: Send + Sync {
    async fn open(&self, options: SessionOptions) -> Result<Arc<dyn RemoteSession>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_certificate_is_empty() {
        assert!(Certificate::empty().is_empty());
        assert_eq!(Certificate::empty().to_json_string(), "{}");
    }

    #[test]
    fn test_default_certificate_is_empty() {
        assert!(Certificate::default().is_empty());
    }

    #[test]
    fn test_certificate_roundtrip() {
        let raw = r#"{"cert":"-----BEGIN-----","key":"abc"}"#;
        let cert = Certificate::from_json(raw).unwrap();
        assert!(!cert.is_empty());
        let reparsed = Certificate::from_json(&cert.to_json_string()).unwrap();
        assert_eq!(cert, reparsed);
    }

    #[test]
    fn test_malformed_certificate_is_none() {
        assert!(Certificate::from_json("not json{{{").is_none());
        assert!(Certificate::from_json("").is_none());
    }

    #[test]
    fn test_null_certificate_counts_as_empty() {
        let cert = Certificate::from_json("null").unwrap();
        assert!(cert.is_empty());
    }
}
