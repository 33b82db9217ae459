//! HTTP bridge for Android TV remote-control sessions.
//!
//! Exposes REST endpoints that translate stateless HTTP requests into
//! operations on long-lived pairing and remote-control sessions: the
//! two-phase pairing handshake, certificate exchange, and key/app
//! commands. Session protocol internals live behind the
//! [`provider::RemoteSessionProvider`] trait; this crate owns the device
//! registry, handshake sequencing, and per-device consistency under
//! concurrent HTTP calls.

pub mod config;
pub mod error;
pub mod provider;
pub mod registry;
pub mod server;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use registry::DeviceRegistry;
pub use server::BridgeServer;
