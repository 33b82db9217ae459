//! Error types for the bridge.

use std::time::Duration;

/// Top-level error type for bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("{0}")]
    Validation(String),

    #[error("Device not found: {device_id}. {hint}")]
    NotFound { device_id: String, hint: String },

    #[error("Timed out waiting for {what} after {timeout:?}")]
    Timeout { what: String, timeout: Duration },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Server error: {0}")]
    Server(String),
}

impl BridgeError {
    /// Validation failure with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        BridgeError::Validation(message.into())
    }

    /// Unknown or disconnected device.
    pub fn not_found(device_id: impl Into<String>, hint: impl Into<String>) -> Self {
        BridgeError::NotFound {
            device_id: device_id.into(),
            hint: hint.into(),
        }
    }
}

/// Errors surfaced by the remote session provider, either thrown from its
/// calls or reported through its error event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Session start failed for {host}: {reason}")]
    StartFailed { host: String, reason: String },

    #[error("Failed to send {what}: {reason}")]
    SendFailed { what: String, reason: String },

    #[error("Session reported error: {0}")]
    Session(String),

    #[error("Device reports unpaired, pairing required")]
    Unpaired,

    #[error("No certificate material available from session")]
    CertificateUnavailable,

    #[error("Session is closed")]
    Closed,
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = BridgeError::validation("Missing required parameter: deviceId");
        assert_eq!(err.to_string(), "Missing required parameter: deviceId");
    }

    #[test]
    fn test_not_found_error_display() {
        let err = BridgeError::not_found("living-room", "Run /connect first");
        let msg = err.to_string();
        assert!(msg.contains("living-room"));
        assert!(msg.contains("Run /connect first"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = BridgeError::Timeout {
            what: "pairing handshake".to_string(),
            timeout: Duration::from_secs(3),
        };
        let msg = err.to_string();
        assert!(msg.contains("pairing handshake"));
        assert!(msg.contains("3"));
    }

    #[test]
    fn test_provider_error_start_failed_display() {
        let err = ProviderError::StartFailed {
            host: "192.168.1.50".to_string(),
            reason: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("192.168.1.50"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_provider_error_unpaired_display() {
        let err = ProviderError::Unpaired;
        assert!(err.to_string().contains("pairing required"));
    }

    #[test]
    fn test_config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "TVBRIDGE_PORT".to_string(),
            message: "must be a number".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("TVBRIDGE_PORT"));
        assert!(msg.contains("must be a number"));
    }

    #[test]
    fn test_error_from_provider_error() {
        let err = BridgeError::from(ProviderError::Closed);
        assert!(err.to_string().contains("Provider error"));
    }

    #[test]
    fn test_error_from_config_error() {
        let inner = ConfigError::InvalidValue {
            key: "TVBRIDGE_BIND".to_string(),
            message: "not an address".to_string(),
        };
        let err = BridgeError::from(inner);
        assert!(err.to_string().contains("Configuration error"));
    }
}
