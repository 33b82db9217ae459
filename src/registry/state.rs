//! Per-device state machines driven by session events.
//!
//! Event-callback flag mutation is replaced by explicit transitions: a
//! watcher task applies every session event to the shared progress value,
//! and lifecycle operations read the resulting phase.

use crate::provider::SessionEvent;

/// Applies session events to a piece of per-device state.
pub(crate) trait ApplyEvent {
    fn apply(&mut self, device_id: &str, event: &SessionEvent);
}

/// Phase of an in-flight pairing handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingPhase {
    /// Session started, waiting for the TV to put a code on screen.
    AwaitingCode,
    /// TV reported the code is displayed.
    CodeDisplayed,
    /// Handshake finished on the TV side.
    Ready,
    /// Provider reported a failure.
    Failed,
}

/// Pairing handshake progress for one device.
#[derive(Debug, Clone)]
pub struct PairingProgress {
    pub phase: PairingPhase,
    pub last_error: Option<String>,
}

impl PairingProgress {
    pub fn new() -> Self {
        Self {
            phase: PairingPhase::AwaitingCode,
            last_error: None,
        }
    }

    pub fn code_displayed(&self) -> bool {
        matches!(
            self.phase,
            PairingPhase::CodeDisplayed | PairingPhase::Ready
        )
    }

    pub fn is_ready(&self) -> bool {
        self.phase == PairingPhase::Ready
    }
}

impl Default for PairingProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplyEvent for PairingProgress {
    fn apply(&mut self, device_id: &str, event: &SessionEvent) {
        match event {
            SessionEvent::Secret => {
                tracing::info!(device_id = %device_id, "Pairing code displayed on TV");
                if self.phase != PairingPhase::Failed {
                    self.phase = PairingPhase::CodeDisplayed;
                }
            }
            SessionEvent::Ready => {
                tracing::info!(device_id = %device_id, "Pairing handshake ready");
                if self.phase != PairingPhase::Failed {
                    self.phase = PairingPhase::Ready;
                }
            }
            SessionEvent::Error(message) => {
                tracing::warn!(device_id = %device_id, error = %message, "Pairing session error");
                self.phase = PairingPhase::Failed;
                self.last_error = Some(message.clone());
            }
            // Expected while pairing: the TV is waiting for the code.
            SessionEvent::Unpaired => {
                tracing::debug!(device_id = %device_id, "Session unpaired, waiting for code");
            }
            SessionEvent::Powered(on) => {
                tracing::debug!(device_id = %device_id, powered = on, "TV power state");
            }
            SessionEvent::Volume { level, maximum, muted } => {
                tracing::debug!(
                    device_id = %device_id,
                    level,
                    maximum,
                    muted,
                    "TV volume state"
                );
            }
        }
    }
}

/// State of an established remote-control link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Lost,
}

/// Connection progress for one device.
#[derive(Debug, Clone)]
pub struct ConnectionProgress {
    pub state: LinkState,
    pub last_error: Option<String>,
}

impl ConnectionProgress {
    pub fn connecting() -> Self {
        Self {
            state: LinkState::Connecting,
            last_error: None,
        }
    }

    pub fn connected() -> Self {
        Self {
            state: LinkState::Connected,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

impl ApplyEvent for ConnectionProgress {
    fn apply(&mut self, device_id: &str, event: &SessionEvent) {
        match event {
            SessionEvent::Ready => {
                tracing::info!(device_id = %device_id, "Session connected and ready");
                self.state = LinkState::Connected;
            }
            SessionEvent::Error(message) => {
                tracing::warn!(device_id = %device_id, error = %message, "Session error");
                self.state = LinkState::Lost;
                self.last_error = Some(message.clone());
            }
            SessionEvent::Unpaired => {
                tracing::warn!(device_id = %device_id, "Device is unpaired, needs pairing");
                self.state = LinkState::Lost;
                self.last_error = Some("Device is unpaired".to_string());
            }
            SessionEvent::Powered(on) => {
                tracing::info!(device_id = %device_id, powered = on, "TV power state");
            }
            SessionEvent::Volume { level, maximum, muted } => {
                tracing::debug!(
                    device_id = %device_id,
                    level,
                    maximum,
                    muted,
                    "TV volume state"
                );
            }
            SessionEvent::Secret => {
                tracing::debug!(device_id = %device_id, "Unexpected secret event on connected link");
            }
        }
    }
}
