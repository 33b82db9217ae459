//! In-process session provider that simulates a TV.
//!
//! Emits the same event sequences a real remote-control session would:
//! `Unpaired` then `Secret` when started without certificate material,
//! `Powered` then `Ready` when started with it, and `Ready` plus fresh
//! certificate material after a correct pairing code. Drives development
//! and the test suite without a TV on the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::broadcast;

use crate::error::ProviderError;
use crate::provider::{
    Certificate, KeyPress, RemoteSession, RemoteSessionProvider, SessionEvent, SessionOptions,
};

/// Event channel capacity per session. Lifecycle traffic is tiny; a
/// lagged receiver only ever skips stale events.
const EVENT_CAPACITY: usize = 16;

/// Knobs controlling how simulated sessions behave.
#[derive(Debug, Clone, Default)]
pub struct SimulatorBehavior {
    /// Pairing code the simulated TV expects. `None` accepts any code.
    pub expected_code: Option<String>,
    /// Fail `start()` with this reason instead of coming up.
    pub fail_start: Option<String>,
    /// Never emit events. Exercises the bridge's timeout paths.
    pub silent: bool,
}

/// Provider handing out [`SimulatedSession`]s.
#[derive(Debug, Default)]
pub struct SimulatorProvider {
    behavior: SimulatorBehavior,
    opened: AtomicUsize,
}

impl SimulatorProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: SimulatorBehavior) -> Self {
        Self {
            behavior,
            opened: AtomicUsize::new(0),
        }
    }

    /// Number of sessions opened over the provider's lifetime.
    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSessionProvider for SimulatorProvider {
    async fn open(&self, options: SessionOptions) -> Result<Arc<dyn RemoteSession>, ProviderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Arc::new(SimulatedSession {
            options,
            behavior: self.behavior.clone(),
            events,
            certificate: std::sync::Mutex::new(None),
            stopped: AtomicBool::new(false),
        }))
    }
}

/// One simulated remote-control channel.
pub struct SimulatedSession {
    options: SessionOptions,
    behavior: SimulatorBehavior,
    events: broadcast::Sender<SessionEvent>,
    certificate: std::sync::Mutex<Option<Certificate>>,
    stopped: AtomicBool,
}

impl SimulatedSession {
    fn emit(&self, event: SessionEvent) {
        // No receivers is fine; events are best-effort signals.
        let _ = self.events.send(event);
    }

    fn ensure_open(&self) -> Result<(), ProviderError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteSession for SimulatedSession {
    async fn start(&self) -> Result<(), ProviderError> {
        self.ensure_open()?;
        if let Some(reason) = &self.behavior.fail_start {
            return Err(ProviderError::StartFailed {
                host: self.options.host.clone(),
                reason: reason.clone(),
            });
        }
        if self.behavior.silent {
            return Ok(());
        }
        if self.options.certificate.is_empty() {
            // Unpaired: the TV puts a code on screen and waits.
            self.emit(SessionEvent::Unpaired);
            self.emit(SessionEvent::Secret);
        } else {
            *self.certificate.lock().expect("certificate lock") =
                Some(self.options.certificate.clone());
            self.emit(SessionEvent::Powered(true));
            self.emit(SessionEvent::Ready);
        }
        Ok(())
    }

    async fn send_code(&self, code: &str) -> Result<(), ProviderError> {
        self.ensure_open()?;
        if self.behavior.silent {
            return Ok(());
        }
        // The pairing service compares codes exactly; clients are expected
        // to submit uppercase.
        let accepted = match &self.behavior.expected_code {
            Some(expected) => expected == code,
            None => true,
        };
        if accepted {
            *self.certificate.lock().expect("certificate lock") = Some(generate_certificate());
            self.emit(SessionEvent::Ready);
        } else {
            // Real TVs report a bad code asynchronously, not as a send error.
            self.emit(SessionEvent::Error("Invalid pairing code".to_string()));
        }
        Ok(())
    }

    async fn send_key(&self, _key_code: i32, _press: KeyPress) -> Result<(), ProviderError> {
        self.ensure_open()
    }

    async fn send_app_link(&self, _url: &str) -> Result<(), ProviderError> {
        self.ensure_open()
    }

    async fn certificate(&self) -> Option<Certificate> {
        self.certificate.lock().expect("certificate lock").clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Fresh opaque certificate material for a completed pairing.
fn generate_certificate() -> Certificate {
    let mut rng = rand::thread_rng();
    let serial: u64 = rng.r#gen();
    Certificate::new(serde_json::json!({
        "cert": format!("sim-cert-{serial:016x}"),
        "key": format!("sim-key-{serial:016x}"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(certificate: Certificate) -> SessionOptions {
        SessionOptions {
            host: "192.168.1.50".to_string(),
            pairing_port: 6467,
            remote_port: 6466,
            client_name: "Hubitat".to_string(),
            certificate,
        }
    }

    async fn open(provider: &SimulatorProvider, certificate: Certificate) -> Arc<dyn RemoteSession> {
        provider.open(options(certificate)).await.unwrap()
    }

    #[tokio::test]
    async fn test_unpaired_start_emits_unpaired_then_secret() {
        let provider = SimulatorProvider::new();
        let session = open(&provider, Certificate::empty()).await;
        let mut rx = session.subscribe();

        session.start().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Unpaired);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Secret);
        assert!(session.certificate().await.is_none());
    }

    #[tokio::test]
    async fn test_paired_start_emits_ready() {
        let provider = SimulatorProvider::new();
        let cert = Certificate::from_json(r#"{"cert":"stored"}"#).unwrap();
        let session = open(&provider, cert.clone()).await;
        let mut rx = session.subscribe();

        session.start().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Powered(true));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Ready);
        assert_eq!(session.certificate().await, Some(cert));
    }

    #[tokio::test]
    async fn test_send_code_stores_certificate_and_emits_ready() {
        let provider = SimulatorProvider::new();
        let session = open(&provider, Certificate::empty()).await;
        session.start().await.unwrap();
        let mut rx = session.subscribe();

        session.send_code("AB12CD").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), SessionEvent::Ready);
        let cert = session.certificate().await.unwrap();
        assert!(!cert.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_code_emits_error_without_certificate() {
        let provider = SimulatorProvider::with_behavior(SimulatorBehavior {
            expected_code: Some("AB12CD".to_string()),
            ..SimulatorBehavior::default()
        });
        let session = open(&provider, Certificate::empty()).await;
        session.start().await.unwrap();
        let mut rx = session.subscribe();

        session.send_code("ZZZZZZ").await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), SessionEvent::Error(_)));
        assert!(session.certificate().await.is_none());
    }

    #[tokio::test]
    async fn test_expected_code_requires_exact_match() {
        let provider = SimulatorProvider::with_behavior(SimulatorBehavior {
            expected_code: Some("AB12CD".to_string()),
            ..SimulatorBehavior::default()
        });
        let session = open(&provider, Certificate::empty()).await;
        session.start().await.unwrap();

        session.send_code("ab12cd").await.unwrap();
        assert!(session.certificate().await.is_none());

        session.send_code("AB12CD").await.unwrap();
        assert!(session.certificate().await.is_some());
    }

    #[tokio::test]
    async fn test_silent_session_emits_nothing() {
        let provider = SimulatorProvider::with_behavior(SimulatorBehavior {
            silent: true,
            ..SimulatorBehavior::default()
        });
        let session = open(&provider, Certificate::empty()).await;
        let mut rx = session.subscribe();

        session.start().await.unwrap();
        session.send_code("AB12CD").await.unwrap();

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_fail_start() {
        let provider = SimulatorProvider::with_behavior(SimulatorBehavior {
            fail_start: Some("connection refused".to_string()),
            ..SimulatorBehavior::default()
        });
        let session = open(&provider, Certificate::empty()).await;
        let err = session.start().await.unwrap_err();
        assert!(matches!(err, ProviderError::StartFailed { .. }));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_stopped_session_rejects_commands() {
        let provider = SimulatorProvider::new();
        let session = open(&provider, Certificate::empty()).await;
        session.start().await.unwrap();
        session.stop().await;

        assert!(matches!(
            session.send_key(26, KeyPress::Short).await,
            Err(ProviderError::Closed)
        ));
        assert!(matches!(
            session.send_app_link("https://example.com").await,
            Err(ProviderError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_provider_counts_opened_sessions() {
        let provider = SimulatorProvider::new();
        assert_eq!(provider.sessions_opened(), 0);
        let _a = open(&provider, Certificate::empty()).await;
        let _b = open(&provider, Certificate::empty()).await;
        assert_eq!(provider.sessions_opened(), 2);
    }

    #[test]
    fn test_generated_certificates_are_unique() {
        let a = generate_certificate();
        let b = generate_certificate();
        assert_ne!(a.to_json_string(), b.to_json_string());
    }
}
