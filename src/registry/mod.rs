//! Device session registry.
//!
//! Tracks which devices are mid-pairing vs connected and serializes
//! lifecycle operations per device id. The registry owns every live
//! session handle; records are created and consumed here, never by
//! handlers. Handshake steps await the session's own signals bounded by
//! configured timeouts instead of sleeping a fixed grace period.
//!
//! State is in-memory only; devices re-pair or reconnect with stored
//! certificates after a restart.

pub mod state;
pub mod validate;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ProviderError, Result};
use crate::provider::{
    Certificate, KeyPress, RemoteSession, RemoteSessionProvider, SessionEvent, SessionOptions,
};
use state::{ApplyEvent, ConnectionProgress, PairingProgress};

/// Response for `/text`: the underlying capability does not exist
/// upstream, so the bridge reports that instead of pretending.
pub const TEXT_INPUT_MESSAGE: &str = "Text input is not supported by the remote session provider";

/// Result of starting a pairing handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingStarted {
    /// Whether the TV reported its code on screen within the wait window.
    /// `false` is not a failure; the code may still appear.
    pub code_displayed: bool,
}

/// Result of completing a pairing handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCompleted {
    /// Serialized certificate material. The caller owns durable storage;
    /// the bridge keeps only the in-memory session.
    pub certificate: String,
}

/// Result of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// A live session already existed; no new socket was opened.
    AlreadyConnected,
}

/// Read-only connection status for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub connected: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Which namespace a registry record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Pairing,
    Connected,
}

/// One row of the device listing.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub kind: DeviceKind,
    pub host: String,
    pub connected: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Registry-level counters for the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub connected_devices: usize,
    pub pairing_in_progress: usize,
    pub total_devices: usize,
    pub uptime_secs: u64,
}

/// An in-flight pairing handshake.
struct PairingEntry {
    host: String,
    progress: Arc<StdMutex<PairingProgress>>,
    session: Arc<dyn RemoteSession>,
    watcher: JoinHandle<()>,
}

impl PairingEntry {
    async fn teardown(self) {
        self.watcher.abort();
        self.session.stop().await;
    }
}

/// An established remote-control link.
struct ConnectedEntry {
    host: String,
    certificate: Certificate,
    progress: Arc<StdMutex<ConnectionProgress>>,
    last_activity: DateTime<Utc>,
    session: Arc<dyn RemoteSession>,
    watcher: JoinHandle<()>,
}

impl ConnectedEntry {
    async fn teardown(self) {
        self.watcher.abort();
        self.session.stop().await;
    }
}

/// Tracks per-device sessions and sequences their lifecycle.
///
/// Cheap to clone; all clones share the same state. Created at process
/// start and torn down with [`DeviceRegistry::shutdown`].
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: BridgeConfig,
    provider: Arc<dyn RemoteSessionProvider>,
    /// Pairing handshakes in flight, by device id.
    pairing: RwLock<HashMap<String, PairingEntry>>,
    /// Established links, by device id. A device may appear in both maps
    /// while re-pairing, but never twice in either.
    connected: RwLock<HashMap<String, ConnectedEntry>>,
    /// One mutex per device id ever seen. Lifecycle operations hold it
    /// for their full duration so handshake steps cannot interleave.
    /// Entries are never evicted: eviction would race a concurrent
    /// holder into a fresh lock.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    started_at: Instant,
}

impl DeviceRegistry {
    pub fn new(config: BridgeConfig, provider: Arc<dyn RemoteSessionProvider>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                provider,
                pairing: RwLock::new(HashMap::new()),
                connected: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                started_at: Instant::now(),
            }),
        }
    }

    /// Initiate the pairing handshake: open an unpaired session and wait
    /// (bounded) for the TV to report its code on screen.
    pub async fn start_pairing(
        &self,
        device_id: &str,
        host: &str,
        device_name: Option<&str>,
    ) -> Result<PairingStarted> {
        validate::require_param(device_id, "deviceId")?;
        validate::require_param(host, "host")?;
        validate::require_dotted_quad(host)?;
        let client_name = device_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.inner.config.client_name);

        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        tracing::info!(
            device_id = %device_id,
            host = %host,
            client_name = %client_name,
            "Starting pairing"
        );

        let session = self
            .inner
            .provider
            .open(SessionOptions {
                host: host.to_string(),
                pairing_port: self.inner.config.pairing_port,
                remote_port: self.inner.config.remote_port,
                client_name: client_name.to_string(),
                certificate: Certificate::empty(),
            })
            .await?;

        // Subscribe before start so no signal is missed.
        let mut wait_rx = session.subscribe();
        let progress = Arc::new(StdMutex::new(PairingProgress::new()));
        let watcher =
            spawn_event_watcher(device_id.to_string(), session.subscribe(), progress.clone());

        // Register before start: events may fire during start().
        let previous = {
            let mut pairing = self.inner.pairing.write().await;
            pairing.insert(
                device_id.to_string(),
                PairingEntry {
                    host: host.to_string(),
                    progress: progress.clone(),
                    session: Arc::clone(&session),
                    watcher,
                },
            )
        };
        if let Some(previous) = previous {
            tracing::warn!(
                device_id = %device_id,
                "Replacing in-flight pairing, stopping previous session"
            );
            previous.teardown().await;
        }

        if let Err(err) = session.start().await {
            self.remove_pairing(device_id).await;
            return Err(err.into());
        }

        let displayed = match self.await_code_displayed(&mut wait_rx).await {
            Ok(displayed) => displayed,
            Err(err) => {
                // A session that failed during startup has nothing a later
                // complete_pairing could consume.
                self.remove_pairing(device_id).await;
                return Err(err);
            }
        };
        // The watcher is authoritative in case our receiver lagged.
        let code_displayed =
            displayed || progress.lock().expect("progress lock").code_displayed();

        tracing::info!(device_id = %device_id, code_displayed, "Pairing initiated");
        Ok(PairingStarted { code_displayed })
    }

    /// Submit the on-screen code and promote the pairing session to a
    /// connected one. Returns serialized certificate material for
    /// caller-side persistence.
    pub async fn complete_pairing(&self, device_id: &str, code: &str) -> Result<PairingCompleted> {
        validate::require_param(device_id, "deviceId")?;
        validate::require_param(code, "code")?;
        let code = validate::normalize_pairing_code(code)?;

        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        let (session, mut wait_rx, progress) = {
            let pairing = self.inner.pairing.read().await;
            let entry = pairing
                .get(device_id)
                .ok_or_else(|| pairing_not_found(device_id))?;
            (
                Arc::clone(&entry.session),
                entry.session.subscribe(),
                entry.progress.clone(),
            )
        };

        tracing::info!(device_id = %device_id, "Submitting pairing code");
        session.send_code(&code).await?;
        // A retry after a timed-out attempt may find the handshake already
        // finished; only wait when the watcher has not seen ready yet.
        if !progress.lock().expect("progress lock").is_ready() {
            self.await_ready(
                &mut wait_rx,
                "pairing handshake",
                self.inner.config.pairing_timeout,
                false,
            )
            .await?;
        }

        let certificate = session
            .certificate()
            .await
            .ok_or(ProviderError::CertificateUnavailable)?;

        // Handshake done: consume the pairing record and keep the same
        // session as the device's connected link.
        let entry = {
            let mut pairing = self.inner.pairing.write().await;
            pairing
                .remove(device_id)
                .ok_or_else(|| pairing_not_found(device_id))?
        };
        entry.watcher.abort();

        let progress = Arc::new(StdMutex::new(ConnectionProgress::connected()));
        let watcher = spawn_event_watcher(
            device_id.to_string(),
            entry.session.subscribe(),
            progress.clone(),
        );
        let replaced = {
            let mut connected = self.inner.connected.write().await;
            connected.insert(
                device_id.to_string(),
                ConnectedEntry {
                    host: entry.host,
                    certificate: certificate.clone(),
                    progress,
                    last_activity: Utc::now(),
                    session: entry.session,
                    watcher,
                },
            )
        };
        if let Some(replaced) = replaced {
            tracing::warn!(device_id = %device_id, "Replacing existing connected session");
            replaced.teardown().await;
        }

        tracing::info!(device_id = %device_id, "Pairing completed");
        Ok(PairingCompleted {
            certificate: certificate.to_json_string(),
        })
    }

    /// Establish a remote-control link using stored certificate material.
    /// Idempotent: a live link short-circuits without a second session.
    pub async fn connect(
        &self,
        device_id: &str,
        host: &str,
        certificate: Option<&str>,
    ) -> Result<ConnectOutcome> {
        validate::require_param(device_id, "deviceId")?;
        validate::require_param(host, "host")?;

        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        {
            let connected = self.inner.connected.read().await;
            if let Some(entry) = connected.get(device_id)
                && entry.progress.lock().expect("progress lock").is_connected()
            {
                tracing::info!(device_id = %device_id, "Already connected, reusing session");
                return Ok(ConnectOutcome::AlreadyConnected);
            }
        }

        // Malformed certificate material is tolerated: the session starts
        // unpaired and the TV reports it as such.
        let certificate = match certificate {
            None => Certificate::empty(),
            Some(raw) => Certificate::from_json(raw).unwrap_or_else(|| {
                tracing::warn!(device_id = %device_id, "Invalid certificate format, needs pairing");
                Certificate::empty()
            }),
        };

        tracing::info!(
            device_id = %device_id,
            host = %host,
            has_certificate = !certificate.is_empty(),
            "Connecting"
        );
        let session = self
            .inner
            .provider
            .open(SessionOptions {
                host: host.to_string(),
                pairing_port: self.inner.config.pairing_port,
                remote_port: self.inner.config.remote_port,
                client_name: self.inner.config.client_name.clone(),
                certificate: certificate.clone(),
            })
            .await?;

        let mut wait_rx = session.subscribe();
        let progress = Arc::new(StdMutex::new(ConnectionProgress::connecting()));
        let watcher =
            spawn_event_watcher(device_id.to_string(), session.subscribe(), progress.clone());

        let started = session.start().await.map_err(BridgeError::from);
        let ready = match started {
            Ok(()) => {
                self.await_ready(
                    &mut wait_rx,
                    "session ready",
                    self.inner.config.connect_timeout,
                    true,
                )
                .await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = ready {
            // Only a session that came up gets a record; a dead one must
            // not make status report connected.
            watcher.abort();
            session.stop().await;
            return Err(err);
        }

        let replaced = {
            let mut connected = self.inner.connected.write().await;
            connected.insert(
                device_id.to_string(),
                ConnectedEntry {
                    host: host.to_string(),
                    certificate,
                    progress,
                    last_activity: Utc::now(),
                    session,
                    watcher,
                },
            )
        };
        if let Some(replaced) = replaced {
            tracing::info!(device_id = %device_id, "Replacing lost session");
            replaced.teardown().await;
        }

        tracing::info!(device_id = %device_id, "Connected");
        Ok(ConnectOutcome::Connected)
    }

    /// Remove the device's connected record and stop its session.
    /// Returns whether a record existed.
    pub async fn disconnect(&self, device_id: &str) -> Result<bool> {
        validate::require_param(device_id, "deviceId")?;

        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        let removed = {
            let mut connected = self.inner.connected.write().await;
            connected.remove(device_id)
        };
        match removed {
            Some(entry) => {
                entry.teardown().await;
                tracing::info!(device_id = %device_id, "Disconnected");
                Ok(true)
            }
            None => {
                tracing::debug!(device_id = %device_id, "Not connected, nothing to do");
                Ok(false)
            }
        }
    }

    /// Drop both the pairing and connected records for a device. The TV
    /// keeps its side of the pairing; only clearing the remote service
    /// data on the TV fully resets it.
    pub async fn unpair(&self, device_id: &str) -> Result<()> {
        validate::require_param(device_id, "deviceId")?;

        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        let connected = {
            let mut map = self.inner.connected.write().await;
            map.remove(device_id)
        };
        if let Some(entry) = connected {
            entry.teardown().await;
        }
        let pairing = {
            let mut map = self.inner.pairing.write().await;
            map.remove(device_id)
        };
        if let Some(entry) = pairing {
            entry.teardown().await;
        }

        tracing::info!(device_id = %device_id, "Unpaired from bridge");
        Ok(())
    }

    /// Forward a short key press to the device's session.
    pub async fn send_key(
        &self,
        device_id: &str,
        key_code: i32,
        key_name: Option<&str>,
    ) -> Result<()> {
        validate::require_param(device_id, "deviceId")?;

        let session = self.touch_connected(device_id).await?;
        tracing::info!(
            device_id = %device_id,
            key_code,
            key_name = key_name.unwrap_or("unknown"),
            "Sending key"
        );
        session
            .send_key(key_code, KeyPress::Short)
            .await
            .map_err(BridgeError::from)
    }

    /// Forward an app-link activation request.
    pub async fn launch_app(&self, device_id: &str, app_url: &str) -> Result<()> {
        validate::require_param(device_id, "deviceId")?;
        validate::require_param(app_url, "appUrl")?;

        let session = self.touch_connected(device_id).await?;
        tracing::info!(device_id = %device_id, app_url = %app_url, "Launching app");
        session.send_app_link(app_url).await.map_err(BridgeError::from)
    }

    /// Text injection stub. Precondition-checked like any other command,
    /// then reports the capability limitation.
    pub async fn send_text(&self, device_id: &str, text: &str) -> Result<&'static str> {
        validate::require_param(device_id, "deviceId")?;
        validate::require_param(text, "text")?;

        self.require_connected(device_id).await?;
        tracing::info!(device_id = %device_id, "Text input requested but unsupported");
        Ok(TEXT_INPUT_MESSAGE)
    }

    /// Pure read; an unknown device reports disconnected.
    pub async fn status(&self, device_id: &str) -> DeviceStatus {
        let connected = self.inner.connected.read().await;
        match connected.get(device_id) {
            Some(entry) => DeviceStatus {
                connected: entry.progress.lock().expect("progress lock").is_connected(),
                last_activity: Some(entry.last_activity),
            },
            None => DeviceStatus {
                connected: false,
                last_activity: None,
            },
        }
    }

    /// Enumerate every record in both namespaces, sorted by device id.
    pub async fn list_devices(&self) -> Vec<DeviceSummary> {
        let mut list = Vec::new();
        {
            let pairing = self.inner.pairing.read().await;
            for (device_id, entry) in pairing.iter() {
                list.push(DeviceSummary {
                    device_id: device_id.clone(),
                    kind: DeviceKind::Pairing,
                    host: entry.host.clone(),
                    connected: false,
                    last_activity: None,
                });
            }
        }
        {
            let connected = self.inner.connected.read().await;
            for (device_id, entry) in connected.iter() {
                list.push(DeviceSummary {
                    device_id: device_id.clone(),
                    kind: DeviceKind::Connected,
                    host: entry.host.clone(),
                    connected: entry.progress.lock().expect("progress lock").is_connected(),
                    last_activity: Some(entry.last_activity),
                });
            }
        }
        list.sort_by(|a, b| a.device_id.cmp(&b.device_id).then(a.kind.cmp(&b.kind)));
        list
    }

    /// Registry counters for the health endpoint.
    pub async fn health(&self) -> HealthSnapshot {
        let pairing_in_progress = self.inner.pairing.read().await.len();
        let connected_devices = self.inner.connected.read().await.len();
        HealthSnapshot {
            connected_devices,
            pairing_in_progress,
            total_devices: connected_devices + pairing_in_progress,
            uptime_secs: self.inner.started_at.elapsed().as_secs(),
        }
    }

    /// Stop every session and drain both namespaces.
    pub async fn shutdown(&self) {
        let pairing: Vec<PairingEntry> = {
            let mut map = self.inner.pairing.write().await;
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in pairing {
            entry.teardown().await;
        }
        let connected: Vec<ConnectedEntry> = {
            let mut map = self.inner.connected.write().await;
            map.drain().map(|(_, entry)| entry).collect()
        };
        for entry in connected {
            entry.teardown().await;
        }
        tracing::info!("Device registry shut down");
    }

    async fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn remove_pairing(&self, device_id: &str) {
        let removed = {
            let mut pairing = self.inner.pairing.write().await;
            pairing.remove(device_id)
        };
        if let Some(entry) = removed {
            entry.teardown().await;
        }
    }

    /// Look up a live connected session and update its activity timestamp.
    async fn touch_connected(&self, device_id: &str) -> Result<Arc<dyn RemoteSession>> {
        let mut connected = self.inner.connected.write().await;
        let entry = connected
            .get_mut(device_id)
            .ok_or_else(|| device_not_connected(device_id))?;
        entry.last_activity = Utc::now();
        Ok(Arc::clone(&entry.session))
    }

    async fn require_connected(&self, device_id: &str) -> Result<()> {
        if self.inner.connected.read().await.contains_key(device_id) {
            Ok(())
        } else {
            Err(device_not_connected(device_id))
        }
    }

    /// Bounded wait for the code-displayed signal. An elapsed window is
    /// not a failure; a session error is.
    async fn await_code_displayed(
        &self,
        rx: &mut broadcast::Receiver<SessionEvent>,
    ) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + self.inner.config.code_wait;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return Ok(false),
                Ok(Ok(SessionEvent::Secret)) => return Ok(true),
                Ok(Ok(SessionEvent::Error(message))) => {
                    return Err(ProviderError::Session(message).into());
                }
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(ProviderError::Closed.into());
                }
            }
        }
    }

    /// Bounded wait for the ready signal; an elapsed bound is a distinct
    /// timeout failure, not a best-effort guess.
    async fn await_ready(
        &self,
        rx: &mut broadcast::Receiver<SessionEvent>,
        what: &str,
        timeout: Duration,
        fail_on_unpaired: bool,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => {
                    return Err(BridgeError::Timeout {
                        what: what.to_string(),
                        timeout,
                    });
                }
                Ok(Ok(SessionEvent::Ready)) => return Ok(()),
                Ok(Ok(SessionEvent::Error(message))) => {
                    return Err(ProviderError::Session(message).into());
                }
                Ok(Ok(SessionEvent::Unpaired)) if fail_on_unpaired => {
                    return Err(ProviderError::Unpaired.into());
                }
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(ProviderError::Closed.into());
                }
            }
        }
    }
}

fn pairing_not_found(device_id: &str) -> BridgeError {
    BridgeError::not_found(device_id, "No pairing in progress. Run /pair/start first")
}

fn device_not_connected(device_id: &str) -> BridgeError {
    BridgeError::not_found(device_id, "Run /connect first")
}

/// Apply session events to shared per-device state until the event
/// stream closes.
fn spawn_event_watcher<S>(
    device_id: String,
    mut rx: broadcast::Receiver<SessionEvent>,
    state: Arc<StdMutex<S>>,
) -> JoinHandle<()>
where
    S: ApplyEvent + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => state.lock().expect("state lock").apply(&device_id, &event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(device_id = %device_id, skipped, "Event watcher lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
