//! HTTP server lifecycle.
//!
//! Binds the listener, serves the bridge routes, and shuts down
//! gracefully on signal. Handlers live in [`routes`].

pub mod routes;

use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::BridgeError;
use crate::registry::DeviceRegistry;

/// HTTP server wrapping the bridge router.
pub struct BridgeServer {
    addr: SocketAddr,
    registry: DeviceRegistry,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BridgeServer {
    /// Create a server that will bind to `addr` and serve operations on
    /// `registry`.
    pub fn new(addr: SocketAddr, registry: DeviceRegistry) -> Self {
        Self {
            addr,
            registry,
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        let app = routes::router(self.registry.clone());

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| BridgeError::Server(format!("Failed to bind to {}: {}", self.addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| BridgeError::Server(format!("Failed to read local address: {e}")))?;
        self.local_addr = Some(local_addr);

        tracing::info!("Bridge server listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("Bridge server shutting down");
                })
                .await
            {
                tracing::error!("Bridge server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Address the listener actually bound to (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::BridgeConfig;
    use crate::provider::simulator::SimulatorProvider;

    fn test_registry() -> DeviceRegistry {
        DeviceRegistry::new(BridgeConfig::default(), Arc::new(SimulatorProvider::new()))
    }

    fn auto_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn start_and_shutdown_lifecycle() {
        let mut server = BridgeServer::new(auto_addr(), test_registry());
        server.start().await.expect("server should start on port 0");
        assert!(server.local_addr().is_some());
        assert!(server.handle.is_some());
        assert!(server.shutdown_tx.is_some());
        server.shutdown().await;
        assert!(server.handle.is_none());
        assert!(server.shutdown_tx.is_none());
    }

    #[tokio::test]
    async fn start_on_occupied_port_returns_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let occupied = listener.local_addr().unwrap();

        let mut server = BridgeServer::new(occupied, test_registry());
        let result = server.start().await;
        match result.unwrap_err() {
            BridgeError::Server(reason) => assert!(reason.contains("Failed to bind")),
            other => panic!("expected Server error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn shutdown_when_not_started_is_noop() {
        let mut server = BridgeServer::new(auto_addr(), test_registry());
        server.shutdown().await;
    }
}
