//! Tunnel registry: routes offers to tunnels and reaps failed ones.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::RelayConfig;
use super::engine::SessionFactory;
use super::signal::{SessionDescription, SessionSignal, SignalKind};
use super::tunnel::Tunnel;
use crate::core::{RelayError, RelayResult};

type TunnelMap = Arc<RwLock<HashMap<String, Arc<Tunnel>>>>;

/// Owns every live tunnel, keyed by id.
///
/// A background task removes tunnels that tore themselves down after an
/// error.
///
/// # Example
///
/// ```ignore
/// let registry = TunnelRegistry::new(factory, RelayConfig::default());
///
/// let answer = registry.handle(&SessionSignal::caller_offer("call-1", offer)).await?;
/// // ... later, from the other side
/// let answer = registry.handle(&SessionSignal::callee_offer("call-1", offer)).await?;
/// ```
pub struct TunnelRegistry {
    factory: Arc<dyn SessionFactory>,
    config: RelayConfig,
    tunnels: TunnelMap,
    closed_tx: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for TunnelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelRegistry")
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl TunnelRegistry {
    /// Create a registry and start its cleanup task.
    pub fn new(factory: Arc<dyn SessionFactory>, config: RelayConfig) -> Self {
        let config = config.sanitized();
        let (closed_tx, closed_rx) = mpsc::channel(config.registry_capacity);
        let tunnels = TunnelMap::default();
        let shutdown = CancellationToken::new();

        tokio::spawn(Self::cleanup(Arc::clone(&tunnels), closed_rx, shutdown.clone()));

        Self {
            factory,
            config,
            tunnels,
            closed_tx,
            shutdown,
        }
    }

    async fn cleanup(tunnels: TunnelMap, mut closed_rx: mpsc::Receiver<String>, shutdown: CancellationToken) {
        loop {
            let id = tokio::select! {
                _ = shutdown.cancelled() => return,
                id = closed_rx.recv() => id,
            };
            let Some(id) = id else {
                return;
            };

            let mut tunnels = tunnels.write().await;
            // the id may already belong to a newer tunnel
            if tunnels.get(&id).is_some_and(|tunnel| tunnel.is_closed()) {
                tunnels.remove(&id);
                info!(tunnel = %id, remaining = tunnels.len(), "tunnel removed after teardown");
            }
        }
    }

    /// Route an offer: a caller offer opens a tunnel, a callee offer joins one.
    pub async fn handle(&self, signal: &SessionSignal) -> RelayResult<SessionDescription> {
        if self.shutdown.is_cancelled() {
            return Err(RelayError::TunnelClosed);
        }
        debug!(tunnel = %signal.sid, kind = %signal.kind, "signal received");

        match signal.kind {
            SignalKind::CallerOffer => self.open(signal).await,
            SignalKind::CalleeOffer => self.join(signal).await,
        }
    }

    async fn open(&self, signal: &SessionSignal) -> RelayResult<SessionDescription> {
        if self.tunnels.read().await.contains_key(&signal.sid) {
            return Err(RelayError::TunnelExists(signal.sid.clone()));
        }

        let (tunnel, answer) = Tunnel::new(
            Arc::clone(&self.factory),
            signal,
            self.config.clone(),
            self.closed_tx.clone(),
        )
        .await?;

        let mut tunnels = self.tunnels.write().await;
        if tunnels.contains_key(&signal.sid) {
            drop(tunnels);
            tunnel.close().await;
            return Err(RelayError::TunnelExists(signal.sid.clone()));
        }
        tunnels.insert(signal.sid.clone(), tunnel);
        info!(tunnel = %signal.sid, total = tunnels.len(), "tunnel registered");
        Ok(answer)
    }

    async fn join(&self, signal: &SessionSignal) -> RelayResult<SessionDescription> {
        let tunnel = self
            .get(&signal.sid)
            .await
            .ok_or_else(|| RelayError::UnknownTunnel(signal.sid.clone()))?;
        tunnel.update(signal).await
    }

    /// Close and forget tunnel `sid`.
    pub async fn hangup(&self, sid: &str) -> RelayResult<()> {
        let tunnel = self
            .tunnels
            .write()
            .await
            .remove(sid)
            .ok_or_else(|| RelayError::UnknownTunnel(sid.to_string()))?;
        tunnel.close().await;
        info!(tunnel = %sid, "tunnel hung up");
        Ok(())
    }

    /// Look up a tunnel.
    pub async fn get(&self, sid: &str) -> Option<Arc<Tunnel>> {
        self.tunnels.read().await.get(sid).cloned()
    }

    /// Number of registered tunnels.
    pub async fn len(&self) -> usize {
        self.tunnels.read().await.len()
    }

    /// Check whether no tunnel is registered.
    pub async fn is_empty(&self) -> bool {
        self.tunnels.read().await.is_empty()
    }

    /// Close every tunnel and stop the cleanup task.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<_> = self.tunnels.write().await.drain().map(|(_, t)| t).collect();
        info!(count = drained.len(), "registry shutting down");
        for tunnel in drained {
            tunnel.close().await;
        }
    }
}
