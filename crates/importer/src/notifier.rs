//! "Configuration changed" fan-out to live gateway instances.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_tools::McpServerConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    /// The transport could not deliver the event.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode update event: {0}")]
    Encode(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// One "configuration changed" event.
///
/// References the configuration by name and content hash; subscribers reload it from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub name: String,
    pub tenant: String,
    pub prefix: String,
    pub config_hash: String,
    pub event_id: u64,
}

impl ConfigUpdate {
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be hashed.
    pub fn from_config(config: &McpServerConfig, event_id: u64) -> Result<Self, NotifyError> {
        let config_hash = config
            .content_hash()
            .map_err(|e| NotifyError::Encode(e.to_string()))?;
        Ok(Self {
            name: config.name.clone(),
            tenant: config.tenant.clone(),
            prefix: config.prefix.clone(),
            config_hash,
            event_id,
        })
    }
}

/// Announces that a configuration was created.
///
/// Delivery is at-least-once to however many subscribers exist. An `Err` means the step as a
/// whole failed; partial delivery is not reported.
#[async_trait]
pub trait UpdateNotifier: Send + Sync {
    async fn notify_update(
        &self,
        ctx: &CancellationToken,
        config: &McpServerConfig,
    ) -> Result<(), NotifyError>;
}

/// In-process fan-out over a bounded `tokio` broadcast channel.
///
/// Best-effort per receiver: lagging receivers lose old events and should reload everything.
/// Having no receivers at all is not an error.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ConfigUpdate>,
    next_event_id: Arc<AtomicU64>,
}

impl BroadcastNotifier {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<ConfigUpdate>(capacity.max(1));
        Self {
            tx,
            next_event_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigUpdate> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn next_local_event_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Deliver an already-built event (e.g. one relayed from another node).
    ///
    /// Returns how many receivers got it.
    pub fn publish(&self, event: ConfigUpdate) -> usize {
        self.tx.send(event).unwrap_or_else(|_| {
            tracing::debug!("no config update subscribers; dropping event");
            0
        })
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl UpdateNotifier for BroadcastNotifier {
    async fn notify_update(
        &self,
        ctx: &CancellationToken,
        config: &McpServerConfig,
    ) -> Result<(), NotifyError> {
        if ctx.is_cancelled() {
            return Err(NotifyError::Cancelled);
        }
        let event = ConfigUpdate::from_config(config, self.next_local_event_id())?;
        let delivered = self.publish(event);
        tracing::debug!(server_name = %config.name, receivers = delivered, "config update broadcast");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cfg(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.to_string(),
            tenant: "acme".to_string(),
            prefix: "/v1".to_string(),
            base_url: None,
            tools: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_update_events() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx1 = notifier.subscribe();
        let mut rx2 = notifier.subscribe();
        let ctx = CancellationToken::new();

        notifier.notify_update(&ctx, &cfg("a")).await.unwrap();
        notifier.notify_update(&ctx, &cfg("b")).await.unwrap();

        let first = rx1.recv().await.unwrap();
        assert_eq!(first.name, "a");
        assert_eq!(first.tenant, "acme");
        assert_eq!(first.prefix, "/v1");
        assert_eq!(first.config_hash, cfg("a").content_hash().unwrap());

        let second = rx1.recv().await.unwrap();
        assert!(second.event_id > first.event_id);

        assert_eq!(rx2.recv().await.unwrap(), first);
    }

    #[tokio::test]
    async fn no_subscribers_is_not_an_error() {
        let notifier = BroadcastNotifier::default();
        notifier
            .notify_update(&CancellationToken::new(), &cfg("a"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_context_sends_nothing() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = notifier.notify_update(&ctx, &cfg("a")).await.unwrap_err();
        assert!(matches!(err, NotifyError::Cancelled));
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
