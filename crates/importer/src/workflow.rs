//! The import workflow: convert → persist → notify.
//!
//! Steps run strictly in order and stop at the first failure. Nothing is retried and nothing is
//! rolled back: a failed notification leaves the stored configuration in place and reports it
//! in [`ImportOutcome::NotificationFailed`].

use crate::converter::SpecConverter;
use crate::hint::AddressingHint;
use crate::notifier::{NotifyError, UpdateNotifier};
use crate::outcome::ImportOutcome;
use crate::store::{ConfigStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use unrelated_openapi_tools::McpServerConfig;

#[derive(Clone)]
pub struct ImportWorkflow {
    converter: Arc<dyn SpecConverter>,
    store: Arc<dyn ConfigStore>,
    notifier: Arc<dyn UpdateNotifier>,
}

/// Why re-sending a notification for a stored configuration failed.
#[derive(Error, Debug)]
pub enum RenotifyError {
    #[error("MCP server '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

impl ImportWorkflow {
    #[must_use]
    pub fn new(
        converter: Arc<dyn SpecConverter>,
        store: Arc<dyn ConfigStore>,
        notifier: Arc<dyn UpdateNotifier>,
    ) -> Self {
        Self {
            converter,
            store,
            notifier,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Run one import.
    ///
    /// `ctx` is passed unchanged to the store and the notifier; cancelling it aborts whichever
    /// of those steps is in flight (and reports that step's failure).
    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        spec: &[u8],
        hint: &AddressingHint,
    ) -> ImportOutcome {
        tracing::info!(
            spec_bytes = spec.len(),
            default_addressing = hint.is_default(),
            "handling OpenAPI import"
        );

        let config = match self.convert(spec, hint) {
            Ok(cfg) => cfg,
            Err(reason) => {
                tracing::error!(reason = %reason, "failed to convert OpenAPI specification");
                return ImportOutcome::Rejected { reason };
            }
        };
        tracing::info!(server_name = %config.name, tools = config.tools.len(), "OpenAPI specification converted");

        tracing::debug!(server_name = %config.name, "creating MCP server configuration");
        if let Err(e) = self.store.create(ctx, &config).await {
            tracing::error!(server_name = %config.name, error = %e, "failed to create MCP server");
            return ImportOutcome::PersistenceFailed {
                conflict: e.is_conflict(),
                reason: format!("Failed to create MCP server: {e}"),
            };
        }

        tracing::debug!(server_name = %config.name, "notifying gateways about the update");
        if let Err(e) = self.notifier.notify_update(ctx, &config).await {
            tracing::error!(server_name = %config.name, error = %e, "failed to notify gateways; configuration stays persisted");
            return ImportOutcome::NotificationFailed {
                reason: format!("Failed to notify gateway: {e}"),
                config,
            };
        }

        tracing::info!(server_name = %config.name, "OpenAPI imported successfully");
        ImportOutcome::Imported(config)
    }

    fn convert(&self, spec: &[u8], hint: &AddressingHint) -> Result<McpServerConfig, String> {
        let res = match hint {
            AddressingHint::Default => self.converter.convert(spec),
            AddressingHint::Explicit { tenant, prefix } => {
                self.converter.convert_with_options(spec, tenant, prefix)
            }
        };
        res.map_err(|e| format!("Failed to convert OpenAPI specification: {e}"))
    }

    /// Re-issue the update notification for an already stored configuration.
    ///
    /// This is the recovery path for [`ImportOutcome::NotificationFailed`]: it never touches the
    /// store's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not exist or either collaborator fails.
    pub async fn renotify(
        &self,
        ctx: &CancellationToken,
        name: &str,
    ) -> Result<McpServerConfig, RenotifyError> {
        let config = self
            .store
            .get(name)
            .await?
            .ok_or_else(|| RenotifyError::NotFound(name.to_string()))?;
        self.notifier.notify_update(ctx, &config).await?;
        tracing::info!(server_name = %config.name, "re-sent config update notification");
        Ok(config)
    }
}
