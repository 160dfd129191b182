use serde::{Deserialize, Serialize};
use unrelated_openapi_tools::McpServerConfig;

/// Terminal state of one import.
///
/// `NotificationFailed` still carries the configuration: it was persisted, only propagation
/// failed, so an operator (or a retry path) can re-notify without re-creating it.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Imported(McpServerConfig),
    Rejected { reason: String },
    PersistenceFailed { reason: String, conflict: bool },
    NotificationFailed { reason: String, config: McpServerConfig },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportOutcomeKind {
    Imported,
    Rejected,
    PersistenceFailed,
    NotificationFailed,
}

impl ImportOutcome {
    #[must_use]
    pub fn kind(&self) -> ImportOutcomeKind {
        match self {
            ImportOutcome::Imported(_) => ImportOutcomeKind::Imported,
            ImportOutcome::Rejected { .. } => ImportOutcomeKind::Rejected,
            ImportOutcome::PersistenceFailed { .. } => ImportOutcomeKind::PersistenceFailed,
            ImportOutcome::NotificationFailed { .. } => ImportOutcomeKind::NotificationFailed,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Imported(_))
    }

    /// The configuration that exists in the store after this import, if any.
    #[must_use]
    pub fn config(&self) -> Option<&McpServerConfig> {
        match self {
            ImportOutcome::Imported(cfg)
            | ImportOutcome::NotificationFailed { config: cfg, .. } => Some(cfg),
            ImportOutcome::Rejected { .. } | ImportOutcome::PersistenceFailed { .. } => None,
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            ImportOutcome::Imported(_) => None,
            ImportOutcome::Rejected { reason }
            | ImportOutcome::PersistenceFailed { reason, .. }
            | ImportOutcome::NotificationFailed { reason, .. } => Some(reason),
        }
    }
}
