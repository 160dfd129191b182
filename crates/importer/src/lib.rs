//! OpenAPI import service.
//!
//! Accepts an `OpenAPI` document plus an optional addressing hint, converts it into an MCP server
//! configuration, stores it, and tells live gateways to reload. The [`workflow::ImportWorkflow`]
//! owns the ordering and failure rules; storage and fan-out are pluggable behind
//! [`store::ConfigStore`] and [`notifier::UpdateNotifier`].

pub mod config;
pub mod converter;
pub mod hint;
pub mod http;
pub mod notifier;
pub mod outcome;
pub mod pg_fanout;
pub mod pg_store;
pub mod store;
pub mod telemetry;
pub mod workflow;

pub use hint::AddressingHint;
pub use outcome::{ImportOutcome, ImportOutcomeKind};
pub use workflow::ImportWorkflow;
