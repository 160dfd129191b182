//! Error types for `unrelated-openapi-tools`.

use thiserror::Error;

/// Main error type for `OpenAPI` conversion.
///
/// Every variant describes why a document was rejected; the converter never hands back a
/// partially-built configuration alongside one of these.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Converter configuration errors (invalid patterns, bad config file).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded document had no content.
    #[error("OpenAPI error: document is empty")]
    EmptyDocument,

    #[error("OpenAPI error: failed to parse OpenAPI document: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
    },

    #[error("OpenAPI error: unsupported OpenAPI version '{0}' (expected 3.x)")]
    UnsupportedVersion(String),

    /// Structural validation failures (missing title, no paths, no operations).
    #[error("OpenAPI error: validation failed: {0}")]
    Validation(String),

    /// Constructs the converter does not support (cookie params, external refs, ...).
    #[error("OpenAPI error: unsupported construct in {location}: {message}")]
    Unsupported { location: String, message: String },

    /// `$ref` resolution errors (missing target, cycles).
    #[error("OpenAPI error: {0}")]
    Reference(String),

    /// Parameter collision errors.
    #[error("Parameter collision: {0}")]
    ParamCollision(String),

    /// JSON errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors (converter config files).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors (converter config files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
