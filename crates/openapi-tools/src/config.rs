use crate::error::{OpenApiToolsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_TENANT: &str = "default";

// ============================================================================
// MCP server configuration (converter output)
// ============================================================================

/// A normalized MCP server configuration derived from one `OpenAPI` document.
///
/// Produced once by [`crate::convert::Converter`] and passed downstream untouched: stores persist
/// it, notifiers reference it by name and hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerConfig {
    /// Deterministic identity (same document bytes => same name).
    pub name: String,

    /// Addressing namespace: tenant.
    pub tenant: String,

    /// Addressing namespace: router path prefix (may be empty when set explicitly).
    pub prefix: String,

    /// First `servers[].url` from the document, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Tool definitions, in document order.
    #[serde(default)]
    pub tools: Vec<ToolConfig>,

    /// Metadata carried over from the source document (`title`, `version`, `specHash`, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl McpServerConfig {
    /// Stable content hash (`sha256:<hex>`) of the serialized configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn content_hash(&self) -> Result<String> {
        use sha2::{Digest as _, Sha256};
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("sha256:{}", hex::encode(Sha256::digest(&bytes))))
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolConfig> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// One MCP tool, derived from one `OpenAPI` operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Upper-case HTTP method.
    pub method: String,
    /// Path template as written in the document (e.g. `/pets/{petId}`).
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgConfig>,
    /// JSON Schema object for the tool input.
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgConfig {
    pub name: String,
    pub position: ArgPosition,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Value,
}

/// Where an argument is placed in the outbound HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgPosition {
    Path,
    Query,
    Header,
    Body,
}

impl ArgPosition {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArgPosition::Path => "path",
            ArgPosition::Query => "query",
            ArgPosition::Header => "header",
            ArgPosition::Body => "body",
        }
    }
}

// ============================================================================
// Converter configuration
// ============================================================================

/// Converter settings (the part of conversion that is not decided by the document itself).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverterConfig {
    /// Tenant used when the caller does not supply an addressing hint.
    #[serde(default = "default_tenant")]
    pub default_tenant: String,

    /// Which operations become tools.
    #[serde(default)]
    pub auto_discover: AutoDiscoverConfig,
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            default_tenant: default_tenant(),
            auto_discover: AutoDiscoverConfig::default(),
        }
    }
}

impl ConverterConfig {
    /// Load converter settings from a YAML or JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the settings are invalid.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        // JSON is a valid subset of YAML, so serde_yaml alone is enough.
        let cfg: ConverterConfig = serde_yaml::from_str(&content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    ///
    /// Returns an error if the default tenant is blank or a discovery pattern is empty.
    pub fn validate(&self) -> Result<()> {
        if self.default_tenant.trim().is_empty() {
            return Err(OpenApiToolsError::Config(
                "defaultTenant must be non-empty".to_string(),
            ));
        }
        let patterns = self
            .auto_discover
            .include_patterns()
            .iter()
            .chain(self.auto_discover.exclude_patterns());
        for p in patterns {
            if p.trim().is_empty() {
                return Err(OpenApiToolsError::Config(
                    "autoDiscover patterns must be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Auto-discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AutoDiscoverConfig {
    /// Simple boolean: true = discover all, false = nothing.
    Enabled(bool),
    /// Include/exclude glob patterns over `"METHOD /path"`.
    Detailed {
        #[serde(default)]
        include: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
    },
}

impl Default for AutoDiscoverConfig {
    fn default() -> Self {
        AutoDiscoverConfig::Enabled(true)
    }
}

impl AutoDiscoverConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            AutoDiscoverConfig::Enabled(b) => *b,
            AutoDiscoverConfig::Detailed { .. } => true,
        }
    }

    #[must_use]
    pub fn include_patterns(&self) -> &[String] {
        match self {
            AutoDiscoverConfig::Enabled(_) => &[],
            AutoDiscoverConfig::Detailed { include, .. } => include,
        }
    }

    #[must_use]
    pub fn exclude_patterns(&self) -> &[String] {
        match self {
            AutoDiscoverConfig::Enabled(_) => &[],
            AutoDiscoverConfig::Detailed { exclude, .. } => exclude,
        }
    }
}
