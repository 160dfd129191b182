use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use unrelated_openapi_tools::ConverterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Import OpenAPI documents as MCP server configurations.
#[derive(Debug, Clone, Parser)]
#[command(name = "unrelated-openapi-import", version)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, env = "UNRELATED_IMPORT_BIND", default_value = "127.0.0.1:5235")]
    pub bind: SocketAddr,

    /// Postgres URL. When unset, configurations are kept in memory and updates only fan out
    /// to this process's subscribers.
    #[arg(long, env = "UNRELATED_IMPORT_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "UNRELATED_IMPORT_DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// Node id used to skip our own fan-out events (random when unset).
    #[arg(long, env = "UNRELATED_IMPORT_NODE_ID")]
    pub node_id: Option<String>,

    /// Converter settings file (YAML or JSON).
    #[arg(long, env = "UNRELATED_IMPORT_CONVERTER_CONFIG")]
    pub converter_config: Option<PathBuf>,

    /// Tenant used for imports without an addressing hint (overrides the converter file).
    #[arg(long, env = "UNRELATED_IMPORT_DEFAULT_TENANT")]
    pub default_tenant: Option<String>,

    /// Maximum accepted request body size.
    #[arg(long, env = "UNRELATED_IMPORT_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Buffer size of the local update broadcast.
    #[arg(long, env = "UNRELATED_IMPORT_BROADCAST_CAPACITY", default_value_t = 256)]
    pub broadcast_capacity: usize,

    /// Log filter (`RUST_LOG` wins when set).
    #[arg(long, env = "UNRELATED_IMPORT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "UNRELATED_IMPORT_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Resolve converter settings from the optional file plus CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the resulting settings are invalid.
    pub fn converter_config(&self) -> anyhow::Result<ConverterConfig> {
        let mut cfg = match &self.converter_config {
            Some(path) => ConverterConfig::load(path)
                .with_context(|| format!("load converter config {}", path.display()))?,
            None => ConverterConfig::default(),
        };
        if let Some(tenant) = &self.default_tenant {
            cfg.default_tenant.clone_from(tenant);
        }
        cfg.validate().context("invalid converter config")?;
        Ok(cfg)
    }

    #[must_use]
    pub fn resolved_node_id(&self) -> String {
        self.node_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn defaults_parse() {
        let args = Args::try_parse_from(["unrelated-openapi-import"]).unwrap();
        assert_eq!(args.bind.port(), 5235);
        assert!(args.database_url.is_none());
        assert_eq!(args.log_format, LogFormat::Text);
        assert_eq!(args.converter_config().unwrap().default_tenant, "default");
    }

    #[test]
    fn cli_default_tenant_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "defaultTenant: from-file").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = Args::try_parse_from(["x", "--converter-config", path.as_str()]).unwrap();
        assert_eq!(args.converter_config().unwrap().default_tenant, "from-file");

        let args = Args::try_parse_from([
            "x",
            "--converter-config",
            path.as_str(),
            "--default-tenant",
            "cli",
        ])
        .unwrap();
        assert_eq!(args.converter_config().unwrap().default_tenant, "cli");
    }

    #[test]
    fn blank_default_tenant_is_rejected() {
        let args = Args::try_parse_from(["x", "--default-tenant", ""]).unwrap();
        assert!(args.converter_config().is_err());
    }

    #[test]
    fn json_log_format_parses() {
        let args = Args::try_parse_from(["x", "--log-format", "json"]).unwrap();
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
