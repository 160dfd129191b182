use unrelated_openapi_tools::{Converter, McpServerConfig, OpenApiToolsError};

/// The conversion step of an import, as the workflow sees it.
///
/// Implementations must be pure: same input, same output, no side effects. A failure must
/// describe what was wrong with the input.
pub trait SpecConverter: Send + Sync {
    /// Convert using the converter's own addressing convention.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be converted.
    fn convert(&self, spec: &[u8]) -> Result<McpServerConfig, OpenApiToolsError>;

    /// Convert using exactly the given tenant and prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be converted.
    fn convert_with_options(
        &self,
        spec: &[u8],
        tenant: &str,
        prefix: &str,
    ) -> Result<McpServerConfig, OpenApiToolsError>;
}

impl SpecConverter for Converter {
    fn convert(&self, spec: &[u8]) -> Result<McpServerConfig, OpenApiToolsError> {
        Converter::convert(self, spec)
    }

    fn convert_with_options(
        &self,
        spec: &[u8],
        tenant: &str,
        prefix: &str,
    ) -> Result<McpServerConfig, OpenApiToolsError> {
        Converter::convert_with_options(self, spec, tenant, prefix)
    }
}
