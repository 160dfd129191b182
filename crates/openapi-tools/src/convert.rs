//! `OpenAPI` → MCP server configuration converter.
//!
//! Conversion is deterministic and side-effect free: the same bytes and addressing always yield
//! the same [`McpServerConfig`]. Any operation that cannot be converted rejects the whole
//! document; partial configurations are never returned.

use crate::config::{ArgConfig, ArgPosition, ConverterConfig, McpServerConfig, ToolConfig};
use crate::error::{OpenApiToolsError, Result};
use crate::resolver::LocalResolver;
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, RequestBody, Schema,
};
use regex::Regex;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

static PATH_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("static regex"));
static NON_ALNUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex"));

const MAX_TOOL_NAME_LEN: usize = 64;
const MAX_SERVER_SLUG_LEN: usize = 48;
const NAME_HASH_LEN: usize = 8;

/// Addressing applied to a converted configuration.
#[derive(Debug, Clone, Copy)]
enum Addressing<'a> {
    /// Converter convention: configured default tenant, prefix derived from the name.
    Default,
    /// Caller-supplied values, used verbatim (empty strings included).
    Explicit { tenant: &'a str, prefix: &'a str },
}

/// Converts `OpenAPI` 3.x documents (JSON or YAML) into [`McpServerConfig`]s.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    config: ConverterConfig,
}

#[derive(Debug, Clone)]
struct ToolParameter {
    name: String,
    position: ArgPosition,
    required: bool,
    description: Option<String>,
    schema: Value,
}

struct ToolGenerationInput<'a> {
    path_item_params: &'a [ReferenceOr<Parameter>],
    path: &'a str,
    method: &'a str,
    operation: &'a Operation,
}

impl Converter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: ConverterConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert a document using the converter's default addressing convention.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is empty, unparsable, not `OpenAPI` 3.x, or contains an
    /// operation that cannot be converted.
    pub fn convert(&self, spec: &[u8]) -> Result<McpServerConfig> {
        self.convert_inner(spec, Addressing::Default)
    }

    /// Convert a document using exactly the given tenant and prefix.
    ///
    /// # Errors
    ///
    /// Same as [`Self::convert`].
    pub fn convert_with_options(
        &self,
        spec: &[u8],
        tenant: &str,
        prefix: &str,
    ) -> Result<McpServerConfig> {
        self.convert_inner(spec, Addressing::Explicit { tenant, prefix })
    }

    fn convert_inner(&self, bytes: &[u8], addressing: Addressing<'_>) -> Result<McpServerConfig> {
        let spec = parse_document(bytes)?;

        let title = spec.info.title.trim();
        if title.is_empty() {
            return Err(OpenApiToolsError::Validation(
                "info.title must be non-empty".to_string(),
            ));
        }
        if spec.paths.paths.is_empty() {
            return Err(OpenApiToolsError::Validation(
                "document defines no paths".to_string(),
            ));
        }

        let spec_hash = hex::encode(Sha256::digest(bytes));
        let name = server_name(title, &spec_hash);

        let tools = self.discover_tools(&spec)?;
        if tools.is_empty() {
            return Err(OpenApiToolsError::Validation(
                "no operations selected for conversion".to_string(),
            ));
        }

        let (tenant, prefix) = match addressing {
            Addressing::Default => (self.config.default_tenant.clone(), format!("/{name}")),
            Addressing::Explicit { tenant, prefix } => (tenant.to_string(), prefix.to_string()),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("title".to_string(), json!(spec.info.title));
        metadata.insert("version".to_string(), json!(spec.info.version));
        metadata.insert("openapi".to_string(), json!(spec.openapi));
        if let Some(desc) = &spec.info.description {
            metadata.insert("description".to_string(), json!(desc));
        }
        metadata.insert("specHash".to_string(), json!(format!("sha256:{spec_hash}")));

        tracing::debug!(
            server_name = %name,
            tool_count = tools.len(),
            "converted OpenAPI document"
        );

        Ok(McpServerConfig {
            name,
            tenant,
            prefix,
            base_url: spec.servers.first().map(|s| s.url.clone()),
            tools,
            metadata,
        })
    }

    fn discover_tools(&self, spec: &OpenAPI) -> Result<Vec<ToolConfig>> {
        let resolver = LocalResolver::new(spec)?;
        let mut tools = Vec::new();
        let mut tool_names: HashSet<String> = HashSet::new();

        for (path, path_item) in &spec.paths.paths {
            let path_item = resolver.resolve_path_item(path_item).map_err(|e| {
                OpenApiToolsError::Reference(format!("path '{path}': {e}"))
            })?;

            let methods = [
                ("get", &path_item.get),
                ("put", &path_item.put),
                ("post", &path_item.post),
                ("delete", &path_item.delete),
                ("options", &path_item.options),
                ("head", &path_item.head),
                ("patch", &path_item.patch),
                ("trace", &path_item.trace),
            ];

            for (method, operation) in methods {
                let Some(op) = operation.as_ref() else {
                    continue;
                };
                if !self.should_auto_discover(method, path) {
                    continue;
                }

                let input = ToolGenerationInput {
                    path_item_params: &path_item.parameters,
                    path,
                    method,
                    operation: op,
                };
                tools.push(generate_tool(&resolver, input, &mut tool_names)?);
            }
        }

        Ok(tools)
    }

    /// Check if an operation should be auto-discovered.
    fn should_auto_discover(&self, method: &str, path: &str) -> bool {
        let auto = &self.config.auto_discover;
        if !auto.is_enabled() {
            return false;
        }

        let operation_str = format!("{} {}", method.to_uppercase(), path);

        // Exclude patterns win.
        if auto
            .exclude_patterns()
            .iter()
            .any(|p| glob_match(p, &operation_str))
        {
            return false;
        }

        let include = auto.include_patterns();
        include.is_empty() || include.iter().any(|p| glob_match(p, &operation_str))
    }
}

fn parse_document(bytes: &[u8]) -> Result<OpenAPI> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(OpenApiToolsError::EmptyDocument);
    }

    // Peek at the version first so Swagger 2.0 documents get a precise error instead of a
    // field-level parse failure.
    let raw: serde_yaml::Value =
        serde_yaml::from_slice(bytes).map_err(|source| OpenApiToolsError::Parse { source })?;
    let serde_yaml::Value::Mapping(root) = &raw else {
        return Err(OpenApiToolsError::Validation(
            "document root must be a mapping".to_string(),
        ));
    };
    match (root.get("openapi"), root.get("swagger")) {
        (Some(serde_yaml::Value::String(v)), _) if v.starts_with("3.") => {}
        (Some(serde_yaml::Value::String(v)), _) => {
            return Err(OpenApiToolsError::UnsupportedVersion(v.clone()));
        }
        // `openapi: 3.1` without quotes is a YAML number.
        (Some(serde_yaml::Value::Number(n)), _) => {
            return Err(OpenApiToolsError::Validation(format!(
                "'openapi' version must be a string, got number {n} (write openapi: \"{n}\")"
            )));
        }
        (None, Some(v)) => {
            let v = v.as_str().map_or_else(|| "2.0".to_string(), str::to_string);
            return Err(OpenApiToolsError::UnsupportedVersion(v));
        }
        _ => {
            return Err(OpenApiToolsError::Validation(
                "missing 'openapi' version field".to_string(),
            ));
        }
    }

    serde_yaml::from_value(raw).map_err(|source| OpenApiToolsError::Parse { source })
}

/// Deterministic server name: slug of the title plus a short digest of the document bytes.
fn server_name(title: &str, spec_hash: &str) -> String {
    let mut slug = NON_ALNUM_RE
        .replace_all(&title.to_lowercase(), "_")
        .trim_matches('_')
        .to_string();
    slug.truncate(MAX_SERVER_SLUG_LEN);
    let slug = slug.trim_end_matches('_');
    let slug = if slug.is_empty() { "openapi" } else { slug };
    format!("{slug}_{}", &spec_hash[..NAME_HASH_LEN])
}

fn generate_tool(
    resolver: &LocalResolver,
    input: ToolGenerationInput<'_>,
    tool_names: &mut HashSet<String>,
) -> Result<ToolConfig> {
    let method = input.method;
    let path = input.path;
    let operation = input.operation;

    let base_name = operation
        .operation_id
        .clone()
        .unwrap_or_else(|| generate_canonical_name(method, path));
    let name = reserve_unique_tool_name(tool_names, &base_name);

    let description = operation
        .summary
        .clone()
        .or_else(|| operation.description.clone())
        .or_else(|| Some(format!("Calls {} {}", method.to_uppercase(), path)));

    let parameters = collect_tool_parameters(resolver, &input)?;
    let input_schema = build_input_schema(&parameters);

    Ok(ToolConfig {
        name,
        description,
        method: method.to_uppercase(),
        path: path.to_string(),
        operation_id: operation.operation_id.clone(),
        args: parameters
            .into_iter()
            .map(|p| ArgConfig {
                name: p.name,
                position: p.position,
                required: p.required,
                description: p.description,
                schema: p.schema,
            })
            .collect(),
        input_schema,
    })
}

fn collect_tool_parameters(
    resolver: &LocalResolver,
    input: &ToolGenerationInput<'_>,
) -> Result<Vec<ToolParameter>> {
    let op_label = format!("{} {}", input.method.to_uppercase(), input.path);

    let merged = merge_parameters(resolver, input.path_item_params, &input.operation.parameters)
        .map_err(|e| with_operation_context(e, &op_label))?;

    let mut parameters = Vec::new();
    let mut param_names: HashSet<String> = HashSet::new();

    for param in &merged {
        let param_info = extract_parameter(resolver, param, &op_label)?;
        if !param_names.insert(param_info.name.clone()) {
            return Err(OpenApiToolsError::ParamCollision(format!(
                "Parameter '{}' appears multiple times in {op_label}",
                param_info.name
            )));
        }
        parameters.push(param_info);
    }

    if let Some(body_ref) = &input.operation.request_body {
        let body = resolver
            .resolve_request_body(body_ref)
            .map_err(|e| with_operation_context(e, &op_label))?;
        for bp in extract_body_params(resolver, &body, &op_label)? {
            if !param_names.insert(bp.name.clone()) {
                return Err(OpenApiToolsError::ParamCollision(format!(
                    "Body parameter '{}' collides with path/query/header parameter in {op_label}",
                    bp.name
                )));
            }
            parameters.push(bp);
        }
    }

    Ok(parameters)
}

fn with_operation_context(e: OpenApiToolsError, op_label: &str) -> OpenApiToolsError {
    match e {
        OpenApiToolsError::Reference(msg) => {
            OpenApiToolsError::Reference(format!("{op_label}: {msg}"))
        }
        OpenApiToolsError::Unsupported { location, message } => OpenApiToolsError::Unsupported {
            location: format!("{op_label}: {location}"),
            message,
        },
        other => other,
    }
}

fn merge_parameters(
    resolver: &LocalResolver,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<Parameter>> {
    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(&'static str, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let rp = resolver.resolve_parameter(p)?;
        let key = (param_location(&rp), rp.parameter_data_ref().name.clone());
        if let Some(i) = index.get(&key).copied() {
            // Operation-level parameters override path-level ones.
            merged[i] = rp;
        } else {
            index.insert(key, merged.len());
            merged.push(rp);
        }
    }

    Ok(merged)
}

fn param_location(p: &Parameter) -> &'static str {
    match p {
        Parameter::Path { .. } => "path",
        Parameter::Query { .. } => "query",
        Parameter::Header { .. } => "header",
        Parameter::Cookie { .. } => "cookie",
    }
}

fn extract_parameter(
    resolver: &LocalResolver,
    param: &Parameter,
    op_label: &str,
) -> Result<ToolParameter> {
    let (position, required) = match param {
        // Path params are always required.
        Parameter::Path { .. } => (ArgPosition::Path, true),
        Parameter::Query { parameter_data, .. } => (ArgPosition::Query, parameter_data.required),
        Parameter::Header { parameter_data, .. } => {
            (ArgPosition::Header, parameter_data.required)
        }
        Parameter::Cookie { parameter_data, .. } => {
            return Err(OpenApiToolsError::Unsupported {
                location: format!("{op_label} parameter '{}'", parameter_data.name),
                message: "cookie parameters are not supported".to_string(),
            });
        }
    };

    let data = param.parameter_data_ref();
    let mut schema = extract_schema(resolver, &data.format)
        .map_err(|e| with_operation_context(e, op_label))?;
    if let Some(obj) = schema.as_object_mut()
        && !obj.contains_key("description")
        && let Some(desc) = &data.description
    {
        obj.insert("description".to_string(), Value::String(desc.clone()));
    }

    Ok(ToolParameter {
        name: data.name.clone(),
        position,
        required,
        description: data.description.clone(),
        schema,
    })
}

/// Flatten a JSON object request body into tool arguments, or expose it as a single `body`.
fn extract_body_params(
    resolver: &LocalResolver,
    body: &RequestBody,
    op_label: &str,
) -> Result<Vec<ToolParameter>> {
    let Some(schema_ref) = json_media(body).and_then(|c| c.schema.as_ref()) else {
        return Ok(Vec::new());
    };

    let schema = resolver
        .resolve_schema(schema_ref)
        .map_err(|e| with_operation_context(e, op_label))?;
    let mut expanding = Vec::new();
    if let ReferenceOr::Reference { reference } = schema_ref {
        expanding.push(reference.clone());
    }

    // A non-required body cannot make any of its fields required at the tool-arg level.
    let body_required = body.required;

    if let openapiv3::SchemaKind::Type(openapiv3::Type::Object(obj)) = &schema.schema_kind {
        let mut params = Vec::with_capacity(obj.properties.len());
        for (prop_name, prop_schema) in &obj.properties {
            let schema_value = schema_ref_to_json(resolver, prop_schema, &mut expanding)
                .map_err(|e| with_operation_context(e, op_label))?;
            let description = schema_value
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            params.push(ToolParameter {
                name: prop_name.clone(),
                position: ArgPosition::Body,
                required: body_required && obj.required.contains(prop_name),
                description,
                schema: schema_value,
            });
        }
        Ok(params)
    } else {
        let schema_value = schema_to_json(resolver, &schema, &mut expanding)
            .map_err(|e| with_operation_context(e, op_label))?;
        Ok(vec![ToolParameter {
            name: "body".to_string(),
            position: ArgPosition::Body,
            required: body_required,
            description: body.description.clone(),
            schema: schema_value,
        }])
    }
}

/// The JSON entry of a request body: `application/json` itself, else the first media type whose
/// essence is JSON (`application/json; charset=utf-8`, `application/*+json`).
fn json_media(body: &RequestBody) -> Option<&openapiv3::MediaType> {
    body.content.get("application/json").or_else(|| {
        body.content
            .iter()
            .find(|(media_type, _)| is_json_media_type(media_type))
            .map(|(_, media)| media)
    })
}

fn is_json_media_type(media_type: &str) -> bool {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn extract_schema(resolver: &LocalResolver, format: &ParameterSchemaOrContent) -> Result<Value> {
    match format {
        ParameterSchemaOrContent::Schema(schema_ref) => {
            schema_ref_to_json(resolver, schema_ref, &mut Vec::new())
        }
        ParameterSchemaOrContent::Content(_) => Ok(json!({ "type": "string" })),
    }
}

/// Inline a (possibly referenced) schema.
///
/// `expanding` holds the refs currently being inlined; a ref that points back into that chain
/// (a recursive type) is emitted as a plain object schema instead of being expanded again.
fn schema_ref_to_json<S: Borrow<Schema>>(
    resolver: &LocalResolver,
    schema_ref: &ReferenceOr<S>,
    expanding: &mut Vec<String>,
) -> Result<Value> {
    match schema_ref {
        ReferenceOr::Item(schema) => schema_to_json(resolver, schema.borrow(), expanding),
        ReferenceOr::Reference { reference } => {
            if expanding.contains(reference) {
                return Ok(json!({ "type": "object" }));
            }
            let schema = resolver.resolve_schema(&ReferenceOr::ref_(reference))?;
            expanding.push(reference.clone());
            let value = schema_to_json(resolver, &schema, expanding);
            expanding.pop();
            value
        }
    }
}

fn schema_list_to_json(
    resolver: &LocalResolver,
    schemas: &[ReferenceOr<Schema>],
    expanding: &mut Vec<String>,
) -> Result<Value> {
    schemas
        .iter()
        .map(|s| schema_ref_to_json(resolver, s, expanding))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Convert an `OpenAPI` schema to a self-contained JSON Schema value.
///
/// Every nested `$ref` is resolved and inlined, so a dangling or external ref anywhere in the
/// schema rejects the conversion.
fn schema_to_json(
    resolver: &LocalResolver,
    schema: &Schema,
    expanding: &mut Vec<String>,
) -> Result<Value> {
    let mut result = json!({});

    if let Some(desc) = &schema.schema_data.description {
        result["description"] = json!(desc);
    }
    if let Some(default) = &schema.schema_data.default {
        result["default"] = default.clone();
    }

    match &schema.schema_kind {
        openapiv3::SchemaKind::Type(t) => match t {
            openapiv3::Type::String(s) => {
                result["type"] = json!("string");
                if !s.enumeration.is_empty() {
                    let values: Vec<_> = s.enumeration.iter().flatten().cloned().collect();
                    result["enum"] = json!(values);
                }
            }
            openapiv3::Type::Number(_) => result["type"] = json!("number"),
            openapiv3::Type::Integer(_) => result["type"] = json!("integer"),
            openapiv3::Type::Boolean(_) => result["type"] = json!("boolean"),
            openapiv3::Type::Array(a) => {
                result["type"] = json!("array");
                if let Some(items) = &a.items {
                    result["items"] = schema_ref_to_json(resolver, items, expanding)?;
                }
            }
            openapiv3::Type::Object(o) => {
                result["type"] = json!("object");
                let mut properties = serde_json::Map::new();
                for (name, prop) in &o.properties {
                    properties.insert(name.clone(), schema_ref_to_json(resolver, prop, expanding)?);
                }
                if !properties.is_empty() {
                    result["properties"] = Value::Object(properties);
                }
                if !o.required.is_empty() {
                    result["required"] = json!(o.required);
                }
            }
        },
        openapiv3::SchemaKind::OneOf { one_of } => {
            result["oneOf"] = schema_list_to_json(resolver, one_of, expanding)?;
        }
        openapiv3::SchemaKind::AnyOf { any_of } => {
            result["anyOf"] = schema_list_to_json(resolver, any_of, expanding)?;
        }
        openapiv3::SchemaKind::AllOf { all_of } => {
            result["allOf"] = schema_list_to_json(resolver, all_of, expanding)?;
        }
        openapiv3::SchemaKind::Not { not } => {
            result["not"] = schema_ref_to_json(resolver, &**not, expanding)?;
        }
        openapiv3::SchemaKind::Any(_) => result["type"] = json!("object"),
    }

    Ok(result)
}

/// Build the input schema for a tool from its parameters.
fn build_input_schema(parameters: &[ToolParameter]) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<&str> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(&param.name);
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// Generate a canonical tool name from method and path.
fn generate_canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);
    let unwrapped = PATH_PARAM_RE.replace_all(&raw, "_$1");
    let mut name = NON_ALNUM_RE
        .replace_all(&unwrapped, "_")
        .trim_matches('_')
        .to_string();
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

fn reserve_unique_tool_name(tool_names: &mut HashSet<String>, base: &str) -> String {
    if tool_names.insert(base.to_string()) {
        return base.to_string();
    }

    let mut counter = 1;
    loop {
        let candidate = format!("{base}_{counter}");
        if tool_names.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    // Simple glob matching on bytes:
    //   * => any sequence
    //   ? => any single character
    let pattern_bytes = pattern.as_bytes();
    let text_bytes = text.as_bytes();

    let mut pattern_index = 0usize;
    let mut text_index = 0usize;
    let mut star_index: Option<usize> = None;
    let mut star_text_index = 0usize;

    while text_index < text_bytes.len() {
        match pattern_bytes.get(pattern_index) {
            Some(b'*') => {
                star_index = Some(pattern_index);
                pattern_index += 1;
                star_text_index = text_index;
            }
            Some(b'?') => {
                pattern_index += 1;
                text_index += 1;
            }
            Some(&b) if b == text_bytes[text_index] => {
                pattern_index += 1;
                text_index += 1;
            }
            _ => {
                let Some(si) = star_index else {
                    return false;
                };
                pattern_index = si + 1;
                star_text_index += 1;
                text_index = star_text_index;
            }
        }
    }

    while matches!(pattern_bytes.get(pattern_index), Some(b'*')) {
        pattern_index += 1;
    }

    pattern_index == pattern_bytes.len()
}
