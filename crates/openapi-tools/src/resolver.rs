//! Local `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them.
//! Conversion is a pure function of the uploaded bytes, so only refs that point into the same
//! document (`#/...`) are supported. File and URL refs are rejected instead of fetched.

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{OpenAPI, Parameter, PathItem, ReferenceOr, RequestBody, Schema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug)]
pub struct LocalResolver {
    root: Value,
}

impl LocalResolver {
    /// Create a resolver over a parsed document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be converted into JSON for pointer lookups.
    pub fn new(spec: &OpenAPI) -> Result<Self> {
        let root = serde_json::to_value(spec)?;
        Ok(Self { root })
    }

    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic, or of the wrong type.
    pub fn resolve_parameter(&self, param: &ReferenceOr<Parameter>) -> Result<Parameter> {
        self.resolve_reference_or(param)
    }

    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic, or of the wrong type.
    pub fn resolve_request_body(&self, body: &ReferenceOr<RequestBody>) -> Result<RequestBody> {
        self.resolve_reference_or(body)
    }

    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic, or of the wrong type.
    pub fn resolve_schema(&self, schema: &ReferenceOr<Schema>) -> Result<Schema> {
        self.resolve_reference_or(schema)
    }

    /// # Errors
    ///
    /// Returns an error if the reference is external, dangling, cyclic, or of the wrong type.
    pub fn resolve_path_item(&self, item: &ReferenceOr<PathItem>) -> Result<PathItem> {
        self.resolve_reference_or(item)
    }

    fn resolve_reference_or<T>(&self, r: &ReferenceOr<T>) -> Result<T>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    if !seen.insert(reference.clone()) {
                        return Err(OpenApiToolsError::Reference(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let value = self.lookup(&reference)?;
                    cur = serde_json::from_value(value.clone()).map_err(|e| {
                        OpenApiToolsError::Reference(format!(
                            "Failed to deserialize referenced value '{reference}' as expected type: {e}",
                        ))
                    })?;
                }
            }
        }
    }

    fn lookup(&self, reference: &str) -> Result<&Value> {
        let Some(frag) = reference.strip_prefix('#') else {
            return Err(OpenApiToolsError::Unsupported {
                location: reference.to_string(),
                message: "external $ref (only '#/...' refs within the document are supported)"
                    .to_string(),
            });
        };
        if !frag.starts_with('/') {
            return Err(OpenApiToolsError::Reference(format!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
            )));
        }
        self.root.pointer(frag).ok_or_else(|| {
            OpenApiToolsError::Reference(format!("Unresolved $ref '{reference}'"))
        })
    }
}
