//! OpenAPI -> MCP server configuration conversion.
//!
//! This crate is used by `unrelated-openapi-import` to turn uploaded `OpenAPI` documents into
//! [`config::McpServerConfig`] values.
//!
//! It intentionally contains **no** storage logic and **no** notification logic: conversion is a
//! pure function of the document bytes and the requested addressing.

pub mod config;
pub mod convert;
pub mod error;
pub mod resolver;

pub use config::{ArgConfig, ArgPosition, ConverterConfig, McpServerConfig, ToolConfig};
pub use convert::Converter;
pub use error::{OpenApiToolsError, Result};
