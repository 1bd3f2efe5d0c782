//! Testing utilities for VCFG workspace
//!
//! Shared schemas, a fresh-registry transformer and tracing setup.

#![allow(missing_docs)]

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing_subscriber::EnvFilter;
use vcfg_metadata::{MetadataHash, MetadataRegistry};
use vcfg_tree::{BuildOutput, Transformer, TransformerConfig};

/// Install a test-friendly subscriber; later calls are no-ops
///
/// Honors `RUST_LOG`, defaulting to `debug` for the workspace crates.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vcfg_metadata=debug,vcfg_tree=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Transformer over its own empty registry
pub fn transformer() -> Transformer {
    Transformer::new(Arc::new(MetadataRegistry::new()))
}

pub fn transformer_with(config: TransformerConfig) -> Transformer {
    Transformer::with_config(Arc::new(MetadataRegistry::new()), config).unwrap()
}

/// Normalize `schema` and return its hash
pub fn register(transformer: &Transformer, schema: &JsonValue) -> MetadataHash {
    transformer.normalize(schema).unwrap().hash
}

/// Normalize `schema` and build `value` against it
pub fn build(transformer: &Transformer, schema: &JsonValue, value: Option<&JsonValue>) -> BuildOutput {
    transformer.build_from_schema(schema, value).unwrap()
}

pub fn temperature_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {"temperature": {"type": "number", "min": 0, "max": 2}}
    })
}

pub fn string_list_schema() -> JsonValue {
    json!({"type": "array", "itemMetadata": {"type": "string"}})
}

/// Compound with two object variants sharing field `x`
pub fn two_variant_schema() -> JsonValue {
    json!({
        "type": "compound",
        "options": {
            "A": {"type": "object", "properties": {"x": {"type": "number"}}},
            "B": {"type": "object", "properties": {
                "x": {"type": "number"},
                "y": {"type": "string"}
            }}
        }
    })
}

/// Closed object with a single declared `role`
pub fn fixed_role_schema() -> JsonValue {
    json!({"type": "object", "properties": {"role": {"type": "string"}}})
}

/// Model settings exercising every field shape
pub fn model_settings_schema() -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "model": {"type": "string", "options": ["small", "large"], "allowFreeform": true},
            "temperature": {"type": "number", "min": 0, "max": 2},
            "max_tokens": {"type": ["integer", "null"], "min": 1},
            "stream": {"type": "boolean", "default": true},
            "stop": {"type": "array", "items": {"type": "string"}, "maxItems": 4},
            "headers": {"type": "object", "additionalProperties": {"type": "string"}},
            "extra": {"type": "object", "additionalProperties": true},
            "response_format": {
                "type": "compound",
                "options": [
                    {"key": "text", "metadata": {"type": "object", "properties": {}}},
                    {"key": "json_schema", "metadata": {"type": "object", "properties": {
                        "name": {"type": "string"},
                        "strict": {"type": "boolean"}
                    }}, "default": {"name": "output"}}
                ]
            }
        }
    })
}

pub fn model_settings_value() -> JsonValue {
    json!({
        "model": "large",
        "temperature": 0.7,
        "max_tokens": 256,
        "stop": ["\n\n"],
        "headers": {"x-team": "infra"},
        "extra": {"seed": 7, "tags": ["a", "b"]},
        "response_format": {"type": "json_schema", "name": "answer", "strict": true}
    })
}
