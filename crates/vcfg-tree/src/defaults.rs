//! Default filling on plain JSON
//!
//! Computes what [`extract_node`](crate::extract::extract_node) would return
//! for a freshly built tree, without allocating nodes. The two walks apply
//! the same rules and must stay in lockstep.

use serde_json::{Map, Value as JsonValue};
use vcfg_metadata::{
    is_bookkeeping_key, ConfigMetadata, MetadataHash, MetadataNotFoundError, MetadataRegistry,
};

use crate::builder::{
    default_number, is_integral, is_object_variant, select_variant, strip_bookkeeping,
};
use crate::extract::wrap_variant;

/// Fill `input` with defaults against `hash`
///
/// # Errors
/// Returns [`MetadataNotFoundError`] if a reachable hash is not registered
pub fn fill_defaults(
    registry: &MetadataRegistry,
    hash: MetadataHash,
    input: Option<&JsonValue>,
    discriminator: &str,
) -> Result<JsonValue, MetadataNotFoundError> {
    let metadata = registry.get(&hash)?;
    let input = input.filter(|v| !v.is_null());

    let value = match (&*metadata, input) {
        (m, None) if m.is_nullable() => JsonValue::Null,
        (ConfigMetadata::String(_), input) => match input {
            Some(JsonValue::String(s)) => JsonValue::String(s.clone()),
            _ => JsonValue::String(String::new()),
        },
        (ConfigMetadata::Number(m), input) => match input {
            Some(JsonValue::Number(n)) if !m.is_integer || is_integral(n) => {
                JsonValue::Number(n.clone())
            }
            _ => JsonValue::Number(default_number(m)),
        },
        (ConfigMetadata::Boolean(m), input) => match input {
            Some(JsonValue::Bool(b)) => JsonValue::Bool(*b),
            _ => JsonValue::Bool(m.default.unwrap_or(false)),
        },
        (ConfigMetadata::Array(m), input) => match input {
            Some(JsonValue::Array(items)) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| fill_defaults(registry, m.item_metadata, Some(item), discriminator))
                    .collect::<Result<_, _>>()?,
            ),
            _ => JsonValue::Array(Vec::new()),
        },
        (ConfigMetadata::Object(m), input) => {
            let fields = input.and_then(JsonValue::as_object);
            let mut out = Map::new();
            for (key, child) in &m.properties {
                let value = fields.and_then(|map| map.get(key));
                out.insert(
                    key.clone(),
                    fill_defaults(registry, *child, value, discriminator)?,
                );
            }
            if m.additional_properties {
                for (key, value) in fields.into_iter().flatten() {
                    if m.declares(key) || is_bookkeeping_key(key) {
                        continue;
                    }
                    let value = match m.additional_metadata {
                        Some(hash) => fill_defaults(registry, hash, Some(value), discriminator)?,
                        None => strip_bookkeeping(value),
                    };
                    out.insert(key.clone(), value);
                }
            }
            JsonValue::Object(out)
        }
        (ConfigMetadata::Compound(m), input) => {
            let selection = select_variant(registry, m, input, discriminator)?;
            let option = selection.option.ok_or(MetadataNotFoundError::Hash(hash))?;
            let variant_input = selection.input.as_deref().or(Some(&option.default));
            let inner = fill_defaults(registry, option.metadata, variant_input, discriminator)?;
            wrap_variant(discriminator, &option.key, inner, is_object_variant(registry, option)?)
        }
    };

    Ok(value)
}
