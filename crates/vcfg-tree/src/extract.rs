//! Extraction of flat parameters from Enhanced trees

use serde_json::{Map, Value as JsonValue};
use vcfg_metadata::{is_bookkeeping_key, ConfigMetadata, MetadataNotFoundError, MetadataRegistry};

use crate::builder::is_object_variant;
use crate::error::TreeError;
use crate::node::{variant_path, EnhancedNode, NodeValue, ObjectEntry, VARIANT_VALUE_KEY};
use crate::path::NodePath;

/// Plain JSON for `node`, bookkeeping removed
///
/// Compound values carry `discriminator` set to the active variant key:
/// merged into object variants, as `{discriminator, value}` otherwise.
/// A nested compound is boxed too, so each level keeps its own key.
///
/// # Errors
/// - [`TreeError::TypeMismatch`] if a node's shape disagrees with its metadata
/// - [`TreeError::MetadataNotFound`] if a hash or active variant is unknown
pub fn extract_node(
    registry: &MetadataRegistry,
    node: &EnhancedNode,
    discriminator: &str,
    path: &NodePath,
) -> Result<JsonValue, TreeError> {
    let metadata = registry.get(&node.metadata_hash())?;

    let value = match (&*metadata, node.value()) {
        (m, NodeValue::Null) if m.is_nullable() => JsonValue::Null,
        (ConfigMetadata::String(_), NodeValue::String(s)) => JsonValue::String(s.clone()),
        (ConfigMetadata::Number(_), NodeValue::Number(n)) => JsonValue::Number(n.clone()),
        (ConfigMetadata::Boolean(_), NodeValue::Boolean(b)) => JsonValue::Bool(*b),
        (ConfigMetadata::Array(_), NodeValue::Array(items)) => JsonValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| extract_node(registry, item, discriminator, &path.child_index(i)))
                .collect::<Result<_, _>>()?,
        ),
        (ConfigMetadata::Object(_), NodeValue::Object(entries)) => {
            let mut out = Map::new();
            for (key, entry) in entries {
                if is_bookkeeping_key(key) {
                    continue;
                }
                let value = match entry {
                    ObjectEntry::Node(child) => {
                        extract_node(registry, child, discriminator, &path.child_key(key.as_str()))?
                    }
                    ObjectEntry::Raw(raw) => raw.clone(),
                };
                out.insert(key.clone(), value);
            }
            JsonValue::Object(out)
        }
        (ConfigMetadata::Compound(m), NodeValue::Compound(compound)) => {
            let Some(option) = m.option(&compound.active_variant_key) else {
                return Err(MetadataNotFoundError::Variant {
                    hash: node.metadata_hash(),
                    key: compound.active_variant_key.clone(),
                }
                .into());
            };
            match &compound.value {
                Some(inner) => {
                    let merge = is_object_variant(registry, option)?;
                    let inner =
                        extract_node(registry, inner, discriminator, &variant_path(inner, path))?;
                    wrap_variant(discriminator, &option.key, inner, merge)
                }
                None if m.common.nullable => JsonValue::Null,
                None => return Err(TreeError::mismatch(path, "compound", "null")),
            }
        }
        (m, value) => {
            return Err(TreeError::mismatch(path, m.shape().as_str(), value.type_name()));
        }
    };

    Ok(value)
}

/// Tag a variant's value with its key
///
/// With `merge`, object fields sit next to the discriminator; any other
/// value goes under [`VARIANT_VALUE_KEY`].
pub(crate) fn wrap_variant(
    discriminator: &str,
    key: &str,
    value: JsonValue,
    merge: bool,
) -> JsonValue {
    let mut out = Map::new();
    out.insert(discriminator.to_owned(), JsonValue::String(key.to_owned()));
    match value {
        JsonValue::Object(fields) if merge => {
            for (field, value) in fields {
                if field != discriminator {
                    out.insert(field, value);
                }
            }
        }
        other => {
            out.insert(VARIANT_VALUE_KEY.to_owned(), other);
        }
    }
    JsonValue::Object(out)
}
