//! Schema normalization
//!
//! Converts a loosely typed schema fragment into canonical
//! [`ConfigMetadata`], registering every node bottom-up in a
//! [`MetadataRegistry`].
//!
//! Accepted vocabulary beyond the canonical field names:
//! - `integer` type (number with `isInteger`)
//! - `["string", "null"]` style type lists (nullable)
//! - `items`, `minimum`/`maximum` and `enum` aliases
//! - `anyOf`/`oneOf` unions, collapsed to a nullable schema or a compound
//! - compound `options` as a list (ordered) or a map keyed by variant
//!   (sorted by key, so the smallest key is the default variant)

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};

use crate::error::{RegistryError, SchemaNormalizationError};
use crate::hash::MetadataHash;
use crate::metadata::{
    is_bookkeeping_key, ArrayMetadata, BooleanMetadata, CommonMetadata, CompoundMetadata,
    CompoundOption, ConfigMetadata, NumberMetadata, ObjectMetadata, StringMetadata,
};
use crate::registry::MetadataRegistry;

type Result<T> = std::result::Result<T, SchemaNormalizationError>;
type JsonObject = Map<String, JsonValue>;

/// Default nesting limit for schemas
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Outcome of normalizing a schema
#[derive(Debug, Clone)]
pub struct Normalized {
    pub hash: MetadataHash,
    pub metadata: Arc<ConfigMetadata>,
}

/// Normalizes raw schema fragments into the registry
#[derive(Debug, Clone, Copy)]
pub struct SchemaNormalizer<'a> {
    registry: &'a MetadataRegistry,
    max_depth: usize,
}

impl<'a> SchemaNormalizer<'a> {
    #[must_use]
    pub fn new(registry: &'a MetadataRegistry) -> Self {
        Self {
            registry,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Limit schema nesting
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Normalize and register a schema fragment
    ///
    /// # Errors
    /// Returns [`SchemaNormalizationError`] for malformed schemas. Children
    /// registered before the failure stay in the registry.
    pub fn normalize(&self, schema: &JsonValue) -> Result<Normalized> {
        let hash = self.normalize_at(schema, "", 0)?;
        let metadata = self.registry.get(&hash).map_err(RegistryError::from)?;
        tracing::debug!(hash = %hash.short(), shape = %metadata.shape(), "normalized schema");
        Ok(Normalized { hash, metadata })
    }

    fn normalize_at(&self, schema: &JsonValue, path: &str, depth: usize) -> Result<MetadataHash> {
        let metadata = self.describe(schema, path, depth)?;
        Ok(self.registry.register(metadata)?)
    }

    fn describe(&self, schema: &JsonValue, path: &str, depth: usize) -> Result<ConfigMetadata> {
        if depth > self.max_depth {
            return Err(SchemaNormalizationError::DepthExceeded {
                path: display_path(path),
                max_depth: self.max_depth,
            });
        }
        let obj = schema
            .as_object()
            .ok_or_else(|| SchemaNormalizationError::NotAnObject {
                path: display_path(path),
            })?;

        let (declared, nullable_from_type) = read_type(obj, path)?;
        let mut common = read_common(obj, path)?;
        common.nullable |= nullable_from_type;

        let tag = match declared {
            Some(tag) => tag,
            None if obj.contains_key("anyOf") || obj.contains_key("oneOf") => {
                return self.union(obj, common, path, depth);
            }
            None if obj.contains_key("properties") => "object".to_owned(),
            None if obj.contains_key("itemMetadata") || obj.contains_key("items") => {
                "array".to_owned()
            }
            None => {
                return Err(SchemaNormalizationError::MissingType {
                    path: display_path(path),
                })
            }
        };

        match tag.as_str() {
            "string" => string(obj, common, path),
            "number" => number(obj, common, path, false),
            "integer" => number(obj, common, path, true),
            "boolean" => Ok(ConfigMetadata::Boolean(BooleanMetadata {
                common,
                default: opt_bool(obj, "default", path)?,
            })),
            "array" => self.array(obj, common, path, depth),
            "object" => self.object(obj, common, path, depth),
            "compound" => self.compound(obj, common, path, depth),
            _ => Err(SchemaNormalizationError::UnknownType {
                path: display_path(path),
                found: tag.clone(),
            }),
        }
    }

    fn array(
        &self,
        obj: &JsonObject,
        common: CommonMetadata,
        path: &str,
        depth: usize,
    ) -> Result<ConfigMetadata> {
        let (field, items) = first_of(obj, &["itemMetadata", "items"]).ok_or_else(|| {
            SchemaNormalizationError::MissingItemSchema {
                path: display_path(path),
            }
        })?;
        let item_metadata = self.normalize_at(items, &format!("{path}/{field}"), depth + 1)?;

        let min_items = opt_usize(obj, "minItems", path)?;
        let max_items = opt_usize(obj, "maxItems", path)?;
        if let (Some(min), Some(max)) = (min_items, max_items) {
            if min > max {
                return Err(SchemaNormalizationError::InvalidItemBounds {
                    path: display_path(path),
                    min,
                    max,
                });
            }
        }

        Ok(ConfigMetadata::Array(ArrayMetadata {
            common,
            item_metadata,
            min_items,
            max_items,
        }))
    }

    fn object(
        &self,
        obj: &JsonObject,
        common: CommonMetadata,
        path: &str,
        depth: usize,
    ) -> Result<ConfigMetadata> {
        let mut properties = indexmap::IndexMap::new();
        match obj.get("properties") {
            None | Some(JsonValue::Null) => {}
            Some(JsonValue::Object(props)) => {
                for (key, child) in props {
                    if is_bookkeeping_key(key) {
                        return Err(SchemaNormalizationError::ReservedKey {
                            path: display_path(path),
                            key: key.clone(),
                        });
                    }
                    let hash =
                        self.normalize_at(child, &format!("{path}/properties/{key}"), depth + 1)?;
                    properties.insert(key.clone(), hash);
                }
            }
            Some(_) => return Err(invalid_field(path, "properties", "an object")),
        }

        let (additional_properties, additional_metadata) = match obj.get("additionalProperties") {
            None | Some(JsonValue::Null) => (false, None),
            Some(JsonValue::Bool(allowed)) => (*allowed, None),
            Some(schema @ JsonValue::Object(_)) => {
                let hash = self.normalize_at(
                    schema,
                    &format!("{path}/additionalProperties"),
                    depth + 1,
                )?;
                (true, Some(hash))
            }
            Some(_) => {
                return Err(invalid_field(
                    path,
                    "additionalProperties",
                    "a boolean or a schema",
                ))
            }
        };

        Ok(ConfigMetadata::Object(ObjectMetadata {
            common,
            properties,
            additional_properties,
            additional_metadata,
        }))
    }

    fn compound(
        &self,
        obj: &JsonObject,
        common: CommonMetadata,
        path: &str,
        depth: usize,
    ) -> Result<ConfigMetadata> {
        let mut options = Vec::new();
        match obj.get("options") {
            None | Some(JsonValue::Null) => {}
            Some(JsonValue::Array(entries)) => {
                for (i, entry) in entries.iter().enumerate() {
                    let entry_path = format!("{path}/options/{i}");
                    let entry_obj = entry.as_object().ok_or_else(|| {
                        SchemaNormalizationError::NotAnObject {
                            path: entry_path.clone(),
                        }
                    })?;
                    let key = opt_str(entry_obj, "key", &entry_path)?
                        .ok_or_else(|| invalid_field(&entry_path, "key", "a string"))?;
                    let (field, schema) = first_of(entry_obj, &["metadata", "schema"])
                        .ok_or_else(|| invalid_field(&entry_path, "metadata", "a schema"))?;
                    let metadata =
                        self.normalize_at(schema, &format!("{entry_path}/{field}"), depth + 1)?;
                    options.push(CompoundOption {
                        key,
                        label: label_of(entry_obj, &entry_path)?,
                        metadata,
                        default: entry_obj.get("default").cloned().unwrap_or_default(),
                    });
                }
            }
            Some(JsonValue::Object(entries)) => {
                for (key, entry) in entries {
                    let entry_path = format!("{path}/options/{key}");
                    let entry_obj = entry.as_object().ok_or_else(|| {
                        SchemaNormalizationError::NotAnObject {
                            path: entry_path.clone(),
                        }
                    })?;
                    let option = match first_of(entry_obj, &["metadata", "schema"]) {
                        Some((field, schema)) => CompoundOption {
                            key: key.clone(),
                            label: label_of(entry_obj, &entry_path)?,
                            metadata: self.normalize_at(
                                schema,
                                &format!("{entry_path}/{field}"),
                                depth + 1,
                            )?,
                            default: entry_obj.get("default").cloned().unwrap_or_default(),
                        },
                        // The entry is the variant schema itself.
                        None => CompoundOption {
                            key: key.clone(),
                            label: opt_str(entry_obj, "title", &entry_path)?,
                            metadata: self.normalize_at(entry, &entry_path, depth + 1)?,
                            default: entry_obj.get("default").cloned().unwrap_or_default(),
                        },
                    };
                    options.push(option);
                }
                // map order is not meaningful; the first key in sort order is the default
                options.sort_by(|a, b| a.key.cmp(&b.key));
            }
            Some(_) => return Err(invalid_field(path, "options", "a list or a map")),
        }

        finish_compound(common, options, path)
    }

    fn union(
        &self,
        obj: &JsonObject,
        mut common: CommonMetadata,
        path: &str,
        depth: usize,
    ) -> Result<ConfigMetadata> {
        let (field, branches) = first_of(obj, &["anyOf", "oneOf"])
            .ok_or_else(|| SchemaNormalizationError::MissingType {
                path: display_path(path),
            })?;
        let branches = branches
            .as_array()
            .ok_or_else(|| invalid_field(path, field, "a list of schemas"))?;

        let mut remaining = Vec::new();
        for (i, branch) in branches.iter().enumerate() {
            if branch.get("type").and_then(JsonValue::as_str) == Some("null") {
                common.nullable = true;
            } else {
                remaining.push((i, branch));
            }
        }

        if let [(i, branch)] = remaining.as_slice() {
            let mut inner = self.describe(branch, &format!("{path}/{field}/{i}"), depth + 1)?;
            let inner_common = inner.common_mut();
            inner_common.nullable |= common.nullable;
            if common.key.is_some() {
                inner_common.key = common.key;
            }
            if common.title.is_some() {
                inner_common.title = common.title;
            }
            if common.description.is_some() {
                inner_common.description = common.description;
            }
            return Ok(inner);
        }

        let mut options = Vec::with_capacity(remaining.len());
        for (i, branch) in remaining {
            let branch_path = format!("{path}/{field}/{i}");
            let branch_obj = branch
                .as_object()
                .ok_or_else(|| SchemaNormalizationError::NotAnObject {
                    path: branch_path.clone(),
                })?;
            let title = opt_str(branch_obj, "title", &branch_path)?;
            let key = match opt_str(branch_obj, "key", &branch_path)? {
                Some(key) => key,
                None => title.clone().unwrap_or_else(|| format!("option_{i}")),
            };
            options.push(CompoundOption {
                key,
                label: title,
                metadata: self.normalize_at(branch, &branch_path, depth + 1)?,
                default: branch_obj.get("default").cloned().unwrap_or_default(),
            });
        }

        finish_compound(common, options, path)
    }
}

fn finish_compound(
    common: CommonMetadata,
    options: Vec<CompoundOption>,
    path: &str,
) -> Result<ConfigMetadata> {
    if options.is_empty() {
        return Err(SchemaNormalizationError::EmptyCompound {
            path: display_path(path),
        });
    }
    for (i, option) in options.iter().enumerate() {
        if options[..i].iter().any(|o| o.key == option.key) {
            return Err(SchemaNormalizationError::DuplicateVariant {
                path: display_path(path),
                key: option.key.clone(),
            });
        }
    }
    Ok(ConfigMetadata::Compound(CompoundMetadata { common, options }))
}

fn string(obj: &JsonObject, common: CommonMetadata, path: &str) -> Result<ConfigMetadata> {
    let options = match first_of(obj, &["options", "enum"]) {
        None => None,
        Some((field, JsonValue::Array(items))) => Some(
            items
                .iter()
                .map(|item| item.as_str().map(str::to_owned))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid_field(path, field, "a list of strings"))?,
        ),
        Some((field, _)) => return Err(invalid_field(path, field, "a list of strings")),
    };
    let allow_freeform = opt_bool(obj, "allowFreeform", path)?.unwrap_or(options.is_none());

    if matches!(&options, Some(o) if o.is_empty()) && !allow_freeform {
        return Err(SchemaNormalizationError::EmptyOptions {
            path: display_path(path),
        });
    }

    Ok(ConfigMetadata::String(StringMetadata {
        common,
        options,
        allow_freeform,
    }))
}

fn number(
    obj: &JsonObject,
    common: CommonMetadata,
    path: &str,
    integer: bool,
) -> Result<ConfigMetadata> {
    let min = opt_f64(obj, &["min", "minimum"], path)?;
    let max = opt_f64(obj, &["max", "maximum"], path)?;
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(SchemaNormalizationError::InvalidBounds {
                path: display_path(path),
                min,
                max,
            });
        }
    }
    let is_integer = integer || opt_bool(obj, "isInteger", path)?.unwrap_or(false);

    Ok(ConfigMetadata::Number(NumberMetadata {
        common,
        min,
        max,
        is_integer,
    }))
}

/// Declared type and whether the type list admitted `null`
fn read_type(obj: &JsonObject, path: &str) -> Result<(Option<String>, bool)> {
    match obj.get("type") {
        None | Some(JsonValue::Null) => Ok((None, false)),
        Some(JsonValue::String(tag)) => Ok((Some(tag.clone()), false)),
        Some(JsonValue::Array(tags)) => {
            let tags = tags
                .iter()
                .map(JsonValue::as_str)
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid_field(path, "type", "a string or a list of strings"))?;
            let nullable = tags.contains(&"null");
            let rest: Vec<_> = tags.into_iter().filter(|t| *t != "null").collect();
            match rest.as_slice() {
                [single] => Ok((Some((*single).to_owned()), nullable)),
                _ => Err(SchemaNormalizationError::UnknownType {
                    path: display_path(path),
                    found: rest.join("|"),
                }),
            }
        }
        Some(_) => Err(invalid_field(path, "type", "a string or a list of strings")),
    }
}

fn read_common(obj: &JsonObject, path: &str) -> Result<CommonMetadata> {
    Ok(CommonMetadata {
        nullable: opt_bool(obj, "nullable", path)?.unwrap_or(false),
        key: opt_str(obj, "key", path)?,
        title: opt_str(obj, "title", path)?,
        description: opt_str(obj, "description", path)?,
    })
}

fn label_of(obj: &JsonObject, path: &str) -> Result<Option<String>> {
    match opt_str(obj, "label", path)? {
        Some(label) => Ok(Some(label)),
        None => opt_str(obj, "title", path),
    }
}

/// First present, non-null field among aliases
fn first_of<'v>(obj: &'v JsonObject, names: &[&'static str]) -> Option<(&'static str, &'v JsonValue)> {
    names.iter().find_map(|name| match obj.get(*name) {
        None | Some(JsonValue::Null) => None,
        Some(value) => Some((*name, value)),
    })
}

fn opt_str(obj: &JsonObject, field: &'static str, path: &str) -> Result<Option<String>> {
    match obj.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid_field(path, field, "a string")),
    }
}

fn opt_bool(obj: &JsonObject, field: &'static str, path: &str) -> Result<Option<bool>> {
    match obj.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(invalid_field(path, field, "a boolean")),
    }
}

fn opt_f64(obj: &JsonObject, names: &[&'static str], path: &str) -> Result<Option<f64>> {
    match first_of(obj, names) {
        None => Ok(None),
        Some((field, value)) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid_field(path, field, "a number")),
    }
}

fn opt_usize(obj: &JsonObject, field: &'static str, path: &str) -> Result<Option<usize>> {
    match obj.get(field) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid_field(path, field, "a non-negative integer")),
    }
}

fn invalid_field(path: &str, field: &str, expected: &'static str) -> SchemaNormalizationError {
    SchemaNormalizationError::InvalidField {
        path: display_path(path),
        field: field.to_owned(),
        expected,
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_owned()
    } else {
        path.to_owned()
    }
}
