//! Canonical configuration metadata
//!
//! [`ConfigMetadata`] is the closed set of shapes a configurable field can
//! take. Child schemas are referenced by [`MetadataHash`], so every node is
//! interned exactly once in the [`MetadataRegistry`](crate::MetadataRegistry).

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::hash::{ContentHash, HashError, MetadataHash};

/// Prefix reserved for bookkeeping keys (`__id`, `__metadata`, ...).
pub const BOOKKEEPING_PREFIX: &str = "__";

/// Returns true when `key` is reserved for bookkeeping.
#[inline]
#[must_use]
pub fn is_bookkeeping_key(key: &str) -> bool {
    key.starts_with(BOOKKEEPING_PREFIX)
}

/// Shape family of a metadata node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeTag {
    String,
    Number,
    Boolean,
    Array,
    Object,
    Compound,
}

impl ShapeTag {
    /// Lowercase tag as used in schemas
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Compound => "compound",
        }
    }

    /// Leaf shapes hold a primitive value
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::String | Self::Number | Self::Boolean)
    }
}

impl Display for ShapeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every metadata variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonMetadata {
    /// Whether `null` is an accepted value
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,

    /// Display key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Free text or enumerated choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,

    /// Enumerated choices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    /// Accept values outside `options`
    pub allow_freeform: bool,
}

impl StringMetadata {
    /// Check a value against the declared choices
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        match &self.options {
            Some(options) if !self.allow_freeform => options.iter().any(|o| o == value),
            _ => true,
        }
    }
}

/// Numeric field with optional bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_integer: bool,
}

impl NumberMetadata {
    /// Whether `value` lies within `[min, max]`
    #[must_use]
    pub fn in_range(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Boolean toggle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// Homogeneous list; every element shares `item_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,

    pub item_metadata: MetadataHash,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

/// Record with declared properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,

    /// Declared properties in declaration order
    #[serde(default)]
    pub properties: IndexMap<String, MetadataHash>,

    /// Free-form keys are accepted
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub additional_properties: bool,

    /// Schema for free-form values; raw JSON when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_metadata: Option<MetadataHash>,
}

impl ObjectMetadata {
    /// Whether `key` is declared by the schema
    #[inline]
    #[must_use]
    pub fn declares(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }
}

/// One named alternative of a compound field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundOption {
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub metadata: MetadataHash,

    /// Value template used when the variant is selected without input
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub default: JsonValue,
}

/// Closed set of named variants, exactly one active at a time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompoundMetadata {
    #[serde(flatten)]
    pub common: CommonMetadata,

    /// Never empty once normalized
    pub options: Vec<CompoundOption>,
}

impl CompoundMetadata {
    /// Find a variant by key
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&CompoundOption> {
        self.options.iter().find(|o| o.key == key)
    }

    /// Variant selected when nothing else applies
    #[must_use]
    pub fn first(&self) -> Option<&CompoundOption> {
        self.options.first()
    }
}

/// Normalized description of a configuration field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigMetadata {
    String(StringMetadata),
    Number(NumberMetadata),
    Boolean(BooleanMetadata),
    Array(ArrayMetadata),
    Object(ObjectMetadata),
    Compound(CompoundMetadata),
}

impl ConfigMetadata {
    /// Shape family
    #[must_use]
    pub const fn shape(&self) -> ShapeTag {
        match self {
            Self::String(_) => ShapeTag::String,
            Self::Number(_) => ShapeTag::Number,
            Self::Boolean(_) => ShapeTag::Boolean,
            Self::Array(_) => ShapeTag::Array,
            Self::Object(_) => ShapeTag::Object,
            Self::Compound(_) => ShapeTag::Compound,
        }
    }

    /// Shared fields
    #[must_use]
    pub const fn common(&self) -> &CommonMetadata {
        match self {
            Self::String(m) => &m.common,
            Self::Number(m) => &m.common,
            Self::Boolean(m) => &m.common,
            Self::Array(m) => &m.common,
            Self::Object(m) => &m.common,
            Self::Compound(m) => &m.common,
        }
    }

    pub(crate) fn common_mut(&mut self) -> &mut CommonMetadata {
        match self {
            Self::String(m) => &mut m.common,
            Self::Number(m) => &mut m.common,
            Self::Boolean(m) => &mut m.common,
            Self::Array(m) => &mut m.common,
            Self::Object(m) => &mut m.common,
            Self::Compound(m) => &mut m.common,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.common().nullable
    }

    /// Hashes of directly referenced child nodes
    #[must_use]
    pub fn children(&self) -> Vec<MetadataHash> {
        match self {
            Self::String(_) | Self::Number(_) | Self::Boolean(_) => Vec::new(),
            Self::Array(m) => vec![m.item_metadata],
            Self::Object(m) => m
                .properties
                .values()
                .copied()
                .chain(m.additional_metadata)
                .collect(),
            Self::Compound(m) => m.options.iter().map(|o| o.metadata).collect(),
        }
    }

    /// Content hash of the canonical serialization
    ///
    /// # Errors
    /// Returns error if the node cannot be serialized to JSON
    pub fn content_hash(&self) -> Result<MetadataHash, HashError> {
        ContentHash::compute_serializable(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn number(min: Option<f64>, max: Option<f64>) -> ConfigMetadata {
        ConfigMetadata::Number(NumberMetadata {
            common: CommonMetadata::default(),
            min,
            max,
            is_integer: false,
        })
    }

    #[test]
    fn serializes_with_type_tag() {
        let value = serde_json::to_value(number(Some(0.0), Some(2.0))).unwrap();
        assert_eq!(value, json!({"type": "number", "min": 0.0, "max": 2.0}));
    }

    #[test]
    fn deserializes_round_trip() {
        let meta = ConfigMetadata::String(StringMetadata {
            common: CommonMetadata {
                nullable: true,
                key: Some("role".into()),
                ..CommonMetadata::default()
            },
            options: Some(vec!["user".into(), "assistant".into()]),
            allow_freeform: false,
        });
        let encoded = serde_json::to_string(&meta).unwrap();
        let decoded: ConfigMetadata = serde_json::from_str(&encoded).unwrap();
        assert_eq!(meta, decoded);
    }

    #[test]
    fn content_hash_distinguishes_constraints() {
        let a = number(Some(0.0), Some(2.0)).content_hash().unwrap();
        let b = number(Some(0.0), Some(1.0)).content_hash().unwrap();
        assert_ne!(a, b);
        assert_eq!(a, number(Some(0.0), Some(2.0)).content_hash().unwrap());
    }

    #[test]
    fn string_accepts_respects_freeform() {
        let mut meta = StringMetadata {
            common: CommonMetadata::default(),
            options: Some(vec!["a".into()]),
            allow_freeform: false,
        };
        assert!(meta.accepts("a"));
        assert!(!meta.accepts("b"));
        meta.allow_freeform = true;
        assert!(meta.accepts("b"));
    }

    #[test]
    fn number_range() {
        let ConfigMetadata::Number(meta) = number(Some(0.0), Some(2.0)) else {
            unreachable!()
        };
        assert!(meta.in_range(0.7));
        assert!(!meta.in_range(2.5));
        assert!(!meta.in_range(-0.1));
    }

    #[test]
    fn bookkeeping_prefix() {
        assert!(is_bookkeeping_key("__id"));
        assert!(!is_bookkeeping_key("_private"));
        assert!(!is_bookkeeping_key("temperature"));
    }
}
