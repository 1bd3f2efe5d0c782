//! Enhanced tree construction
//!
//! Materializes a plain JSON value against registered metadata. Missing
//! parts are default-filled; wrong-typed parts are replaced by defaults and
//! annotated. Only an unknown metadata hash is an error.

use std::borrow::Cow;
use std::sync::Arc;

use im::Vector;
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};
use vcfg_metadata::{
    is_bookkeeping_key, ArrayMetadata, BooleanMetadata, CompoundMetadata, CompoundOption,
    ConfigMetadata, MetadataHash, MetadataNotFoundError, MetadataRegistry, NumberMetadata,
    ObjectMetadata, ShapeTag,
};

use crate::annotation::{Annotation, AnnotationKind};
use crate::node::{CompoundValue, EnhancedNode, NodeValue, ObjectEntry, VARIANT_VALUE_KEY};
use crate::path::NodePath;

type Result<T> = std::result::Result<T, MetadataNotFoundError>;

/// Builds nodes against one registry, collecting repair annotations
pub(crate) struct Builder<'a> {
    registry: &'a MetadataRegistry,
    discriminator: &'a str,
    annotations: Vec<Annotation>,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(registry: &'a MetadataRegistry, discriminator: &'a str) -> Self {
        Self {
            registry,
            discriminator,
            annotations: Vec::new(),
        }
    }

    /// Repairs made so far, in build order
    pub(crate) fn into_annotations(self) -> Vec<Annotation> {
        self.annotations
    }

    /// Build a node for `hash` from optional input
    ///
    /// `null` input is treated like absent input.
    pub(crate) fn build(
        &mut self,
        hash: MetadataHash,
        input: Option<&JsonValue>,
        path: &NodePath,
    ) -> Result<Arc<EnhancedNode>> {
        let metadata = self.registry.get(&hash)?;
        let input = input.filter(|v| !v.is_null());

        let value = match (&*metadata, input) {
            (ConfigMetadata::Compound(m), None) if m.common.nullable => {
                NodeValue::Compound(CompoundValue {
                    active_variant_key: first_key(m),
                    value: None,
                })
            }
            (m, None) if m.is_nullable() => NodeValue::Null,
            (ConfigMetadata::String(_), input) => self.string(input, path),
            (ConfigMetadata::Number(m), input) => self.number(m, input, path),
            (ConfigMetadata::Boolean(m), input) => self.boolean(m, input, path),
            (ConfigMetadata::Array(m), input) => self.array(m, input, path)?,
            (ConfigMetadata::Object(m), input) => self.object(m, input, path)?,
            (ConfigMetadata::Compound(m), input) => self.compound(hash, m, input, path)?,
        };

        Ok(Arc::new(EnhancedNode::new(hash, value)))
    }

    fn coerced(&mut self, path: &NodePath, expected: &str, found: &JsonValue) {
        self.annotations.push(Annotation::new(
            path.clone(),
            AnnotationKind::Coerced {
                expected: expected.to_owned(),
                found: json_type_name(found).to_owned(),
            },
        ));
    }

    fn string(&mut self, input: Option<&JsonValue>, path: &NodePath) -> NodeValue {
        match input {
            Some(JsonValue::String(s)) => NodeValue::String(s.clone()),
            Some(other) => {
                self.coerced(path, "string", other);
                NodeValue::String(String::new())
            }
            None => NodeValue::String(String::new()),
        }
    }

    fn number(&mut self, m: &NumberMetadata, input: Option<&JsonValue>, path: &NodePath) -> NodeValue {
        match input {
            Some(JsonValue::Number(n)) if !m.is_integer || is_integral(n) => {
                NodeValue::Number(n.clone())
            }
            Some(other) => {
                let expected = if m.is_integer { "integer" } else { "number" };
                self.coerced(path, expected, other);
                NodeValue::Number(default_number(m))
            }
            None => NodeValue::Number(default_number(m)),
        }
    }

    fn boolean(&mut self, m: &BooleanMetadata, input: Option<&JsonValue>, path: &NodePath) -> NodeValue {
        match input {
            Some(JsonValue::Bool(b)) => NodeValue::Boolean(*b),
            Some(other) => {
                self.coerced(path, "boolean", other);
                NodeValue::Boolean(m.default.unwrap_or(false))
            }
            None => NodeValue::Boolean(m.default.unwrap_or(false)),
        }
    }

    fn array(
        &mut self,
        m: &ArrayMetadata,
        input: Option<&JsonValue>,
        path: &NodePath,
    ) -> Result<NodeValue> {
        let mut items = Vector::new();
        match input {
            Some(JsonValue::Array(values)) => {
                for (i, value) in values.iter().enumerate() {
                    items.push_back(self.build(m.item_metadata, Some(value), &path.child_index(i))?);
                }
            }
            Some(other) => self.coerced(path, "array", other),
            None => {}
        }
        Ok(NodeValue::Array(items))
    }

    fn object(
        &mut self,
        m: &ObjectMetadata,
        input: Option<&JsonValue>,
        path: &NodePath,
    ) -> Result<NodeValue> {
        let fields = match input {
            Some(JsonValue::Object(map)) => Some(map),
            Some(other) => {
                self.coerced(path, "object", other);
                None
            }
            None => None,
        };

        let mut entries = IndexMap::with_capacity(m.properties.len());
        for (key, child) in &m.properties {
            let value = fields.and_then(|map| map.get(key));
            let node = self.build(*child, value, &path.child_key(key.as_str()))?;
            entries.insert(key.clone(), ObjectEntry::Node(node));
        }

        for (key, value) in fields.into_iter().flatten() {
            if m.declares(key) || is_bookkeeping_key(key) {
                continue;
            }
            if !m.additional_properties {
                self.annotations.push(Annotation::new(
                    path.clone(),
                    AnnotationKind::DroppedKey { key: key.clone() },
                ));
                continue;
            }
            let entry = match m.additional_metadata {
                Some(hash) => {
                    ObjectEntry::Node(self.build(hash, Some(value), &path.child_key(key.as_str()))?)
                }
                None => ObjectEntry::Raw(strip_bookkeeping(value)),
            };
            entries.insert(key.clone(), entry);
        }

        Ok(NodeValue::Object(entries))
    }

    fn compound(
        &mut self,
        hash: MetadataHash,
        m: &CompoundMetadata,
        input: Option<&JsonValue>,
        path: &NodePath,
    ) -> Result<NodeValue> {
        let selection = select_variant(self.registry, m, input, self.discriminator)?;
        let option = selection
            .option
            .ok_or(MetadataNotFoundError::Hash(hash))?;
        if let Some(key) = selection.unknown {
            self.annotations.push(Annotation::new(
                path.clone(),
                AnnotationKind::UnknownVariant { key },
            ));
        }
        if selection.unmatched {
            if let Some(found) = input {
                self.coerced(path, "compound", found);
            }
        }

        let value = self.build_variant(option, selection.input.as_deref(), path)?;
        Ok(NodeValue::Compound(CompoundValue {
            active_variant_key: option.key.clone(),
            value: Some(value),
        }))
    }

    /// Build a variant's value, falling back to its default template
    pub(crate) fn build_variant(
        &mut self,
        option: &CompoundOption,
        input: Option<&JsonValue>,
        path: &NodePath,
    ) -> Result<Arc<EnhancedNode>> {
        let input = input.or(Some(&option.default));
        self.build(option.metadata, input, path)
    }
}

/// Variant chosen for a compound input
#[derive(Debug)]
pub(crate) struct Selection<'m, 'v> {
    /// `None` only for a compound without options
    pub(crate) option: Option<&'m CompoundOption>,
    /// Input for the variant, discriminator stripped; `None` uses the template
    pub(crate) input: Option<Cow<'v, JsonValue>>,
    /// Discriminator that named no variant
    pub(crate) unknown: Option<String>,
    /// Input matched no variant's shape
    pub(crate) unmatched: bool,
}

/// Pick the variant for a compound input
///
/// The discriminator field names the variant when present. Otherwise the
/// first variant whose shape fits the input wins, falling back to the
/// first variant.
pub(crate) fn select_variant<'m, 'v>(
    registry: &MetadataRegistry,
    m: &'m CompoundMetadata,
    input: Option<&'v JsonValue>,
    discriminator: &str,
) -> Result<Selection<'m, 'v>> {
    let first = Selection {
        option: m.first(),
        input: None,
        unknown: None,
        unmatched: false,
    };
    let Some(input) = input.filter(|v| !v.is_null()) else {
        return Ok(first);
    };

    if let Some(tag) = input.get(discriminator) {
        let Some(option) = tag.as_str().and_then(|key| m.option(key)) else {
            let key = tag.as_str().map_or_else(|| tag.to_string(), str::to_owned);
            return Ok(Selection {
                unknown: Some(key),
                ..first
            });
        };
        let variant_input = strip_discriminator(registry, option, input, discriminator)?;
        return Ok(Selection {
            option: Some(option),
            input: variant_input,
            unknown: None,
            unmatched: false,
        });
    }

    for option in &m.options {
        if shape_fits(registry.get(&option.metadata)?.shape(), input) {
            return Ok(Selection {
                option: Some(option),
                input: Some(Cow::Borrowed(input)),
                unknown: None,
                unmatched: false,
            });
        }
    }
    Ok(Selection {
        unmatched: true,
        ..first
    })
}

/// Remove the discriminator, unwrapping `{type, value}` for non-object variants
fn strip_discriminator<'v>(
    registry: &MetadataRegistry,
    option: &CompoundOption,
    input: &'v JsonValue,
    discriminator: &str,
) -> Result<Option<Cow<'v, JsonValue>>> {
    let Some(map) = input.as_object() else {
        return Ok(Some(Cow::Borrowed(input)));
    };
    if !is_object_variant(registry, option)? {
        return Ok(map.get(VARIANT_VALUE_KEY).map(Cow::Borrowed));
    }

    let rest: Map<String, JsonValue> = map
        .iter()
        .filter(|(key, _)| key.as_str() != discriminator)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    if rest.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Cow::Owned(JsonValue::Object(rest))))
    }
}

/// Copy of a free-form value without bookkeeping keys, at any depth
pub(crate) fn strip_bookkeeping(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .filter(|(key, _)| !is_bookkeeping_key(key))
                .map(|(key, value)| (key.clone(), strip_bookkeeping(value)))
                .collect(),
        ),
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(strip_bookkeeping).collect()),
        other => other.clone(),
    }
}

/// Whether a variant's fields merge with the discriminator
pub(crate) fn is_object_variant(
    registry: &MetadataRegistry,
    option: &CompoundOption,
) -> Result<bool> {
    Ok(registry.get(&option.metadata)?.shape() == ShapeTag::Object)
}

fn shape_fits(shape: ShapeTag, input: &JsonValue) -> bool {
    matches!(
        (shape, input),
        (ShapeTag::String, JsonValue::String(_))
            | (ShapeTag::Number, JsonValue::Number(_))
            | (ShapeTag::Boolean, JsonValue::Bool(_))
            | (ShapeTag::Array, JsonValue::Array(_))
            | (ShapeTag::Object, JsonValue::Object(_))
    )
}

fn first_key(m: &CompoundMetadata) -> String {
    m.first().map(|o| o.key.clone()).unwrap_or_default()
}

/// Zero, clamped into the declared bounds
pub(crate) fn default_number(m: &NumberMetadata) -> Number {
    let mut value = 0.0_f64;
    if let Some(min) = m.min {
        if value < min {
            value = if m.is_integer { min.ceil() } else { min };
        }
    }
    if let Some(max) = m.max {
        if value > max {
            value = if m.is_integer { max.floor() } else { max };
        }
    }
    number_from_f64(value)
}

/// Integral values become integer JSON numbers
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn number_from_f64(value: f64) -> Number {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Number::from(value as i64)
    } else {
        Number::from_f64(value).unwrap_or_else(|| Number::from(0))
    }
}

pub(crate) fn is_integral(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_node;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use vcfg_metadata::SchemaNormalizer;

    fn build(schema: JsonValue, input: Option<JsonValue>) -> (JsonValue, Vec<Annotation>) {
        let registry = MetadataRegistry::new();
        let hash = SchemaNormalizer::new(&registry).normalize(&schema).unwrap().hash;
        let mut builder = Builder::new(&registry, "type");
        let node = builder.build(hash, input.as_ref(), &NodePath::root()).unwrap();
        let extracted = extract_node(&registry, &node, "type", &NodePath::root()).unwrap();
        (extracted, builder.into_annotations())
    }

    #[test]
    fn leaf_defaults() {
        assert_eq!(build(json!({"type": "string"}), None).0, json!(""));
        assert_eq!(build(json!({"type": "number"}), None).0, json!(0));
        assert_eq!(build(json!({"type": "boolean"}), None).0, json!(false));
        assert_eq!(
            build(json!({"type": "boolean", "default": true}), None).0,
            json!(true)
        );
        assert_eq!(
            build(json!({"type": "string", "nullable": true}), None).0,
            JsonValue::Null
        );
    }

    #[test]
    fn number_default_is_clamped() {
        assert_eq!(
            build(json!({"type": "number", "min": 0.5, "max": 2}), None).0,
            json!(0.5)
        );
        assert_eq!(
            build(json!({"type": "integer", "min": 1.5}), None).0,
            json!(2)
        );
        assert_eq!(
            build(json!({"type": "number", "max": -3}), None).0,
            json!(-3)
        );
    }

    #[test]
    fn wrong_type_is_coerced_and_annotated() {
        let (value, annotations) = build(json!({"type": "number"}), Some(json!("high")));
        assert_eq!(value, json!(0));
        assert_eq!(
            annotations,
            vec![Annotation::new(
                NodePath::root(),
                AnnotationKind::Coerced {
                    expected: "number".into(),
                    found: "string".into()
                }
            )]
        );

        let (value, annotations) = build(json!({"type": "integer"}), Some(json!(2.5)));
        assert_eq!(value, json!(0));
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn non_array_input_yields_empty_array() {
        let schema = json!({"type": "array", "itemMetadata": {"type": "string"}});
        let (value, annotations) = build(schema, Some(json!({"a": 1})));
        assert_eq!(value, json!([]));
        assert_eq!(annotations.len(), 1);
    }

    #[test]
    fn closed_object_drops_undeclared_keys() {
        let schema = json!({"type": "object", "properties": {"role": {"type": "string"}}});
        let (value, annotations) = build(
            schema,
            Some(json!({"role": "user", "kind": "x", "__id": "abc"})),
        );
        assert_eq!(value, json!({"role": "user"}));
        assert_eq!(
            annotations,
            vec![Annotation::new(
                NodePath::root(),
                AnnotationKind::DroppedKey { key: "kind".into() }
            )]
        );
    }

    #[test]
    fn open_object_keeps_free_form_keys() {
        let raw = json!({
            "type": "object",
            "properties": {"model": {"type": "string"}},
            "additionalProperties": true
        });
        let (value, annotations) = build(raw.clone(), Some(json!({"seed": [1, 2], "model": "m"})));
        assert_eq!(value, json!({"model": "m", "seed": [1, 2]}));
        assert!(annotations.is_empty());

        let (value, _) = build(
            raw,
            Some(json!({"extra": {"a": {"__id": 1, "b": [{"__metadata": "x", "c": 2}]}}})),
        );
        assert_eq!(value, json!({"model": "", "extra": {"a": {"b": [{"c": 2}]}}}));

        let typed = json!({
            "type": "object",
            "additionalProperties": {"type": "number"}
        });
        let (value, annotations) = build(typed, Some(json!({"top_k": "many"})));
        assert_eq!(value, json!({"top_k": 0}));
        assert_eq!(annotations[0].path.to_string(), "top_k");
    }

    fn tool_schema() -> JsonValue {
        json!({
            "type": "compound",
            "options": [
                {"key": "search", "metadata": {
                    "type": "object",
                    "properties": {"query": {"type": "string"}}
                }, "default": {"query": "rust"}},
                {"key": "limit", "metadata": {"type": "number"}}
            ]
        })
    }

    #[test]
    fn compound_defaults_to_first_template() {
        let (value, annotations) = build(tool_schema(), None);
        assert_eq!(value, json!({"type": "search", "query": "rust"}));
        assert!(annotations.is_empty());
    }

    #[test]
    fn compound_selects_by_discriminator() {
        let (value, _) = build(tool_schema(), Some(json!({"type": "limit", "value": 3})));
        assert_eq!(value, json!({"type": "limit", "value": 3}));

        let (value, _) = build(tool_schema(), Some(json!({"type": "search", "query": "q"})));
        assert_eq!(value, json!({"type": "search", "query": "q"}));
    }

    #[test]
    fn compound_selects_by_shape_without_discriminator() {
        let (value, annotations) = build(tool_schema(), Some(json!(7)));
        assert_eq!(value, json!({"type": "limit", "value": 7}));
        assert!(annotations.is_empty());
    }

    #[test]
    fn unknown_variant_is_annotated() {
        let (value, annotations) = build(tool_schema(), Some(json!({"type": "browse"})));
        assert_eq!(value, json!({"type": "search", "query": "rust"}));
        assert_eq!(
            annotations[0].kind,
            AnnotationKind::UnknownVariant { key: "browse".into() }
        );
    }

    #[test]
    fn nested_compound_round_trips() {
        let schema = json!({
            "type": "compound",
            "options": {
                "outer": {"type": "compound", "options": {
                    "p": {"type": "object", "properties": {"a": {"type": "string"}}},
                    "q": {"type": "object", "properties": {"b": {"type": "number"}}}
                }},
                "plain": {"type": "boolean"}
            }
        });
        let input = json!({"type": "outer", "value": {"type": "q", "b": 3}});
        let (value, annotations) = build(schema.clone(), Some(input.clone()));
        assert_eq!(value, input);
        assert!(annotations.is_empty());

        let (value, _) = build(schema, None);
        assert_eq!(value, json!({"type": "outer", "value": {"type": "p", "a": ""}}));
    }

    #[test]
    fn nullable_compound_holds_no_value() {
        let mut schema = tool_schema();
        schema["nullable"] = json!(true);
        assert_eq!(build(schema, None).0, JsonValue::Null);
    }

    #[test]
    fn unknown_hash_is_error() {
        let registry = MetadataRegistry::new();
        let mut builder = Builder::new(&registry, "type");
        let hash = vcfg_metadata::ContentHash::compute(b"nothing");
        assert!(builder.build(hash, None, &NodePath::root()).is_err());
    }

    #[test]
    fn number_conversion() {
        assert_eq!(number_from_f64(2.0), Number::from(2));
        assert_eq!(number_from_f64(0.25).as_f64(), Some(0.25));
        assert!(is_integral(&Number::from(4)));
        assert!(is_integral(&Number::from_f64(4.0).unwrap()));
        assert!(!is_integral(&Number::from_f64(4.5).unwrap()));
    }
}
