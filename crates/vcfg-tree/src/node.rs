//! Enhanced value nodes
//!
//! An Enhanced tree mirrors a plain JSON value, but every node carries a
//! stable [`NodeId`] and the [`MetadataHash`] it was built against. Nodes
//! are immutable and shared through [`Arc`]; edits re-allocate only the
//! path from the edited node to the root.

use std::sync::Arc;

use im::Vector;
use indexmap::IndexMap;
use serde_json::{json, Map, Number, Value as JsonValue};
use vcfg_metadata::{MetadataHash, ShapeTag};

use crate::id::NodeId;
use crate::path::{NodePath, PathSegment};

/// Bookkeeping key carrying a node's id in UI output
pub const ID_KEY: &str = "__id";

/// Bookkeeping key carrying a node's metadata hash in UI output
pub const METADATA_KEY: &str = "__metadata";

/// Key holding a variant value that is not merged with the discriminator
///
/// Also the path segment that reaches a compound nested directly inside
/// another compound.
pub const VARIANT_VALUE_KEY: &str = "value";

/// One node of an Enhanced tree
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedNode {
    id: NodeId,
    metadata_hash: MetadataHash,
    value: NodeValue,
}

/// Payload of an [`EnhancedNode`]
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    String(String),
    Number(Number),
    Boolean(bool),
    /// Items share the array's item metadata
    Array(Vector<Arc<EnhancedNode>>),
    /// Entries in insertion order
    Object(IndexMap<String, ObjectEntry>),
    Compound(CompoundValue),
    /// A nullable node currently holding null
    Null,
}

/// Active variant of a compound node
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundValue {
    pub active_variant_key: String,
    /// `None` for a nullable compound holding null
    pub value: Option<Arc<EnhancedNode>>,
}

/// Field of an object node
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEntry {
    /// Field built against a schema
    Node(Arc<EnhancedNode>),
    /// Free-form field without a schema, kept verbatim
    Raw(JsonValue),
}

impl ObjectEntry {
    /// Node payload, if this entry is schema-backed
    #[inline]
    #[must_use]
    pub fn as_node(&self) -> Option<&Arc<EnhancedNode>> {
        match self {
            Self::Node(node) => Some(node),
            Self::Raw(_) => None,
        }
    }
}

impl NodeValue {
    /// Shape family, `None` for [`NodeValue::Null`]
    #[must_use]
    pub const fn shape(&self) -> Option<ShapeTag> {
        match self {
            Self::String(_) => Some(ShapeTag::String),
            Self::Number(_) => Some(ShapeTag::Number),
            Self::Boolean(_) => Some(ShapeTag::Boolean),
            Self::Array(_) => Some(ShapeTag::Array),
            Self::Object(_) => Some(ShapeTag::Object),
            Self::Compound(_) => Some(ShapeTag::Compound),
            Self::Null => None,
        }
    }

    /// Lowercase shape name used in error messages
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self.shape() {
            Some(shape) => shape.as_str(),
            None => "null",
        }
    }

    /// Leaf payload as JSON
    #[must_use]
    pub fn leaf_json(&self) -> Option<JsonValue> {
        match self {
            Self::String(s) => Some(JsonValue::String(s.clone())),
            Self::Number(n) => Some(JsonValue::Number(n.clone())),
            Self::Boolean(b) => Some(JsonValue::Bool(*b)),
            Self::Null => Some(JsonValue::Null),
            _ => None,
        }
    }
}

impl EnhancedNode {
    /// Create node with a fresh id
    #[inline]
    #[must_use]
    pub fn new(metadata_hash: MetadataHash, value: NodeValue) -> Self {
        Self::with_id(NodeId::new(), metadata_hash, value)
    }

    /// Create node with a given id
    #[inline]
    #[must_use]
    pub fn with_id(id: NodeId, metadata_hash: MetadataHash, value: NodeValue) -> Self {
        Self {
            id,
            metadata_hash,
            value,
        }
    }

    #[inline]
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn metadata_hash(&self) -> MetadataHash {
        self.metadata_hash
    }

    #[inline]
    #[must_use]
    pub fn value(&self) -> &NodeValue {
        &self.value
    }

    /// Copy of this node with a new payload; id and hash are kept
    #[must_use]
    pub fn with_value(&self, value: NodeValue) -> Self {
        Self::with_id(self.id, self.metadata_hash, value)
    }

    /// Direct child nodes, in order
    ///
    /// Raw object entries are not nodes and are skipped.
    #[must_use]
    pub fn child_nodes(&self) -> Vec<&Arc<EnhancedNode>> {
        match &self.value {
            NodeValue::Array(items) => items.iter().collect(),
            NodeValue::Object(entries) => entries.values().filter_map(ObjectEntry::as_node).collect(),
            NodeValue::Compound(compound) => compound.value.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// UI-facing rendering with `__id` and `__metadata` bookkeeping keys
    #[must_use]
    pub fn to_ui_json(&self) -> JsonValue {
        let mut out = Map::new();
        out.insert(ID_KEY.to_owned(), json!(self.id.to_string()));
        out.insert(METADATA_KEY.to_owned(), json!(self.metadata_hash.to_string()));
        match &self.value {
            NodeValue::Array(items) => {
                let items = items.iter().map(|item| item.to_ui_json()).collect();
                out.insert("value".to_owned(), JsonValue::Array(items));
            }
            NodeValue::Object(entries) => {
                for (key, entry) in entries {
                    let rendered = match entry {
                        ObjectEntry::Node(child) => child.to_ui_json(),
                        ObjectEntry::Raw(raw) => raw.clone(),
                    };
                    out.insert(key.clone(), rendered);
                }
            }
            NodeValue::Compound(compound) => {
                out.insert(
                    "activeVariantKey".to_owned(),
                    json!(compound.active_variant_key),
                );
                let value = compound
                    .value
                    .as_ref()
                    .map_or(JsonValue::Null, |child| child.to_ui_json());
                out.insert("value".to_owned(), value);
            }
            leaf => {
                out.insert("value".to_owned(), leaf.leaf_json().unwrap_or_default());
            }
        }
        JsonValue::Object(out)
    }

    #[inline]
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self.value, NodeValue::Compound(_))
    }
}

/// Path of a compound's active value
///
/// A compound nested directly in another sits under [`VARIANT_VALUE_KEY`];
/// any other value shares the compound's path.
pub(crate) fn variant_path(inner: &EnhancedNode, path: &NodePath) -> NodePath {
    if inner.is_compound() {
        path.child_key(VARIANT_VALUE_KEY)
    } else {
        path.clone()
    }
}

/// Target of a path lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolved<'a> {
    Node(&'a Arc<EnhancedNode>),
    /// Inside a free-form field
    Raw(&'a JsonValue),
}

/// Immutable Enhanced tree
///
/// Cloning is cheap; clones share every node.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedTree {
    root: Arc<EnhancedNode>,
}

impl EnhancedTree {
    #[inline]
    #[must_use]
    pub fn new(root: Arc<EnhancedNode>) -> Self {
        Self { root }
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Arc<EnhancedNode> {
        &self.root
    }

    /// Metadata hash of the root
    #[inline]
    #[must_use]
    pub fn metadata_hash(&self) -> MetadataHash {
        self.root.metadata_hash()
    }

    /// Check if both trees share the same root allocation
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// Look up the node or raw field at `path`
    ///
    /// A compound is entered before the next segment, but the final target
    /// is returned as-is. A compound whose active value is another compound
    /// is entered only by a [`VARIANT_VALUE_KEY`] segment.
    #[must_use]
    pub fn resolve(&self, path: &NodePath) -> Option<Resolved<'_>> {
        let mut current = Resolved::Node(&self.root);
        for segment in path.segments() {
            current = match current {
                Resolved::Node(node) => step(node, segment)?,
                Resolved::Raw(raw) => Resolved::Raw(step_raw(raw, segment)?),
            };
        }
        Some(current)
    }

    /// Look up a node at `path`, ignoring raw fields
    #[must_use]
    pub fn node_at(&self, path: &NodePath) -> Option<&Arc<EnhancedNode>> {
        match self.resolve(path)? {
            Resolved::Node(node) => Some(node),
            Resolved::Raw(_) => None,
        }
    }

    /// Find a node by id, returning its path
    #[must_use]
    pub fn find(&self, id: NodeId) -> Option<(NodePath, Arc<EnhancedNode>)> {
        let mut found = None;
        self.visit(|path, node| {
            if found.is_none() && node.id() == id {
                found = Some((path.clone(), Arc::clone(node)));
            }
        });
        found
    }

    /// Visit every node depth-first, parents before children
    ///
    /// The inner value of a compound is reported at the compound's path,
    /// unless it is itself a compound.
    pub fn visit<F>(&self, mut f: F)
    where
        F: FnMut(&NodePath, &Arc<EnhancedNode>),
    {
        visit_node(&self.root, &NodePath::root(), &mut f);
    }

    /// Total number of nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit(|_, _| count += 1);
        count
    }
}

fn step<'a>(node: &'a Arc<EnhancedNode>, segment: &PathSegment) -> Option<Resolved<'a>> {
    let node = match node.value() {
        NodeValue::Compound(compound) => {
            let inner = compound.value.as_ref()?;
            if inner.is_compound() {
                let nested = matches!(segment, PathSegment::Key(key) if key == VARIANT_VALUE_KEY);
                return nested.then_some(Resolved::Node(inner));
            }
            inner
        }
        _ => node,
    };
    match (node.value(), segment) {
        (NodeValue::Object(entries), PathSegment::Key(key)) => match entries.get(key)? {
            ObjectEntry::Node(child) => Some(Resolved::Node(child)),
            ObjectEntry::Raw(raw) => Some(Resolved::Raw(raw)),
        },
        (NodeValue::Array(items), PathSegment::Index(index)) => {
            items.get(*index).map(Resolved::Node)
        }
        _ => None,
    }
}

fn step_raw<'a>(raw: &'a JsonValue, segment: &PathSegment) -> Option<&'a JsonValue> {
    match (raw, segment) {
        (JsonValue::Object(map), PathSegment::Key(key)) => map.get(key),
        (JsonValue::Array(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    }
}

fn visit_node<F>(node: &Arc<EnhancedNode>, path: &NodePath, f: &mut F)
where
    F: FnMut(&NodePath, &Arc<EnhancedNode>),
{
    f(path, node);
    match node.value() {
        NodeValue::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                visit_node(item, &path.child_index(i), f);
            }
        }
        NodeValue::Object(entries) => {
            for (key, entry) in entries {
                if let ObjectEntry::Node(child) = entry {
                    visit_node(child, &path.child_key(key.as_str()), f);
                }
            }
        }
        NodeValue::Compound(CompoundValue {
            value: Some(inner), ..
        }) => visit_node(inner, &variant_path(inner, path), f),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcfg_metadata::ContentHash;

    fn hash(tag: &str) -> MetadataHash {
        ContentHash::compute(tag.as_bytes())
    }

    fn leaf(value: NodeValue) -> Arc<EnhancedNode> {
        Arc::new(EnhancedNode::new(hash("leaf"), value))
    }

    fn sample() -> EnhancedTree {
        let role = leaf(NodeValue::String("user".into()));
        let mut message = IndexMap::new();
        message.insert("role".to_owned(), ObjectEntry::Node(role));
        message.insert("extra".to_owned(), ObjectEntry::Raw(json!({"k": [1, 2]})));
        let message = Arc::new(EnhancedNode::new(hash("msg"), NodeValue::Object(message)));
        let tool = Arc::new(EnhancedNode::new(
            hash("tool"),
            NodeValue::Compound(CompoundValue {
                active_variant_key: "a".into(),
                value: Some(leaf(NodeValue::Number(5.into()))),
            }),
        ));

        let mut root = IndexMap::new();
        root.insert(
            "messages".to_owned(),
            ObjectEntry::Node(Arc::new(EnhancedNode::new(
                hash("list"),
                NodeValue::Array(Vector::unit(message)),
            ))),
        );
        root.insert("tool".to_owned(), ObjectEntry::Node(tool));
        EnhancedTree::new(Arc::new(EnhancedNode::new(hash("root"), NodeValue::Object(root))))
    }

    #[test]
    fn resolve_nodes_and_raw_fields() {
        let tree = sample();
        let role = tree.node_at(&"messages[0].role".parse().unwrap()).unwrap();
        assert_eq!(role.value(), &NodeValue::String("user".into()));

        let raw = tree.resolve(&"messages[0].extra.k[1]".parse().unwrap());
        assert_eq!(raw, Some(Resolved::Raw(&json!(2))));

        assert!(tree.resolve(&"messages[1]".parse().unwrap()).is_none());
        assert!(tree.resolve(&"messages.role".parse().unwrap()).is_none());
    }

    #[test]
    fn resolve_stops_at_compound_target() {
        let tree = sample();
        let tool = tree.node_at(&NodePath::key("tool")).unwrap();
        assert!(matches!(tool.value(), NodeValue::Compound(_)));
    }

    #[test]
    fn nested_compound_is_entered_by_value_key() {
        let mut fields = IndexMap::new();
        fields.insert("b".to_owned(), ObjectEntry::Node(leaf(NodeValue::Number(3.into()))));
        let object = Arc::new(EnhancedNode::new(hash("q"), NodeValue::Object(fields)));
        let inner = Arc::new(EnhancedNode::new(
            hash("inner"),
            NodeValue::Compound(CompoundValue {
                active_variant_key: "q".into(),
                value: Some(object),
            }),
        ));
        let tree = EnhancedTree::new(Arc::new(EnhancedNode::new(
            hash("outer"),
            NodeValue::Compound(CompoundValue {
                active_variant_key: "outer".into(),
                value: Some(Arc::clone(&inner)),
            }),
        )));

        let nested = tree.node_at(&NodePath::key(VARIANT_VALUE_KEY)).unwrap();
        assert!(Arc::ptr_eq(nested, &inner));
        assert!(tree.node_at(&NodePath::key("b")).is_none());
        let b = tree.node_at(&"value.b".parse().unwrap()).unwrap();
        assert_eq!(tree.find(b.id()).unwrap().0.to_string(), "value.b");
        assert_eq!(tree.find(inner.id()).unwrap().0, NodePath::key("value"));
    }

    #[test]
    fn find_and_count() {
        let tree = sample();
        let role = tree.node_at(&"messages[0].role".parse().unwrap()).unwrap();
        let (path, found) = tree.find(role.id()).unwrap();
        assert_eq!(path.to_string(), "messages[0].role");
        assert!(Arc::ptr_eq(&found, role));
        // root, messages, message, role, tool, tool value
        assert_eq!(tree.node_count(), 6);
        assert!(tree.find(NodeId::new()).is_none());
    }

    #[test]
    fn ui_json_carries_bookkeeping() {
        let tree = sample();
        let ui = tree.root().to_ui_json();
        assert_eq!(ui[ID_KEY], json!(tree.root().id().to_string()));
        assert_eq!(ui["tool"]["activeVariantKey"], json!("a"));
        assert_eq!(ui["tool"]["value"]["value"], json!(5));
        assert_eq!(ui["messages"]["value"][0]["extra"], json!({"k": [1, 2]}));
    }

    #[test]
    fn with_value_keeps_identity() {
        let node = EnhancedNode::new(hash("leaf"), NodeValue::Boolean(false));
        let updated = node.with_value(NodeValue::Boolean(true));
        assert_eq!(updated.id(), node.id());
        assert_eq!(updated.metadata_hash(), node.metadata_hash());
        assert_eq!(updated.value().type_name(), "boolean");
        assert_eq!(NodeValue::Null.type_name(), "null");
    }
}
