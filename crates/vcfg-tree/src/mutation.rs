//! Structural edits on Enhanced trees
//!
//! Provides [`TreeDraft`], a working copy that applies edits copy-on-write:
//! the edited node and its ancestors are re-allocated, every other subtree
//! keeps its `Arc`. Ids and metadata hashes survive every edit that keeps a
//! node's shape.
//!
//! # Field carryover
//! Switching a compound variant rebuilds its value from the new variant's
//! template. With carryover enabled, fields of the old value are kept when
//! both variants are objects and a field with the same key has:
//! - the same metadata hash: the whole subtree is kept, ids included
//! - a leaf of the same shape on both sides: the value is copied into the
//!   new node, if it is valid there
//!
//! Leaf variants carry their value under the same leaf rule.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use vcfg_metadata::{
    is_bookkeeping_key, ConfigMetadata, MetadataHash, MetadataNotFoundError, MetadataRegistry,
};

use crate::annotation::Annotation;
use crate::builder::{is_integral, json_type_name, strip_bookkeeping, Builder};
use crate::config::TransformerConfig;
use crate::error::TreeError;
use crate::id::NodeId;
use crate::node::{
    CompoundValue, EnhancedNode, EnhancedTree, NodeValue, ObjectEntry, Resolved, VARIANT_VALUE_KEY,
};
use crate::path::{NodePath, PathSegment};

type Result<T> = std::result::Result<T, TreeError>;

/// Working copy of a tree under edit
///
/// Obtained from [`Transformer::edit`](crate::Transformer::edit). Every
/// operation either applies fully or leaves the draft unchanged.
#[derive(Debug)]
pub struct TreeDraft<'t> {
    registry: &'t MetadataRegistry,
    config: &'t TransformerConfig,
    root: Arc<EnhancedNode>,
}

impl<'t> TreeDraft<'t> {
    pub(crate) fn new(
        registry: &'t MetadataRegistry,
        config: &'t TransformerConfig,
        tree: &EnhancedTree,
    ) -> Self {
        Self {
            registry,
            config,
            root: Arc::clone(tree.root()),
        }
    }

    /// Current state of the draft
    #[must_use]
    pub fn tree(&self) -> EnhancedTree {
        EnhancedTree::new(Arc::clone(&self.root))
    }

    #[must_use]
    pub fn into_tree(self) -> EnhancedTree {
        EnhancedTree::new(self.root)
    }

    fn apply<F>(
        &mut self,
        path: &NodePath,
        target: &[PathSegment],
        unwrap_last: bool,
        mut edit: F,
    ) -> Result<()>
    where
        F: FnMut(&Arc<EnhancedNode>) -> Result<Option<EnhancedNode>>,
    {
        if let Some(root) = rewrite_at(&self.root, target, path, unwrap_last, &mut edit)? {
            self.root = root;
        }
        Ok(())
    }

    /// Replace a leaf value
    ///
    /// `null` is accepted on nullable nodes, including containers, which
    /// then hold null. Inside free-form fields any JSON is accepted.
    ///
    /// # Errors
    /// - [`TreeError::TypeMismatch`] if the value disagrees with the leaf's metadata
    /// - [`TreeError::PathNotFound`] if `path` does not resolve
    pub fn set_leaf_value(&mut self, path: &NodePath, value: JsonValue) -> Result<()> {
        match self.tree().resolve(path) {
            None => Err(TreeError::PathNotFound(path.clone())),
            Some(Resolved::Raw(_)) => self.set_raw(path, value),
            Some(Resolved::Node(_)) => {
                let registry = self.registry;
                self.apply(path, path.segments(), false, |node| {
                    let metadata = registry.get(&node.metadata_hash())?;
                    let next = leaf_value_for(&metadata, node.value(), &value, path)?;
                    if *node.value() == next {
                        return Ok(None);
                    }
                    tracing::trace!(path = %path, "set leaf value");
                    Ok(Some(node.with_value(next)))
                })
            }
        }
    }

    fn set_raw(&mut self, path: &NodePath, value: JsonValue) -> Result<()> {
        let value = strip_bookkeeping(&value);
        let segments = path.segments();
        let tree = self.tree();
        let owner = (0..segments.len())
            .rev()
            .find(|k| {
                matches!(
                    tree.resolve(&NodePath::new(segments[..*k].to_vec())),
                    Some(Resolved::Node(_))
                )
            })
            .ok_or_else(|| TreeError::PathNotFound(path.clone()))?;
        let PathSegment::Key(field) = &segments[owner] else {
            return Err(TreeError::PathNotFound(path.clone()));
        };
        let inner = &segments[owner + 1..];

        self.apply(path, &segments[..owner], true, |node| {
            let NodeValue::Object(entries) = node.value() else {
                return Err(TreeError::PathNotFound(path.clone()));
            };
            let Some(ObjectEntry::Raw(raw)) = entries.get(field) else {
                return Err(TreeError::PathNotFound(path.clone()));
            };
            let mut raw = raw.clone();
            let slot = raw_slot(&mut raw, inner).ok_or_else(|| TreeError::PathNotFound(path.clone()))?;
            if *slot == value {
                return Ok(None);
            }
            *slot = value.clone();
            let mut entries = entries.clone();
            entries.insert(field.clone(), ObjectEntry::Raw(raw));
            Ok(Some(node.with_value(NodeValue::Object(entries))))
        })
    }

    /// Rename a free-form key, keeping the child and its position
    ///
    /// # Errors
    /// - [`TreeError::KeyNotRenamable`] if `old` is a schema property or the
    ///   object forbids additional properties
    /// - [`TreeError::KeyConflict`] if `new` is taken, declared or reserved
    /// - [`TreeError::PathNotFound`] if the object or `old` does not exist
    pub fn rename_object_key(&mut self, path: &NodePath, old: &str, new: &str) -> Result<()> {
        let registry = self.registry;
        self.apply(path, path.segments(), true, |node| {
            let NodeValue::Object(entries) = node.value() else {
                return Err(TreeError::mismatch(path, "object", node.value().type_name()));
            };
            let metadata = registry.get(&node.metadata_hash())?;
            let ConfigMetadata::Object(m) = &*metadata else {
                return Err(TreeError::mismatch(path, "object", metadata.shape().as_str()));
            };

            if m.declares(old) || !m.additional_properties {
                return Err(TreeError::KeyNotRenamable {
                    path: path.clone(),
                    key: old.to_owned(),
                });
            }
            if !entries.contains_key(old) {
                return Err(TreeError::PathNotFound(path.child_key(old)));
            }
            if old == new {
                return Ok(None);
            }
            if new.is_empty() || is_bookkeeping_key(new) || m.declares(new) || entries.contains_key(new) {
                return Err(TreeError::KeyConflict {
                    path: path.clone(),
                    key: new.to_owned(),
                });
            }

            let renamed = entries
                .iter()
                .map(|(key, entry)| {
                    let key = if key == old { new.to_owned() } else { key.clone() };
                    (key, entry.clone())
                })
                .collect();
            tracing::trace!(path = %path, old, new, "renamed key");
            Ok(Some(node.with_value(NodeValue::Object(renamed))))
        })
    }

    /// Build and insert an array item, returning its id
    ///
    /// Appends when `at` is `None`. The item is built from `value` against
    /// the array's item metadata, defaults filled.
    ///
    /// # Errors
    /// - [`TreeError::IndexOutOfBounds`] if `at` is past the end
    /// - [`TreeError::TypeMismatch`] if `path` is not an array, or `value`
    ///   disagrees with the item metadata
    pub fn insert_array_item(
        &mut self,
        path: &NodePath,
        at: Option<usize>,
        value: Option<&JsonValue>,
    ) -> Result<NodeId> {
        let (registry, config) = (self.registry, self.config);
        let discriminator = config.discriminator_key.as_str();
        let mut inserted = None;

        self.apply(path, path.segments(), true, |node| {
            let NodeValue::Array(items) = node.value() else {
                return Err(TreeError::mismatch(path, "array", node.value().type_name()));
            };
            let metadata = registry.get(&node.metadata_hash())?;
            let ConfigMetadata::Array(m) = &*metadata else {
                return Err(TreeError::mismatch(path, "array", metadata.shape().as_str()));
            };

            let index = at.unwrap_or(items.len());
            if index > items.len() {
                return Err(TreeError::IndexOutOfBounds {
                    path: path.clone(),
                    index,
                    len: items.len(),
                });
            }
            let item = build_exact(
                registry,
                discriminator,
                m.item_metadata,
                value,
                &path.child_index(index),
            )?;
            inserted = Some(item.id());

            let mut items = items.clone();
            items.insert(index, item);
            Ok(Some(node.with_value(NodeValue::Array(items))))
        })?;

        inserted.ok_or_else(|| TreeError::PathNotFound(path.clone()))
    }

    /// Remove an array item by id
    ///
    /// Returns `false` without changing anything when no item has `id`.
    ///
    /// # Errors
    /// Returns [`TreeError::TypeMismatch`] if `path` is not an array
    pub fn remove_array_item(&mut self, path: &NodePath, id: NodeId) -> Result<bool> {
        let mut removed = false;
        self.apply(path, path.segments(), true, |node| {
            let NodeValue::Array(items) = node.value() else {
                return Err(TreeError::mismatch(path, "array", node.value().type_name()));
            };
            let Some(position) = items.iter().position(|item| item.id() == id) else {
                return Ok(None);
            };
            let mut items = items.clone();
            items.remove(position);
            removed = true;
            Ok(Some(node.with_value(NodeValue::Array(items))))
        })?;
        Ok(removed)
    }

    /// Activate another variant of the compound at `path`
    ///
    /// The value is rebuilt from the variant's default template; fields are
    /// carried over when `carry_over_fields` is enabled. Switching to the
    /// active variant of a non-null compound changes nothing.
    ///
    /// # Errors
    /// - [`TreeError::MetadataNotFound`] if `key` names no variant
    /// - [`TreeError::TypeMismatch`] if `path` is not a compound
    pub fn switch_compound_variant(&mut self, path: &NodePath, key: &str) -> Result<()> {
        let (registry, config) = (self.registry, self.config);
        let discriminator = config.discriminator_key.as_str();
        let carry = config.carry_over_fields;

        self.apply(path, path.segments(), false, |node| {
            let NodeValue::Compound(current) = node.value() else {
                return Err(TreeError::mismatch(path, "compound", node.value().type_name()));
            };
            let m = registry
                .get_compound(&node.metadata_hash())?
                .ok_or_else(|| TreeError::mismatch(path, "compound", "non-compound metadata"))?;
            let option = m.option(key).ok_or_else(|| MetadataNotFoundError::Variant {
                hash: node.metadata_hash(),
                key: key.to_owned(),
            })?;
            if current.active_variant_key == key && current.value.is_some() {
                return Ok(None);
            }

            let fresh = Builder::new(registry, discriminator).build_variant(option, None, path)?;
            let value = match &current.value {
                Some(old) if carry => carry_over(registry, old, fresh)?,
                _ => fresh,
            };
            tracing::debug!(
                path = %path,
                from = %current.active_variant_key,
                to = key,
                "switched variant"
            );
            Ok(Some(node.with_value(NodeValue::Compound(CompoundValue {
                active_variant_key: key.to_owned(),
                value: Some(value),
            }))))
        })
    }

    /// Rebuild the node at `path` from plain JSON, keeping its id
    ///
    /// `None` resets the node to its default.
    ///
    /// # Errors
    /// - [`TreeError::TypeMismatch`] if `value` disagrees with the metadata
    /// - [`TreeError::PathNotFound`] if `path` does not resolve
    /// - [`TreeError::MetadataNotFound`] if the node's hash is unknown
    pub fn replace_value(&mut self, path: &NodePath, value: Option<&JsonValue>) -> Result<()> {
        if let Some(Resolved::Raw(_)) = self.tree().resolve(path) {
            return self.set_raw(path, value.cloned().unwrap_or_default());
        }
        let (registry, config) = (self.registry, self.config);
        let discriminator = config.discriminator_key.as_str();
        self.apply(path, path.segments(), false, |node| {
            let rebuilt = build_exact(registry, discriminator, node.metadata_hash(), value, path)?;
            Ok(Some(node.with_value(rebuilt.value().clone())))
        })
    }
}

/// Build a node from a caller-supplied value
///
/// A value the builder has to repair is rejected; constraint violations
/// are left to annotation. `None` builds the defaults.
fn build_exact(
    registry: &MetadataRegistry,
    discriminator: &str,
    hash: MetadataHash,
    value: Option<&JsonValue>,
    path: &NodePath,
) -> Result<Arc<EnhancedNode>> {
    let mut builder = Builder::new(registry, discriminator);
    let node = builder.build(hash, value, path)?;
    if value.is_some() {
        if let Some(mismatch) = builder
            .into_annotations()
            .into_iter()
            .find_map(Annotation::into_mismatch)
        {
            return Err(mismatch.into());
        }
    }
    Ok(node)
}

/// Re-allocate the path to `segments`, applying `edit` at its end
///
/// Returns `None` when `edit` changed nothing. Compounds on the way are
/// entered the same way [`EnhancedTree::resolve`] enters them; the final
/// one only when `unwrap_last` is set.
fn rewrite_at<F>(
    node: &Arc<EnhancedNode>,
    segments: &[PathSegment],
    path: &NodePath,
    unwrap_last: bool,
    edit: &mut F,
) -> Result<Option<Arc<EnhancedNode>>>
where
    F: FnMut(&Arc<EnhancedNode>) -> Result<Option<EnhancedNode>>,
{
    if let NodeValue::Compound(compound) = node.value() {
        if !segments.is_empty() || unwrap_last {
            let inner = compound
                .value
                .as_ref()
                .ok_or_else(|| TreeError::PathNotFound(path.clone()))?;
            let rewritten = match segments.split_first() {
                _ if !inner.is_compound() => rewrite_at(inner, segments, path, unwrap_last, edit)?,
                Some((PathSegment::Key(key), rest)) if key == VARIANT_VALUE_KEY => {
                    rewrite_at(inner, rest, path, unwrap_last, edit)?
                }
                // one compound level per path; the nested compound is the target
                None => rewrite_at(inner, segments, path, false, edit)?,
                Some(_) => return Err(TreeError::PathNotFound(path.clone())),
            };
            let Some(inner) = rewritten else {
                return Ok(None);
            };
            return Ok(Some(Arc::new(node.with_value(NodeValue::Compound(
                CompoundValue {
                    active_variant_key: compound.active_variant_key.clone(),
                    value: Some(inner),
                },
            )))));
        }
    }

    let Some((first, rest)) = segments.split_first() else {
        return Ok(edit(node)?.map(Arc::new));
    };

    match (node.value(), first) {
        (NodeValue::Object(entries), PathSegment::Key(key)) => {
            let Some(ObjectEntry::Node(child)) = entries.get(key) else {
                return Err(TreeError::PathNotFound(path.clone()));
            };
            let Some(child) = rewrite_at(child, rest, path, unwrap_last, edit)? else {
                return Ok(None);
            };
            let mut entries = entries.clone();
            entries.insert(key.clone(), ObjectEntry::Node(child));
            Ok(Some(Arc::new(node.with_value(NodeValue::Object(entries)))))
        }
        (NodeValue::Array(items), PathSegment::Index(index)) => {
            let child = items
                .get(*index)
                .ok_or_else(|| TreeError::PathNotFound(path.clone()))?;
            let Some(child) = rewrite_at(child, rest, path, unwrap_last, edit)? else {
                return Ok(None);
            };
            let mut items = items.clone();
            items.set(*index, child);
            Ok(Some(Arc::new(node.with_value(NodeValue::Array(items)))))
        }
        _ => Err(TreeError::PathNotFound(path.clone())),
    }
}

/// Mutable slot inside a free-form value
fn raw_slot<'v>(value: &'v mut JsonValue, segments: &[PathSegment]) -> Option<&'v mut JsonValue> {
    let mut current = value;
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => current.as_object_mut()?.get_mut(key)?,
            PathSegment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
        };
    }
    Some(current)
}

/// Payload for `value` on a leaf with metadata `m`
fn leaf_value_for(
    m: &ConfigMetadata,
    current: &NodeValue,
    value: &JsonValue,
    path: &NodePath,
) -> Result<NodeValue> {
    match (m, value) {
        (m, JsonValue::Null) if m.is_nullable() => Ok(match current {
            NodeValue::Compound(compound) => NodeValue::Compound(CompoundValue {
                active_variant_key: compound.active_variant_key.clone(),
                value: None,
            }),
            _ => NodeValue::Null,
        }),
        (ConfigMetadata::String(_), JsonValue::String(s)) => Ok(NodeValue::String(s.clone())),
        (ConfigMetadata::Number(n), JsonValue::Number(v)) if n.is_integer && !is_integral(v) => {
            Err(TreeError::mismatch(path, "integer", "number"))
        }
        (ConfigMetadata::Number(_), JsonValue::Number(v)) => Ok(NodeValue::Number(v.clone())),
        (ConfigMetadata::Boolean(_), JsonValue::Bool(b)) => Ok(NodeValue::Boolean(*b)),
        (m, value) => Err(TreeError::mismatch(
            path,
            m.shape().as_str(),
            json_type_name(value),
        )),
    }
}

fn carry_over(
    registry: &MetadataRegistry,
    old: &Arc<EnhancedNode>,
    fresh: Arc<EnhancedNode>,
) -> Result<Arc<EnhancedNode>> {
    let (NodeValue::Object(old_entries), NodeValue::Object(new_entries)) = (old.value(), fresh.value())
    else {
        return Ok(carry_leaf(registry, old, &fresh)?.unwrap_or(fresh));
    };

    let mut entries = new_entries.clone();
    let mut carried = false;
    for (key, entry) in &mut entries {
        let replacement = match (old_entries.get(key), &*entry) {
            (Some(ObjectEntry::Node(prev)), ObjectEntry::Node(next)) => {
                if prev.metadata_hash() == next.metadata_hash() {
                    Some(Arc::clone(prev))
                } else {
                    carry_leaf(registry, prev, next)?
                }
            }
            _ => None,
        };
        if let Some(node) = replacement {
            tracing::trace!(key = %key, "carried field over");
            *entry = ObjectEntry::Node(node);
            carried = true;
        }
    }

    if carried {
        Ok(Arc::new(fresh.with_value(NodeValue::Object(entries))))
    } else {
        Ok(fresh)
    }
}

/// Copy a leaf value into `next` when both have the same leaf shape
fn carry_leaf(
    registry: &MetadataRegistry,
    prev: &Arc<EnhancedNode>,
    next: &Arc<EnhancedNode>,
) -> Result<Option<Arc<EnhancedNode>>> {
    let same_leaf = match (prev.value().shape(), next.value().shape()) {
        (Some(a), Some(b)) => a == b && a.is_leaf(),
        _ => false,
    };
    if !same_leaf {
        return Ok(None);
    }
    let Some(value) = prev.value().leaf_json() else {
        return Ok(None);
    };
    let metadata = registry.get(&next.metadata_hash())?;
    // Values the new leaf would reject stay defaulted.
    Ok(leaf_value_for(&metadata, next.value(), &value, &NodePath::root())
        .ok()
        .map(|payload| Arc::new(next.with_value(payload))))
}
