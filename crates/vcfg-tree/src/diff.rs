//! Semantic diffing of Enhanced trees
//!
//! Node ids are ignored: two trees built independently from the same value
//! compare equal. Shared subtrees (`Arc::ptr_eq`) are skipped without
//! being walked, so diffing a tree against its own edit costs only the
//! edited path.

use std::sync::Arc;

use serde_json::{Number, Value as JsonValue};

use crate::node::{variant_path, CompoundValue, EnhancedNode, EnhancedTree, NodeValue, ObjectEntry};
use crate::path::NodePath;

/// Outcome of comparing two trees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub changed: bool,
    /// Changed locations, or `None` when the trees have different schemas
    /// or path collection is disabled
    pub paths: Option<Vec<NodePath>>,
}

impl TreeDiff {
    /// Identical trees
    #[inline]
    #[must_use]
    pub fn unchanged() -> Self {
        Self {
            changed: false,
            paths: Some(Vec::new()),
        }
    }
}

/// Compare two trees
///
/// With `collect_paths` unset the walk stops at the first difference.
#[must_use]
pub fn diff_trees(before: &EnhancedTree, after: &EnhancedTree, collect_paths: bool) -> TreeDiff {
    if before.metadata_hash() != after.metadata_hash() {
        return TreeDiff {
            changed: true,
            paths: None,
        };
    }

    let mut walk = Walk {
        paths: Vec::new(),
        collect: collect_paths,
    };
    walk.node(before.root(), after.root(), &NodePath::root());

    TreeDiff {
        changed: !walk.paths.is_empty(),
        paths: collect_paths.then_some(walk.paths),
    }
}

struct Walk {
    paths: Vec<NodePath>,
    collect: bool,
}

impl Walk {
    fn done(&self) -> bool {
        !self.collect && !self.paths.is_empty()
    }

    fn node(&mut self, a: &Arc<EnhancedNode>, b: &Arc<EnhancedNode>, path: &NodePath) {
        if Arc::ptr_eq(a, b) || self.done() {
            return;
        }
        if a.metadata_hash() != b.metadata_hash() {
            self.paths.push(path.clone());
            return;
        }

        match (a.value(), b.value()) {
            (NodeValue::String(x), NodeValue::String(y)) if x == y => {}
            (NodeValue::Number(x), NodeValue::Number(y)) if numbers_eq(x, y) => {}
            (NodeValue::Boolean(x), NodeValue::Boolean(y)) if x == y => {}
            (NodeValue::Null, NodeValue::Null) => {}
            (NodeValue::Array(xs), NodeValue::Array(ys)) => {
                for i in 0..xs.len().max(ys.len()) {
                    if self.done() {
                        return;
                    }
                    match (xs.get(i), ys.get(i)) {
                        (Some(x), Some(y)) => self.node(x, y, &path.child_index(i)),
                        _ => self.paths.push(path.child_index(i)),
                    }
                }
            }
            (NodeValue::Object(xs), NodeValue::Object(ys)) => {
                for (key, x) in xs {
                    if self.done() {
                        return;
                    }
                    let child = path.child_key(key.as_str());
                    match (x, ys.get(key)) {
                        (ObjectEntry::Node(x), Some(ObjectEntry::Node(y))) => {
                            self.node(x, y, &child);
                        }
                        (ObjectEntry::Raw(x), Some(ObjectEntry::Raw(y))) if json_eq(x, y) => {}
                        _ => self.paths.push(child),
                    }
                }
                for key in ys.keys() {
                    if self.done() {
                        return;
                    }
                    if !xs.contains_key(key) {
                        self.paths.push(path.child_key(key.as_str()));
                    }
                }
            }
            (
                NodeValue::Compound(CompoundValue {
                    active_variant_key: kx,
                    value: x,
                }),
                NodeValue::Compound(CompoundValue {
                    active_variant_key: ky,
                    value: y,
                }),
            ) if kx == ky => match (x, y) {
                (Some(x), Some(y)) => self.node(x, y, &variant_path(x, path)),
                (None, None) => {}
                _ => self.paths.push(path.clone()),
            },
            _ => self.paths.push(path.clone()),
        }
    }
}

/// Numeric comparison: `1` equals `1.0`
fn numbers_eq(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_u64(), b.as_u64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
    }
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => numbers_eq(x, y),
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (JsonValue::Object(xs), JsonValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use im::Vector;
    use indexmap::IndexMap;
    use serde_json::json;
    use vcfg_metadata::ContentHash;

    fn leaf(tag: &str, value: NodeValue) -> Arc<EnhancedNode> {
        Arc::new(EnhancedNode::new(ContentHash::compute(tag.as_bytes()), value))
    }

    fn object(entries: Vec<(&str, ObjectEntry)>) -> EnhancedTree {
        let entries: IndexMap<_, _> = entries
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        EnhancedTree::new(leaf("root", NodeValue::Object(entries)))
    }

    fn number(n: JsonValue) -> ObjectEntry {
        let JsonValue::Number(n) = n else {
            unreachable!()
        };
        ObjectEntry::Node(leaf("num", NodeValue::Number(n)))
    }

    #[test]
    fn ids_are_ignored_and_numbers_compare_numerically() {
        let a = object(vec![("t", number(json!(1)))]);
        let b = object(vec![("t", number(json!(1.0)))]);
        assert_eq!(diff_trees(&a, &b, true), TreeDiff::unchanged());
    }

    #[test]
    fn changed_leaf_is_reported() {
        let a = object(vec![("t", number(json!(1))), ("u", number(json!(2)))]);
        let b = object(vec![("t", number(json!(1))), ("u", number(json!(3)))]);
        let diff = diff_trees(&a, &b, true);
        assert!(diff.changed);
        assert_eq!(diff.paths, Some(vec![NodePath::key("u")]));
    }

    #[test]
    fn key_union_and_raw_fields() {
        let a = object(vec![("x", ObjectEntry::Raw(json!({"a": [1, 2.0]})))]);
        let b = object(vec![
            ("x", ObjectEntry::Raw(json!({"a": [1.0, 2]}))),
            ("y", ObjectEntry::Raw(json!(null))),
        ]);
        let diff = diff_trees(&a, &b, true);
        assert_eq!(diff.paths, Some(vec![NodePath::key("y")]));
    }

    #[test]
    fn arrays_compare_positionally() {
        let item = |s: &str| leaf("item", NodeValue::String(s.into()));
        let a = EnhancedTree::new(leaf(
            "list",
            NodeValue::Array(Vector::from(vec![item("a"), item("b")])),
        ));
        let b = EnhancedTree::new(leaf(
            "list",
            NodeValue::Array(Vector::from(vec![item("b")])),
        ));
        let diff = diff_trees(&a, &b, true);
        assert_eq!(
            diff.paths,
            Some(vec![NodePath::root().child_index(0), NodePath::root().child_index(1)])
        );
    }

    #[test]
    fn different_schema_has_no_paths() {
        let a = EnhancedTree::new(leaf("a", NodeValue::Boolean(true)));
        let b = EnhancedTree::new(leaf("b", NodeValue::Boolean(true)));
        assert_eq!(
            diff_trees(&a, &b, true),
            TreeDiff {
                changed: true,
                paths: None
            }
        );
    }

    #[test]
    fn without_collection_stops_early() {
        let a = object(vec![("t", number(json!(1))), ("u", number(json!(2)))]);
        let b = object(vec![("t", number(json!(5))), ("u", number(json!(3)))]);
        let diff = diff_trees(&a, &b, false);
        assert!(diff.changed);
        assert_eq!(diff.paths, None);
    }

    #[test]
    fn shared_root_is_unchanged() {
        let a = object(vec![("t", number(json!(1)))]);
        assert!(!diff_trees(&a, &a.clone(), true).changed);
    }
}
