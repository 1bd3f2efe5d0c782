//! Change notifications keyed by node id
//!
//! Consumers subscribe to the ids of the nodes they render. After an edit,
//! [`ChangeBus::publish`] walks the old and new trees together and notifies
//! only the subscribers of nodes that were added, updated or removed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::id::NodeId;
use crate::node::{EnhancedNode, EnhancedTree, NodeValue};

/// What happened to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    /// Same id, different content
    Updated,
    Removed,
}

/// Change of one node between two trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeChange {
    pub id: NodeId,
    pub kind: ChangeKind,
}

/// Handle returned by [`ChangeBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&NodeChange) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    callback: Callback,
}

/// Node changes between two trees
///
/// Children are paired by id, so a moved or re-keyed node is `Updated`
/// only if its content changed. Shared subtrees are skipped.
#[must_use]
pub fn changed_nodes(before: &EnhancedTree, after: &EnhancedTree) -> Vec<NodeChange> {
    let mut changes = Vec::new();
    let (a, b) = (before.root(), after.root());
    if a.id() == b.id() {
        compare(a, b, &mut changes);
    } else {
        report_subtree(a, ChangeKind::Removed, &mut changes);
        report_subtree(b, ChangeKind::Added, &mut changes);
    }
    changes
}

fn compare(a: &Arc<EnhancedNode>, b: &Arc<EnhancedNode>, changes: &mut Vec<NodeChange>) {
    if Arc::ptr_eq(a, b) {
        return;
    }
    if own_content_differs(a, b) {
        changes.push(NodeChange {
            id: b.id(),
            kind: ChangeKind::Updated,
        });
    }

    let old: IndexMap<NodeId, &Arc<EnhancedNode>> =
        a.child_nodes().into_iter().map(|n| (n.id(), n)).collect();
    let new: IndexMap<NodeId, &Arc<EnhancedNode>> =
        b.child_nodes().into_iter().map(|n| (n.id(), n)).collect();

    for (id, node) in &old {
        match new.get(id) {
            Some(next) => compare(node, next, changes),
            None => report_subtree(node, ChangeKind::Removed, changes),
        }
    }
    for (id, node) in &new {
        if !old.contains_key(id) {
            report_subtree(node, ChangeKind::Added, changes);
        }
    }
}

/// Whether the node itself changed, ignoring changes inside children
fn own_content_differs(a: &EnhancedNode, b: &EnhancedNode) -> bool {
    if a.metadata_hash() != b.metadata_hash() {
        return true;
    }
    match (a.value(), b.value()) {
        (NodeValue::Array(xs), NodeValue::Array(ys)) => {
            xs.len() != ys.len() || xs.iter().zip(ys.iter()).any(|(x, y)| x.id() != y.id())
        }
        (NodeValue::Object(xs), NodeValue::Object(ys)) => {
            xs.len() != ys.len()
                || xs.iter().zip(ys.iter()).any(|((kx, ex), (ky, ey))| {
                    kx != ky
                        || match (ex.as_node(), ey.as_node()) {
                            (Some(x), Some(y)) => x.id() != y.id(),
                            (None, None) => ex != ey,
                            _ => true,
                        }
                })
        }
        (NodeValue::Compound(x), NodeValue::Compound(y)) => {
            x.active_variant_key != y.active_variant_key
                || x.value.as_ref().map(|n| n.id()) != y.value.as_ref().map(|n| n.id())
        }
        (x, y) => x != y,
    }
}

fn report_subtree(node: &Arc<EnhancedNode>, kind: ChangeKind, changes: &mut Vec<NodeChange>) {
    changes.push(NodeChange {
        id: node.id(),
        kind,
    });
    for child in node.child_nodes() {
        report_subtree(child, kind, changes);
    }
}

/// Subscription table for node changes
///
/// Callbacks run on the publishing thread, outside the table lock, so a
/// callback may subscribe or unsubscribe.
#[derive(Default)]
pub struct ChangeBus {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<NodeId, Vec<Subscriber>>>,
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for changes of `node`
    pub fn subscribe<F>(&self, node: NodeId, callback: F) -> SubscriptionId
    where
        F: Fn(&NodeChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(node)
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::new(callback),
            });
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, subscription: SubscriptionId) -> bool {
        let mut table = self.subscribers.write();
        let mut found = false;
        table.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.id != subscription);
            found |= subscribers.len() != before;
            !subscribers.is_empty()
        });
        found
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }

    /// Notify subscribers of nodes that changed between the two trees
    ///
    /// Returns every change, subscribed or not.
    pub fn publish(&self, before: &EnhancedTree, after: &EnhancedTree) -> Vec<NodeChange> {
        let changes = changed_nodes(before, after);
        if changes.is_empty() {
            return changes;
        }

        let pending: Vec<(NodeChange, Callback)> = {
            let table = self.subscribers.read();
            changes
                .iter()
                .flat_map(|change| {
                    table
                        .get(&change.id)
                        .into_iter()
                        .flatten()
                        .map(move |s| (*change, Arc::clone(&s.callback)))
                })
                .collect()
        };

        tracing::trace!(
            changes = changes.len(),
            notified = pending.len(),
            "published node changes"
        );
        for (change, callback) in pending {
            callback(&change);
        }
        changes
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use im::Vector;
    use vcfg_metadata::ContentHash;

    fn leaf(value: &str) -> Arc<EnhancedNode> {
        Arc::new(EnhancedNode::new(
            ContentHash::compute(b"item"),
            NodeValue::String(value.into()),
        ))
    }

    fn list(items: Vec<Arc<EnhancedNode>>) -> EnhancedNode {
        EnhancedNode::new(ContentHash::compute(b"list"), NodeValue::Array(Vector::from(items)))
    }

    #[test]
    fn detects_updates_additions_and_removals() {
        let (a, b) = (leaf("a"), leaf("b"));
        let root = list(vec![Arc::clone(&a), Arc::clone(&b)]);
        let before = EnhancedTree::new(Arc::new(root.clone()));

        let a2 = Arc::new(a.with_value(NodeValue::String("a!".into())));
        let c = leaf("c");
        let after = EnhancedTree::new(Arc::new(root.with_value(NodeValue::Array(Vector::from(
            vec![Arc::clone(&a2), Arc::clone(&c)],
        )))));

        let changes = changed_nodes(&before, &after);
        assert!(changes.contains(&NodeChange {
            id: root.id(),
            kind: ChangeKind::Updated
        }));
        assert!(changes.contains(&NodeChange {
            id: a.id(),
            kind: ChangeKind::Updated
        }));
        assert!(changes.contains(&NodeChange {
            id: b.id(),
            kind: ChangeKind::Removed
        }));
        assert!(changes.contains(&NodeChange {
            id: c.id(),
            kind: ChangeKind::Added
        }));
        assert_eq!(changes.len(), 4);
    }

    #[test]
    fn identical_trees_have_no_changes() {
        let tree = EnhancedTree::new(Arc::new(list(vec![leaf("a")])));
        assert!(changed_nodes(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn publish_notifies_only_subscribed_ids() {
        use std::sync::atomic::AtomicUsize;

        let a = leaf("a");
        let root = list(vec![Arc::clone(&a)]);
        let before = EnhancedTree::new(Arc::new(root.clone()));
        let a2 = Arc::new(a.with_value(NodeValue::String("z".into())));
        let after =
            EnhancedTree::new(Arc::new(root.with_value(NodeValue::Array(Vector::unit(a2)))));

        let bus = ChangeBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = bus.subscribe(a.id(), move |change| {
            assert_eq!(change.kind, ChangeKind::Updated);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.subscribe(NodeId::new(), |_| panic!("unrelated node notified"));
        assert_eq!(bus.subscriber_count(), 2);

        // the root keeps the same item ids, so only the item changed
        assert_eq!(bus.publish(&before, &after).len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(bus.unsubscribe(sub));
        assert!(!bus.unsubscribe(sub));
        bus.publish(&before, &after);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
