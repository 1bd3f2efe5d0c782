//! Content-addressed metadata registry
//!
//! Provides [`MetadataRegistry`], a write-once store mapping a
//! [`MetadataHash`] to its normalized [`ConfigMetadata`].
//!
//! # Invariants
//! - A hash is never rebound to different content
//! - Every registered node's children are registered before it
//! - Entries are never evicted

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::error::{MetadataNotFoundError, RegistryError};
use crate::hash::MetadataHash;
use crate::metadata::{CompoundMetadata, ConfigMetadata};

static SHARED: OnceCell<Arc<MetadataRegistry>> = OnceCell::new();

/// Write-once store of normalized metadata nodes
///
/// Thread-safe; reads never block on each other. Clone the surrounding
/// `Arc` to share one registry across trees and sessions.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: DashMap<MetadataHash, Arc<ConfigMetadata>>,
}

impl MetadataRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Process-wide registry, created on first use
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::new())))
    }

    /// Register a metadata node, returning its content hash
    ///
    /// Registering content that is already present is a no-op returning
    /// the existing hash.
    ///
    /// # Errors
    /// - [`RegistryError::MetadataNotFound`] if a child hash is not registered
    /// - [`RegistryError::Conflict`] if the hash is bound to different content
    pub fn register(&self, metadata: ConfigMetadata) -> Result<MetadataHash, RegistryError> {
        for child in metadata.children() {
            if !self.contains(&child) {
                return Err(MetadataNotFoundError::Hash(child).into());
            }
        }

        let hash = metadata.content_hash()?;
        self.insert(hash, metadata)?;
        Ok(hash)
    }

    fn insert(&self, hash: MetadataHash, metadata: ConfigMetadata) -> Result<(), RegistryError> {
        match self.entries.entry(hash) {
            Entry::Occupied(existing) => {
                if **existing.get() != metadata {
                    return Err(RegistryError::Conflict(hash));
                }
                tracing::trace!(hash = %hash.short(), "metadata already registered");
            }
            Entry::Vacant(slot) => {
                tracing::debug!(
                    hash = %hash.short(),
                    shape = %metadata.shape(),
                    "registered metadata"
                );
                slot.insert(Arc::new(metadata));
            }
        }
        Ok(())
    }

    /// Look up a node by hash
    ///
    /// # Errors
    /// Returns [`MetadataNotFoundError::Hash`] for an unknown hash
    pub fn get(&self, hash: &MetadataHash) -> Result<Arc<ConfigMetadata>, MetadataNotFoundError> {
        self.entries
            .get(hash)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(MetadataNotFoundError::Hash(*hash))
    }

    /// Look up a node that must be a compound
    ///
    /// Returns `Ok(None)` when the hash exists but is not a compound.
    ///
    /// # Errors
    /// Returns [`MetadataNotFoundError::Hash`] for an unknown hash
    pub fn get_compound(
        &self,
        hash: &MetadataHash,
    ) -> Result<Option<CompoundMetadata>, MetadataNotFoundError> {
        match &*self.get(hash)? {
            ConfigMetadata::Compound(compound) => Ok(Some(compound.clone())),
            _ => Ok(None),
        }
    }

    /// Check if a hash is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, hash: &MetadataHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Number of registered nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Export every entry, sorted by hash
    #[must_use]
    pub fn snapshot(&self) -> Vec<(MetadataHash, Arc<ConfigMetadata>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Import entries produced by [`snapshot`](Self::snapshot)
    ///
    /// Each entry is verified against its hash and every child reference
    /// must resolve in the registry or the batch. Nothing is inserted
    /// unless the whole batch is valid. Returns the number of new entries.
    ///
    /// # Errors
    /// - [`RegistryError::HashMismatch`] if an entry does not hash to its key
    /// - [`RegistryError::Conflict`] if a hash is bound to different content
    /// - [`RegistryError::MetadataNotFound`] if the imported closure is incomplete
    pub fn restore<I>(&self, entries: I) -> Result<usize, RegistryError>
    where
        I: IntoIterator<Item = (MetadataHash, Arc<ConfigMetadata>)>,
    {
        let entries: Vec<_> = entries.into_iter().collect();
        for (hash, metadata) in &entries {
            let actual = metadata.content_hash()?;
            if actual != *hash {
                return Err(RegistryError::HashMismatch {
                    expected: *hash,
                    actual,
                });
            }
            if let Ok(existing) = self.get(hash) {
                if existing != *metadata {
                    return Err(RegistryError::Conflict(*hash));
                }
            }
        }

        let batch: HashSet<MetadataHash> = entries.iter().map(|(hash, _)| *hash).collect();
        for (_, metadata) in &entries {
            for child in metadata.children() {
                if !self.contains(&child) && !batch.contains(&child) {
                    return Err(MetadataNotFoundError::Hash(child).into());
                }
            }
        }

        // children before parents
        let before = self.len();
        let mut pending = entries;
        while !pending.is_empty() {
            let (ready, blocked): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|(_, metadata)| metadata.children().iter().all(|c| self.contains(c)));
            if ready.is_empty() {
                let missing = blocked
                    .iter()
                    .flat_map(|(_, metadata)| metadata.children())
                    .find(|c| !self.contains(c))
                    .unwrap_or(blocked[0].0);
                return Err(MetadataNotFoundError::Hash(missing).into());
            }
            for (hash, metadata) in ready {
                self.insert(hash, ConfigMetadata::clone(&metadata))?;
            }
            pending = blocked;
        }
        Ok(self.len() - before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ContentHash;
    use crate::metadata::{ArrayMetadata, CommonMetadata, StringMetadata};

    fn string_meta() -> ConfigMetadata {
        ConfigMetadata::String(StringMetadata {
            common: CommonMetadata::default(),
            options: None,
            allow_freeform: true,
        })
    }

    fn array_of(item: MetadataHash) -> ConfigMetadata {
        ConfigMetadata::Array(ArrayMetadata {
            common: CommonMetadata::default(),
            item_metadata: item,
            min_items: None,
            max_items: None,
        })
    }

    #[test]
    fn register_dedups_identical_content() {
        let registry = MetadataRegistry::new();
        let h1 = registry.register(string_meta()).unwrap();
        let h2 = registry.register(string_meta()).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_requires_children() {
        let registry = MetadataRegistry::new();
        let missing = ContentHash::compute(b"missing");
        let result = registry.register(array_of(missing));
        assert!(matches!(
            result,
            Err(RegistryError::MetadataNotFound(MetadataNotFoundError::Hash(h))) if h == missing
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn get_unknown_hash_is_error() {
        let registry = MetadataRegistry::new();
        let hash = ContentHash::compute(b"nothing");
        assert_eq!(
            registry.get(&hash).unwrap_err(),
            MetadataNotFoundError::Hash(hash)
        );
    }

    #[test]
    fn insert_rejects_rebinding() {
        let registry = MetadataRegistry::new();
        let hash = registry.register(string_meta()).unwrap();
        let item = registry.register(string_meta()).unwrap();
        let result = registry.insert(hash, array_of(item));
        assert!(matches!(result, Err(RegistryError::Conflict(h)) if h == hash));
        assert_eq!(*registry.get(&hash).unwrap(), string_meta());
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let source = MetadataRegistry::new();
        let item = source.register(string_meta()).unwrap();
        let array = source.register(array_of(item)).unwrap();

        let target = MetadataRegistry::new();
        let added = target.restore(source.snapshot()).unwrap();
        assert_eq!(added, 2);
        assert!(target.contains(&array));
        assert_eq!(target.restore(source.snapshot()).unwrap(), 0);
    }

    #[test]
    fn restore_rejects_tampered_entry() {
        let registry = MetadataRegistry::new();
        let wrong = ContentHash::compute(b"wrong");
        let result = registry.restore([(wrong, Arc::new(string_meta()))]);
        assert!(matches!(result, Err(RegistryError::HashMismatch { .. })));
    }

    #[test]
    fn restore_rejects_incomplete_closure() {
        let source = MetadataRegistry::new();
        let item = source.register(string_meta()).unwrap();
        let array = source.register(array_of(item)).unwrap();
        let only_array: Vec<_> = source
            .snapshot()
            .into_iter()
            .filter(|(h, _)| *h == array)
            .collect();

        let target = MetadataRegistry::new();
        assert!(matches!(
            target.restore(only_array),
            Err(RegistryError::MetadataNotFound(_))
        ));
        assert!(target.is_empty());
        assert!(!target.contains(&array));

        // the rejected batch leaves room for a complete one
        assert_eq!(target.restore(source.snapshot()).unwrap(), 2);
        assert!(target.contains(&array));
    }

    #[test]
    fn restore_accepts_children_in_any_order() {
        let source = MetadataRegistry::new();
        let item = source.register(string_meta()).unwrap();
        let array = source.register(array_of(item)).unwrap();
        let mut entries = source.snapshot();
        entries.sort_by_key(|(h, _)| *h != array);

        let target = MetadataRegistry::new();
        assert_eq!(target.restore(entries).unwrap(), 2);
        assert!(target.contains(&item));
    }

    #[test]
    fn shared_registry_is_a_singleton() {
        let a = MetadataRegistry::shared();
        let b = MetadataRegistry::shared();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
