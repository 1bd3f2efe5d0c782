//! Editing session over one parameter set
//!
//! A [`VariantSession`] keeps the committed baseline next to the working
//! tree. Edits replace the working tree and notify the session's
//! [`ChangeBus`]; dirtiness is a semantic diff against the baseline.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use vcfg_metadata::MetadataHash;

use crate::annotation::Annotation;
use crate::diff::TreeDiff;
use crate::error::TreeError;
use crate::mutation::TreeDraft;
use crate::node::EnhancedTree;
use crate::observer::{ChangeBus, NodeChange};
use crate::transformer::Transformer;

/// Working copy of a parameter set with commit and discard
#[derive(Debug)]
pub struct VariantSession {
    transformer: Arc<Transformer>,
    baseline: EnhancedTree,
    current: EnhancedTree,
    annotations: Vec<Annotation>,
    bus: ChangeBus,
}

impl VariantSession {
    /// Build a tree for `value` and open a session on it
    ///
    /// # Errors
    /// Returns [`TreeError::MetadataNotFound`] if `hash` is not registered
    pub fn open(
        transformer: Arc<Transformer>,
        hash: MetadataHash,
        value: Option<&JsonValue>,
    ) -> Result<Self, TreeError> {
        let output = transformer.build(hash, value)?;
        tracing::debug!(hash = %hash.short(), "opened session");
        Ok(Self {
            baseline: output.tree.clone(),
            current: output.tree,
            annotations: output.annotations,
            transformer,
            bus: ChangeBus::new(),
        })
    }

    #[inline]
    #[must_use]
    pub fn transformer(&self) -> &Arc<Transformer> {
        &self.transformer
    }

    /// Working tree
    #[inline]
    #[must_use]
    pub fn tree(&self) -> &EnhancedTree {
        &self.current
    }

    /// Last committed tree
    #[inline]
    #[must_use]
    pub fn baseline(&self) -> &EnhancedTree {
        &self.baseline
    }

    /// Annotations of the working tree
    ///
    /// After an edit only constraint annotations are reported; repairs are
    /// made once, when the session opens.
    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    #[inline]
    #[must_use]
    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    /// Apply a batch of edits to the working tree
    ///
    /// Subscribers are notified once for the whole batch. A failed batch
    /// leaves the session untouched.
    ///
    /// # Errors
    /// Returns the first error raised by `edits`
    pub fn edit<R, F>(&mut self, edits: F) -> Result<R, TreeError>
    where
        F: FnOnce(&mut TreeDraft<'_>) -> Result<R, TreeError>,
    {
        let (next, output) = self.transformer.edit(&self.current, edits)?;
        if !next.ptr_eq(&self.current) {
            let annotations = self.transformer.annotations(&next)?;
            let previous = std::mem::replace(&mut self.current, next);
            self.annotations = annotations;
            self.bus.publish(&previous, &self.current);
        }
        Ok(output)
    }

    /// Whether the working tree differs from the baseline
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.current.ptr_eq(&self.baseline) && self.changes().changed
    }

    /// Semantic changes since the last commit
    #[must_use]
    pub fn changes(&self) -> TreeDiff {
        self.transformer.diff(&self.baseline, &self.current)
    }

    /// Plain JSON parameters of the working tree
    ///
    /// # Errors
    /// Returns [`TreeError::TypeMismatch`] if the tree disagrees with its metadata
    pub fn parameters(&self) -> Result<JsonValue, TreeError> {
        self.transformer.extract(&self.current)
    }

    /// Make the working tree the new baseline
    ///
    /// Returns the committed parameters.
    ///
    /// # Errors
    /// Returns [`TreeError::TypeMismatch`] if the tree cannot be extracted;
    /// the baseline is kept in that case
    pub fn commit(&mut self) -> Result<JsonValue, TreeError> {
        let parameters = self.parameters()?;
        self.baseline = self.current.clone();
        tracing::debug!(root = %self.current.root().id(), "committed session");
        Ok(parameters)
    }

    /// Drop uncommitted edits
    ///
    /// Returns the node changes published while reverting.
    ///
    /// # Errors
    /// Returns [`TreeError::MetadataNotFound`] if the baseline references
    /// unregistered metadata
    pub fn discard(&mut self) -> Result<Vec<NodeChange>, TreeError> {
        if self.current.ptr_eq(&self.baseline) {
            return Ok(Vec::new());
        }
        let annotations = self.transformer.annotations(&self.baseline)?;
        let previous = std::mem::replace(&mut self.current, self.baseline.clone());
        self.annotations = annotations;
        let changes = self.bus.publish(&previous, &self.current);
        tracing::debug!(changes = changes.len(), "discarded session edits");
        Ok(changes)
    }

    /// Independent session seeded with the working tree's parameters
    ///
    /// The copy gets fresh node ids and its own change bus.
    ///
    /// # Errors
    /// Returns [`TreeError`] if the working tree cannot be extracted
    pub fn duplicate(&self) -> Result<Self, TreeError> {
        let parameters = self.parameters()?;
        Self::open(
            Arc::clone(&self.transformer),
            self.current.metadata_hash(),
            Some(&parameters),
        )
    }
}
