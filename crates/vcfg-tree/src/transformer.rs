//! Transformer context
//!
//! [`Transformer`] bundles a registry with a [`TransformerConfig`] and
//! exposes the full pipeline: normalize, build, edit, extract and diff.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use vcfg_metadata::{
    MetadataHash, MetadataNotFoundError, MetadataRegistry, Normalized, SchemaNormalizationError,
    SchemaNormalizer,
};

use crate::annotation::{collect_constraints, Annotation, BuildOutput};
use crate::builder::Builder;
use crate::config::TransformerConfig;
use crate::defaults;
use crate::diff::{diff_trees, TreeDiff};
use crate::error::{ConfigError, TreeError};
use crate::extract::extract_node;
use crate::id::NodeId;
use crate::mutation::TreeDraft;
use crate::node::EnhancedTree;
use crate::path::NodePath;

/// Registry plus configuration
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct Transformer {
    registry: Arc<MetadataRegistry>,
    config: TransformerConfig,
}

impl Transformer {
    /// Create transformer with default configuration
    #[must_use]
    pub fn new(registry: Arc<MetadataRegistry>) -> Self {
        Self {
            registry,
            config: TransformerConfig::default(),
        }
    }

    /// Create transformer with explicit configuration
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if the configuration fails validation
    pub fn with_config(
        registry: Arc<MetadataRegistry>,
        config: TransformerConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { registry, config })
    }

    /// Transformer over the process-wide registry
    #[must_use]
    pub fn shared() -> Self {
        Self::new(MetadataRegistry::shared())
    }

    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Normalize and register a schema
    ///
    /// # Errors
    /// Returns [`SchemaNormalizationError`] for malformed schemas
    pub fn normalize(&self, schema: &JsonValue) -> Result<Normalized, SchemaNormalizationError> {
        SchemaNormalizer::new(&self.registry)
            .with_max_depth(self.config.max_schema_depth)
            .normalize(schema)
    }

    /// Build a tree for a registered hash
    ///
    /// # Errors
    /// Returns [`MetadataNotFoundError`] if `hash` or a descendant is not registered
    pub fn build(
        &self,
        hash: MetadataHash,
        value: Option<&JsonValue>,
    ) -> Result<BuildOutput, MetadataNotFoundError> {
        let mut builder = Builder::new(&self.registry, &self.config.discriminator_key);
        let tree = EnhancedTree::new(builder.build(hash, value, &NodePath::root())?);
        let mut annotations = builder.into_annotations();
        annotations.extend(collect_constraints(&self.registry, &tree)?);

        tracing::debug!(hash = %hash.short(), root = %tree.root().id(), "built tree");
        if !annotations.is_empty() {
            tracing::warn!(
                hash = %hash.short(),
                count = annotations.len(),
                first = %annotations[0],
                "tree built with annotations"
            );
        }
        Ok(BuildOutput { tree, annotations })
    }

    /// Normalize `schema`, then build a tree for it
    ///
    /// # Errors
    /// Returns [`TreeError::Schema`] for malformed schemas
    pub fn build_from_schema(
        &self,
        schema: &JsonValue,
        value: Option<&JsonValue>,
    ) -> Result<BuildOutput, TreeError> {
        let normalized = self.normalize(schema)?;
        Ok(self.build(normalized.hash, value)?)
    }

    /// Plain JSON parameters of a tree
    ///
    /// # Errors
    /// Returns [`TreeError::TypeMismatch`] if the tree disagrees with its metadata
    pub fn extract(&self, tree: &EnhancedTree) -> Result<JsonValue, TreeError> {
        extract_node(
            &self.registry,
            tree.root(),
            &self.config.discriminator_key,
            &NodePath::root(),
        )
    }

    /// What [`extract`](Self::extract) returns for a fresh build of `value`
    ///
    /// # Errors
    /// Returns [`MetadataNotFoundError`] if `hash` or a descendant is not registered
    pub fn fill_defaults(
        &self,
        hash: MetadataHash,
        value: Option<&JsonValue>,
    ) -> Result<JsonValue, MetadataNotFoundError> {
        defaults::fill_defaults(&self.registry, hash, value, &self.config.discriminator_key)
    }

    /// Constraint annotations for any tree
    ///
    /// # Errors
    /// Returns [`MetadataNotFoundError`] if a node's hash is not registered
    pub fn annotations(&self, tree: &EnhancedTree) -> Result<Vec<Annotation>, MetadataNotFoundError> {
        collect_constraints(&self.registry, tree)
    }

    /// Compare two trees
    #[must_use]
    pub fn diff(&self, before: &EnhancedTree, after: &EnhancedTree) -> TreeDiff {
        diff_trees(before, after, self.config.collect_diff_paths)
    }

    /// Apply a batch of edits atomically
    ///
    /// `tree` is never modified. On error nothing of the batch is kept.
    ///
    /// # Errors
    /// Returns the first error raised by `edits`
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use serde_json::json;
    /// use vcfg_metadata::MetadataRegistry;
    /// use vcfg_tree::Transformer;
    ///
    /// let transformer = Transformer::new(Arc::new(MetadataRegistry::new()));
    /// let schema = json!({"type": "object", "properties": {"n": {"type": "number"}}});
    /// let tree = transformer.build_from_schema(&schema, None).unwrap().tree;
    ///
    /// let (edited, ()) = transformer
    ///     .edit(&tree, |draft| draft.set_leaf_value(&"n".parse()?, json!(3)))
    ///     .unwrap();
    /// assert_eq!(transformer.extract(&edited).unwrap(), json!({"n": 3}));
    /// ```
    pub fn edit<R, F>(&self, tree: &EnhancedTree, edits: F) -> Result<(EnhancedTree, R), TreeError>
    where
        F: FnOnce(&mut TreeDraft<'_>) -> Result<R, TreeError>,
    {
        let mut draft = TreeDraft::new(&self.registry, &self.config, tree);
        let output = edits(&mut draft)?;
        Ok((draft.into_tree(), output))
    }

    /// See [`TreeDraft::set_leaf_value`]
    ///
    /// # Errors
    /// As [`TreeDraft::set_leaf_value`]
    pub fn set_leaf_value(
        &self,
        tree: &EnhancedTree,
        path: &NodePath,
        value: JsonValue,
    ) -> Result<EnhancedTree, TreeError> {
        Ok(self.edit(tree, |draft| draft.set_leaf_value(path, value))?.0)
    }

    /// See [`TreeDraft::rename_object_key`]
    ///
    /// # Errors
    /// As [`TreeDraft::rename_object_key`]
    pub fn rename_object_key(
        &self,
        tree: &EnhancedTree,
        path: &NodePath,
        old: &str,
        new: &str,
    ) -> Result<EnhancedTree, TreeError> {
        Ok(self.edit(tree, |draft| draft.rename_object_key(path, old, new))?.0)
    }

    /// See [`TreeDraft::insert_array_item`]
    ///
    /// # Errors
    /// As [`TreeDraft::insert_array_item`]
    pub fn insert_array_item(
        &self,
        tree: &EnhancedTree,
        path: &NodePath,
        at: Option<usize>,
        value: Option<&JsonValue>,
    ) -> Result<(EnhancedTree, NodeId), TreeError> {
        self.edit(tree, |draft| draft.insert_array_item(path, at, value))
    }

    /// See [`TreeDraft::remove_array_item`]
    ///
    /// # Errors
    /// As [`TreeDraft::remove_array_item`]
    pub fn remove_array_item(
        &self,
        tree: &EnhancedTree,
        path: &NodePath,
        id: NodeId,
    ) -> Result<EnhancedTree, TreeError> {
        Ok(self.edit(tree, |draft| draft.remove_array_item(path, id))?.0)
    }

    /// See [`TreeDraft::switch_compound_variant`]
    ///
    /// # Errors
    /// As [`TreeDraft::switch_compound_variant`]
    pub fn switch_compound_variant(
        &self,
        tree: &EnhancedTree,
        path: &NodePath,
        key: &str,
    ) -> Result<EnhancedTree, TreeError> {
        Ok(self.edit(tree, |draft| draft.switch_compound_variant(path, key))?.0)
    }

    /// See [`TreeDraft::replace_value`]
    ///
    /// # Errors
    /// As [`TreeDraft::replace_value`]
    pub fn replace_value(
        &self,
        tree: &EnhancedTree,
        path: &NodePath,
        value: Option<&JsonValue>,
    ) -> Result<EnhancedTree, TreeError> {
        Ok(self.edit(tree, |draft| draft.replace_value(path, value))?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn transformer() -> Transformer {
        Transformer::new(Arc::new(MetadataRegistry::new()))
    }

    #[test]
    fn failed_batch_keeps_original() {
        let t = transformer();
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "number"}, "b": {"type": "string"}}
        });
        let tree = t.build_from_schema(&schema, None).unwrap().tree;

        let result = t.edit(&tree, |draft| {
            draft.set_leaf_value(&NodePath::key("a"), json!(1))?;
            draft.set_leaf_value(&NodePath::key("b"), json!(2))
        });
        assert!(result.unwrap_err().is_type_mismatch());
        assert_eq!(t.extract(&tree).unwrap(), json!({"a": 0, "b": ""}));
    }

    #[test]
    fn build_reports_constraints() {
        let t = transformer();
        let schema = json!({"type": "array", "items": {"type": "string"}, "minItems": 1});
        let output = t.build_from_schema(&schema, None).unwrap();
        assert_eq!(output.annotations.len(), 1);
        assert!(output.annotations[0].is_constraint());
        assert_eq!(t.annotations(&output.tree).unwrap(), output.annotations);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TransformerConfig::default().with_max_schema_depth(0);
        assert!(Transformer::with_config(Arc::new(MetadataRegistry::new()), config).is_err());
    }

    #[test]
    fn schema_depth_follows_config() {
        let config = TransformerConfig::default().with_max_schema_depth(1);
        let t = Transformer::with_config(Arc::new(MetadataRegistry::new()), config).unwrap();
        let deep = json!({
            "type": "object",
            "properties": {"a": {"type": "object", "properties": {"b": {"type": "string"}}}}
        });
        assert!(matches!(
            t.build_from_schema(&deep, None),
            Err(TreeError::Schema(_))
        ));
    }

    #[test]
    fn custom_discriminator() {
        let config = TransformerConfig::default().with_discriminator_key("kind");
        let t = Transformer::with_config(Arc::new(MetadataRegistry::new()), config).unwrap();
        let schema = json!({
            "type": "compound",
            "options": {"on": {"type": "boolean"}, "level": {"type": "number"}}
        });
        let tree = t
            .build_from_schema(&schema, Some(&json!({"kind": "level", "value": 4})))
            .unwrap()
            .tree;
        assert_eq!(t.extract(&tree).unwrap(), json!({"kind": "level", "value": 4}));
    }
}
