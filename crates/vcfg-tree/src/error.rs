//! Error types for tree construction, editing and extraction

use vcfg_metadata::{MetadataNotFoundError, SchemaNormalizationError};

use crate::path::{NodePath, PathError};

/// A value's runtime shape disagrees with the declared metadata
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("type mismatch at '{path}': expected {expected}, found {found}")]
pub struct TypeMismatchError {
    /// Location of the offending node
    pub path: NodePath,
    /// Declared shape
    pub expected: String,
    /// Runtime shape
    pub found: String,
}

impl TypeMismatchError {
    /// Create new type mismatch
    #[must_use]
    pub fn new(path: NodePath, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self {
            path,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Main tree error type
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Unknown metadata hash or compound variant
    #[error(transparent)]
    MetadataNotFound(#[from] MetadataNotFoundError),

    /// Schema could not be normalized
    #[error("schema error: {0}")]
    Schema(#[from] SchemaNormalizationError),

    /// Value disagrees with metadata
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatchError),

    /// Key is fixed by the schema or the object is closed
    #[error("key '{key}' of object at '{path}' cannot be renamed")]
    KeyNotRenamable { path: NodePath, key: String },

    /// Rename target is taken or reserved
    #[error("key '{key}' is not available in object at '{path}'")]
    KeyConflict { path: NodePath, key: String },

    /// Path does not resolve to a node
    #[error("path not found: '{0}'")]
    PathNotFound(NodePath),

    /// Array index past the end
    #[error("index {index} out of bounds for array of length {len} at '{path}'")]
    IndexOutOfBounds {
        path: NodePath,
        index: usize,
        len: usize,
    },

    /// Malformed path string
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
}

impl TreeError {
    /// Errors that signal an edit disagreeing with the declared shape
    #[inline]
    #[must_use]
    pub fn is_type_mismatch(&self) -> bool {
        matches!(
            self,
            Self::TypeMismatch(_) | Self::KeyNotRenamable { .. } | Self::KeyConflict { .. }
        )
    }

    /// Errors caused by a stale hash or unknown variant
    #[inline]
    #[must_use]
    pub fn is_metadata_not_found(&self) -> bool {
        matches!(self, Self::MetadataNotFound(_))
    }

    pub(crate) fn mismatch(
        path: &NodePath,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch(TypeMismatchError::new(path.clone(), expected, found))
    }
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
