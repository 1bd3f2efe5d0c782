//! Error types for metadata normalization and registry access

use crate::hash::{HashError, MetadataHash};

/// Lookup of an unregistered hash or an unknown compound variant
///
/// Indicates a caller bug such as a stale hash kept across a schema refresh.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataNotFoundError {
    /// Hash is not registered
    #[error("metadata not registered: {0}")]
    Hash(MetadataHash),

    /// Compound metadata has no option with this key
    #[error("compound {hash} has no variant '{key}'")]
    Variant { hash: MetadataHash, key: String },
}

/// Registry write and import failures
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A referenced child is missing
    #[error(transparent)]
    MetadataNotFound(#[from] MetadataNotFoundError),

    /// Hash already bound to different content
    #[error("hash {0} is already bound to different metadata")]
    Conflict(MetadataHash),

    /// Imported entry does not hash to its key
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: MetadataHash,
        actual: MetadataHash,
    },

    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}

/// Malformed or incomplete schema
///
/// `path` is the location inside the raw schema, e.g. `/properties/messages/items`.
#[derive(Debug, thiserror::Error)]
pub enum SchemaNormalizationError {
    #[error("schema at '{path}' is not an object")]
    NotAnObject { path: String },

    #[error("schema at '{path}' declares no type")]
    MissingType { path: String },

    #[error("schema at '{path}' has unknown type '{found}'")]
    UnknownType { path: String, found: String },

    #[error("array schema at '{path}' has no item schema")]
    MissingItemSchema { path: String },

    #[error("compound schema at '{path}' has no options")]
    EmptyCompound { path: String },

    #[error("compound schema at '{path}' declares variant '{key}' twice")]
    DuplicateVariant { path: String, key: String },

    #[error("number schema at '{path}' has min {min} greater than max {max}")]
    InvalidBounds { path: String, min: f64, max: f64 },

    #[error("array schema at '{path}' has minItems {min} greater than maxItems {max}")]
    InvalidItemBounds { path: String, min: usize, max: usize },

    #[error("string schema at '{path}' declares no options and forbids free-form values")]
    EmptyOptions { path: String },

    #[error("field '{field}' of schema at '{path}' must be {expected}")]
    InvalidField {
        path: String,
        field: String,
        expected: &'static str,
    },

    #[error("property '{key}' at '{path}' uses the reserved '__' prefix")]
    ReservedKey { path: String, key: String },

    #[error("schema at '{path}' exceeds the maximum depth of {max_depth}")]
    DepthExceeded { path: String, max_depth: usize },

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl SchemaNormalizationError {
    /// Schema location the error refers to, if any
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotAnObject { path }
            | Self::MissingType { path }
            | Self::UnknownType { path, .. }
            | Self::MissingItemSchema { path }
            | Self::EmptyCompound { path }
            | Self::DuplicateVariant { path, .. }
            | Self::InvalidBounds { path, .. }
            | Self::InvalidItemBounds { path, .. }
            | Self::EmptyOptions { path }
            | Self::InvalidField { path, .. }
            | Self::ReservedKey { path, .. }
            | Self::DepthExceeded { path, .. } => Some(path),
            Self::Registry(_) => None,
        }
    }
}
