//! VCFG Metadata
//!
//! Canonical, content-addressed descriptions of configurable parameters.
//!
//! # Core Concepts
//!
//! - [`ConfigMetadata`]: closed sum type over the six field shapes
//! - [`ContentHash`]: 32-byte Blake3 digest of a node's canonical form
//! - [`MetadataRegistry`]: write-once, deduplicating store keyed by hash
//! - [`SchemaNormalizer`]: raw schema JSON → registered metadata
//!
//! # Example
//!
//! ```rust
//! use vcfg_metadata::{ConfigMetadata, MetadataRegistry, SchemaNormalizer};
//! use serde_json::json;
//!
//! let registry = MetadataRegistry::new();
//! let schema = json!({
//!     "type": "object",
//!     "properties": {"temperature": {"type": "number", "min": 0, "max": 2}}
//! });
//! let normalized = SchemaNormalizer::new(&registry).normalize(&schema).unwrap();
//! assert!(matches!(&*normalized.metadata, ConfigMetadata::Object(_)));
//! assert_eq!(normalized.hash.to_string().len(), 64);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod canonical;
mod error;
mod hash;
mod metadata;
mod normalize;
mod registry;

pub use canonical::canonical_json;
pub use error::{MetadataNotFoundError, RegistryError, SchemaNormalizationError};
pub use hash::{ContentHash, HashError, MetadataHash};
pub use metadata::{
    is_bookkeeping_key, ArrayMetadata, BooleanMetadata, CommonMetadata, CompoundMetadata,
    CompoundOption, ConfigMetadata, NumberMetadata, ObjectMetadata, ShapeTag, StringMetadata,
    BOOKKEEPING_PREFIX,
};
pub use normalize::{Normalized, SchemaNormalizer, DEFAULT_MAX_DEPTH};
pub use registry::MetadataRegistry;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
