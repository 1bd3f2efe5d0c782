//! VCFG Tree
//!
//! Identity-stable value trees over registered configuration metadata.
//!
//! # Core Concepts
//!
//! - [`EnhancedTree`]: immutable tree of [`EnhancedNode`]s, each carrying a
//!   stable [`NodeId`] and the hash of its metadata
//! - [`Transformer`]: builds trees from plain JSON, extracts them back and
//!   applies structural edits copy-on-write
//! - [`TreeDiff`]: semantic comparison that ignores node ids
//! - [`VariantSession`]: working copy with dirty tracking, commit and discard
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use vcfg_metadata::MetadataRegistry;
//! use vcfg_tree::{NodePath, Transformer};
//!
//! let transformer = Transformer::new(Arc::new(MetadataRegistry::new()));
//! let schema = json!({
//!     "type": "object",
//!     "properties": {
//!         "model": {"type": "string"},
//!         "temperature": {"type": "number", "min": 0, "max": 2}
//!     }
//! });
//!
//! let output = transformer
//!     .build_from_schema(&schema, Some(&json!({"model": "m1"})))
//!     .unwrap();
//! assert!(output.is_clean());
//!
//! let edited = transformer
//!     .set_leaf_value(&output.tree, &NodePath::key("temperature"), json!(0.5))
//!     .unwrap();
//! assert_eq!(
//!     transformer.extract(&edited).unwrap(),
//!     json!({"model": "m1", "temperature": 0.5})
//! );
//! assert!(transformer.diff(&output.tree, &edited).changed);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod annotation;
mod builder;
mod config;
mod defaults;
mod diff;
mod error;
mod extract;
mod id;
mod mutation;
mod node;
mod observer;
mod path;
mod session;
mod transformer;

pub use annotation::{collect_constraints, Annotation, AnnotationKind, BuildOutput};
pub use config::TransformerConfig;
pub use defaults::fill_defaults;
pub use diff::{diff_trees, TreeDiff};
pub use error::{ConfigError, TreeError, TypeMismatchError};
pub use extract::extract_node;
pub use id::NodeId;
pub use mutation::TreeDraft;
pub use node::{
    CompoundValue, EnhancedNode, EnhancedTree, NodeValue, ObjectEntry, Resolved, ID_KEY,
    METADATA_KEY, VARIANT_VALUE_KEY,
};
pub use observer::{changed_nodes, ChangeBus, ChangeKind, NodeChange, SubscriptionId};
pub use path::{NodePath, PathError, PathSegment};
pub use session::VariantSession;
pub use transformer::Transformer;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
