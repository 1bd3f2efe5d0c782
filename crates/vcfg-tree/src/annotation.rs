//! Non-fatal build diagnostics
//!
//! The builder never rejects a value because of its content. Anything it
//! had to repair, and any constraint the result violates, is reported as
//! an [`Annotation`] so a caller can prompt for a fix.

use std::fmt::{self, Display, Formatter};

use vcfg_metadata::{ConfigMetadata, MetadataNotFoundError, MetadataRegistry};

use crate::error::TypeMismatchError;
use crate::node::{EnhancedTree, NodeValue};
use crate::path::NodePath;

/// Diagnostic attached to a node path
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub path: NodePath,
    pub kind: AnnotationKind,
}

/// Kind of diagnostic
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    /// Input had the wrong type and was replaced by the default
    Coerced { expected: String, found: String },
    /// Undeclared key dropped from a closed object
    DroppedKey { key: String },
    /// Discriminator named no known variant; the first was used
    UnknownVariant { key: String },
    MinItems { min: usize, actual: usize },
    MaxItems { max: usize, actual: usize },
    OutOfRange {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Value outside a closed set of choices
    NotInOptions { value: String },
}

impl Annotation {
    #[inline]
    #[must_use]
    pub fn new(path: NodePath, kind: AnnotationKind) -> Self {
        Self { path, kind }
    }

    /// Whether the annotation reports a violated constraint rather than a repair
    #[must_use]
    pub fn is_constraint(&self) -> bool {
        matches!(
            self.kind,
            AnnotationKind::MinItems { .. }
                | AnnotationKind::MaxItems { .. }
                | AnnotationKind::OutOfRange { .. }
                | AnnotationKind::NotInOptions { .. }
        )
    }

    /// The repair as a type mismatch; `None` for constraint violations
    #[must_use]
    pub fn into_mismatch(self) -> Option<TypeMismatchError> {
        let (path, expected, found) = match self.kind {
            AnnotationKind::Coerced { expected, found } => (self.path, expected, found),
            AnnotationKind::DroppedKey { key } => {
                (self.path.child_key(key), "no field".to_owned(), "undeclared key".to_owned())
            }
            AnnotationKind::UnknownVariant { key } => {
                (self.path, "a declared variant".to_owned(), format!("variant '{key}'"))
            }
            _ => return None,
        };
        Some(TypeMismatchError::new(path, expected, found))
    }
}

impl Display for Annotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<root>".to_owned()
        } else {
            self.path.to_string()
        };
        match &self.kind {
            AnnotationKind::Coerced { expected, found } => {
                write!(f, "{path}: expected {expected}, found {found}; using default")
            }
            AnnotationKind::DroppedKey { key } => write!(f, "{path}: dropped undeclared key '{key}'"),
            AnnotationKind::UnknownVariant { key } => {
                write!(f, "{path}: unknown variant '{key}'; using first option")
            }
            AnnotationKind::MinItems { min, actual } => {
                write!(f, "{path}: {actual} items, at least {min} required")
            }
            AnnotationKind::MaxItems { max, actual } => {
                write!(f, "{path}: {actual} items, at most {max} allowed")
            }
            AnnotationKind::OutOfRange { value, min, max } => {
                write!(f, "{path}: {value} outside [")?;
                match min {
                    Some(min) => write!(f, "{min}")?,
                    None => f.write_str("-inf")?,
                }
                f.write_str(", ")?;
                match max {
                    Some(max) => write!(f, "{max}]"),
                    None => f.write_str("inf]"),
                }
            }
            AnnotationKind::NotInOptions { value } => {
                write!(f, "{path}: '{value}' is not one of the declared options")
            }
        }
    }
}

/// Check every node of `tree` against its metadata constraints
///
/// # Errors
/// Returns [`MetadataNotFoundError`] if a node's hash is not registered
pub fn collect_constraints(
    registry: &MetadataRegistry,
    tree: &EnhancedTree,
) -> Result<Vec<Annotation>, MetadataNotFoundError> {
    let mut annotations = Vec::new();
    let mut missing = None;

    tree.visit(|path, node| {
        if missing.is_some() {
            return;
        }
        let metadata = match registry.get(&node.metadata_hash()) {
            Ok(metadata) => metadata,
            Err(err) => {
                missing = Some(err);
                return;
            }
        };
        let kind = match (&*metadata, node.value()) {
            (ConfigMetadata::Array(m), NodeValue::Array(items)) => {
                let actual = items.len();
                match (m.min_items, m.max_items) {
                    (Some(min), _) if actual < min => Some(AnnotationKind::MinItems { min, actual }),
                    (_, Some(max)) if actual > max => Some(AnnotationKind::MaxItems { max, actual }),
                    _ => None,
                }
            }
            (ConfigMetadata::Number(m), NodeValue::Number(n)) => n
                .as_f64()
                .filter(|value| !m.in_range(*value))
                .map(|value| AnnotationKind::OutOfRange {
                    value,
                    min: m.min,
                    max: m.max,
                }),
            (ConfigMetadata::String(m), NodeValue::String(s)) if !m.accepts(s) => {
                Some(AnnotationKind::NotInOptions { value: s.clone() })
            }
            _ => None,
        };
        if let Some(kind) = kind {
            annotations.push(Annotation::new(path.clone(), kind));
        }
    });

    match missing {
        Some(err) => Err(err),
        None => Ok(annotations),
    }
}

/// Tree produced by a build, with its diagnostics
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub tree: EnhancedTree,
    pub annotations: Vec<Annotation>,
}

impl BuildOutput {
    /// Whether the build needed no repairs and violates no constraint
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.annotations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats() {
        let annotation = Annotation::new(
            "llm.temperature".parse().unwrap(),
            AnnotationKind::OutOfRange {
                value: 2.5,
                min: Some(0.0),
                max: Some(2.0),
            },
        );
        assert_eq!(annotation.to_string(), "llm.temperature: 2.5 outside [0, 2]");
        assert!(annotation.is_constraint());

        let dropped = Annotation::new(
            NodePath::root(),
            AnnotationKind::DroppedKey { key: "kind".into() },
        );
        assert_eq!(dropped.to_string(), "<root>: dropped undeclared key 'kind'");
        assert!(!dropped.is_constraint());
        assert!(annotation.into_mismatch().is_none());

        let mismatch = dropped.into_mismatch().unwrap();
        assert_eq!(mismatch.path.to_string(), "kind");
        assert_eq!(mismatch.found, "undeclared key");

        let coerced = Annotation::new(
            "stop[0]".parse().unwrap(),
            AnnotationKind::Coerced {
                expected: "string".into(),
                found: "number".into(),
            },
        );
        assert_eq!(
            coerced.into_mismatch(),
            Some(TypeMismatchError::new("stop[0]".parse().unwrap(), "string", "number"))
        );
    }
}
