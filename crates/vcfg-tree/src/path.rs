//! Node paths for addressing within Enhanced trees
//!
//! Provides [`NodePath`], a sequence of object keys and array indices.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// One step of a [`NodePath`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array position
    Index(usize),
}

/// Path within an Enhanced tree
///
/// A compound node is traversed transparently into its active value before
/// the next segment applies, so `tool.name` reaches `name` inside whichever
/// variant `tool` currently holds.
///
/// # Examples
/// - `["messages", 0, "content"]` → `messages[0].content`
/// - `["llm_config", "temperature"]` → `llm_config.temperature`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    /// Create new path from segments
    #[inline]
    #[must_use]
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    /// Empty path (root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of a single object key
    #[inline]
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self(vec![PathSegment::Key(key.into())])
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path is empty (root)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get parent path (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, parent)| Self(parent.to_vec()))
    }

    /// Get last segment (if not root)
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Append an object key, returning new path
    #[inline]
    #[must_use]
    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(PathSegment::Key(key.into()));
        new
    }

    /// Append an array index, returning new path
    #[inline]
    #[must_use]
    pub fn child_index(&self, index: usize) -> Self {
        let mut new = self.clone();
        new.0.push(PathSegment::Index(index));
        new
    }

    /// Check if this path is a prefix of another
    ///
    /// # Examples
    /// - `a.b` is prefix of `a.b[0]`
    /// - `a.b` is NOT prefix of `a.c`
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Check if this path is an ancestor of another (strict prefix)
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }
}

impl Display for NodePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i == 0 => write!(f, "{key}")?,
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for NodePath {
    type Err = PathError;

    /// Parse `a.b[0].c`; the empty string is the root.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut chars = s.chars().peekable();
        // true right after a '.' or at the start: a key must follow
        let mut expect_key = true;

        while let Some(&c) = chars.peek() {
            match c {
                '[' => {
                    chars.next();
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(PathError::UnclosedBracket),
                        }
                    }
                    let index = digits
                        .parse()
                        .map_err(|_| PathError::InvalidIndex(digits.clone()))?;
                    segments.push(PathSegment::Index(index));
                    expect_key = false;
                }
                '.' => {
                    if expect_key {
                        return Err(PathError::EmptySegment);
                    }
                    chars.next();
                    expect_key = true;
                    if chars.peek().is_none() {
                        return Err(PathError::EmptySegment);
                    }
                }
                ']' => return Err(PathError::InvalidSegment(s.to_owned())),
                _ => {
                    if !expect_key {
                        return Err(PathError::InvalidSegment(s.to_owned()));
                    }
                    let mut key = String::new();
                    while let Some(&k) = chars.peek() {
                        if matches!(k, '.' | '[' | ']') {
                            break;
                        }
                        key.push(k);
                        chars.next();
                    }
                    segments.push(PathSegment::Key(key));
                    expect_key = false;
                }
            }
        }

        Ok(Self(segments))
    }
}

impl From<Vec<PathSegment>> for NodePath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

/// Errors related to node paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Empty segment in path
    #[error("path contains empty segment")]
    EmptySegment,

    /// Missing `]`
    #[error("path has an unclosed '['")]
    UnclosedBracket,

    /// Bracket content is not an index
    #[error("invalid array index: {0}")]
    InvalidIndex(String),

    #[error("invalid path: {0}")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> NodePath {
        s.parse().unwrap()
    }

    #[test]
    fn parse_keys_and_indices() {
        let path = parse("messages[0].content");
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("messages".into()),
                PathSegment::Index(0),
                PathSegment::Key("content".into()),
            ]
        );
    }

    #[test]
    fn parse_root_and_bare_index() {
        assert!(parse("").is_empty());
        assert_eq!(parse("[3]").segments(), &[PathSegment::Index(3)]);
        assert_eq!(parse("a[1][2]").len(), 3);
    }

    #[test]
    fn display_round_trips() {
        for s in ["a", "a.b", "a[0]", "a[0].b", "[1].x", "a[1][2].c"] {
            assert_eq!(parse(s).to_string(), s);
        }
    }

    #[test]
    fn parse_errors() {
        assert_eq!("a..b".parse::<NodePath>(), Err(PathError::EmptySegment));
        assert_eq!(".a".parse::<NodePath>(), Err(PathError::EmptySegment));
        assert_eq!("a.".parse::<NodePath>(), Err(PathError::EmptySegment));
        assert_eq!("a[0".parse::<NodePath>(), Err(PathError::UnclosedBracket));
        assert!(matches!(
            "a[x]".parse::<NodePath>(),
            Err(PathError::InvalidIndex(_))
        ));
        assert!(matches!(
            "a[0]b".parse::<NodePath>(),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn builders_and_relations() {
        let parent = NodePath::key("messages");
        let child = parent.child_index(2).child_key("role");
        assert_eq!(child.to_string(), "messages[2].role");
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(parent.is_prefix_of(&parent));
        assert!(!parent.is_ancestor_of(&parent));
        assert_eq!(child.parent().unwrap().to_string(), "messages[2]");
        assert_eq!(child.last(), Some(&PathSegment::Key("role".into())));
        assert!(NodePath::root().parent().is_none());
    }
}
