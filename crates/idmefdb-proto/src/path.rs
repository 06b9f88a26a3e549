//! Object paths into the message tree.
//!
//! A path such as `alert.source(0).node.address(*).address` is an ordered
//! list of segments. Each segment names a child of the previous segment's
//! class and carries an index state:
//!
//! - [`PathIndex::Index`] for an explicit list position,
//! - [`PathIndex::Undefined`] for a list element addressed without a
//!   position (or with `*`),
//! - [`PathIndex::Forbidden`] for elements that are not lists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::schema::{ChildKind, IdmefClass, ValueType};

/// Index state of a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathIndex {
    /// Explicit list position.
    Index(i32),
    /// List element without a position.
    Undefined,
    /// Element is not a list.
    Forbidden,
}

impl PathIndex {
    /// Check if the segment is a list element (indexed or not).
    pub fn is_listed(&self) -> bool {
        !matches!(self, PathIndex::Forbidden)
    }
}

/// One element of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    name: String,
    class: Option<IdmefClass>,
    value_type: Option<ValueType>,
    index: PathIndex,
}

impl Segment {
    /// Element name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class of the object at this element, `None` for leaf values.
    pub fn class(&self) -> Option<IdmefClass> {
        self.class
    }

    /// Type of the leaf value, `None` for objects.
    pub fn value_type(&self) -> Option<ValueType> {
        self.value_type
    }

    /// Index state.
    pub fn index(&self) -> PathIndex {
        self.index
    }
}

/// A parsed, validated object path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Parse and validate a path against the class schema.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::path(text, "empty path"));
        }

        let mut segments: Vec<Segment> = Vec::new();

        for (depth, token) in text.split('.').enumerate() {
            let (name, index) = split_index(text, token)?;

            if depth == 0 {
                let class = IdmefClass::from_root_name(name)
                    .ok_or_else(|| Error::path(text, format!("unknown message class '{}'", name)))?;
                if index.is_some() {
                    return Err(Error::path(text, "message class cannot be indexed"));
                }
                segments.push(Segment {
                    name: name.to_string(),
                    class: Some(class),
                    value_type: None,
                    index: PathIndex::Forbidden,
                });
                continue;
            }

            let parent = segments
                .last()
                .and_then(|s| s.class)
                .ok_or_else(|| Error::path(text, format!("'{}' follows a leaf value", name)))?;

            let child = parent.child(name).ok_or_else(|| {
                Error::path(text, format!("class '{}' has no child '{}'", parent, name))
            })?;

            let index = match (child.listed, index) {
                (true, Some(index)) => index,
                (true, None) => PathIndex::Undefined,
                (false, None) => PathIndex::Forbidden,
                (false, Some(_)) => {
                    return Err(Error::path(text, format!("'{}' is not a list", name)));
                }
            };

            let (class, value_type) = match child.kind {
                ChildKind::Object(class) => (Some(class), None),
                ChildKind::Value(value_type) => (None, Some(value_type)),
            };

            segments.push(Segment {
                name: child.name.to_string(),
                class,
                value_type,
                index,
            });
        }

        Ok(Self { segments })
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// All segments in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Class of the object at `depth`, `None` for leaf values or out of range.
    pub fn class_at(&self, depth: usize) -> Option<IdmefClass> {
        self.segments.get(depth).and_then(|s| s.class)
    }

    /// Element name at `depth`.
    pub fn name_at(&self, depth: usize) -> Option<&str> {
        self.segments.get(depth).map(|s| s.name.as_str())
    }

    /// Index state at `depth`. Out of range positions are not indexable.
    pub fn index_at(&self, depth: usize) -> PathIndex {
        self.segments
            .get(depth)
            .map(|s| s.index)
            .unwrap_or(PathIndex::Forbidden)
    }

    /// Name of the last element.
    pub fn leaf_name(&self) -> &str {
        self.segments
            .last()
            .map(|s| s.name.as_str())
            .unwrap_or_default()
    }

    /// Value type of the last element, `None` if the path ends on an object.
    pub fn value_type(&self) -> Option<ValueType> {
        self.segments.last().and_then(|s| s.value_type)
    }

    /// The message class the path starts from.
    pub fn root_class(&self) -> IdmefClass {
        // parse() guarantees a message class at depth 0
        self.class_at(0).unwrap_or(IdmefClass::Alert)
    }

    /// Compare the first `n` segments, names and indexes included.
    pub fn ncompare(&self, other: &Path, n: usize) -> bool {
        if self.depth() < n || other.depth() < n {
            return false;
        }
        self.segments[..n]
            .iter()
            .zip(&other.segments[..n])
            .all(|(a, b)| a.name == b.name && a.index == b.index)
    }

    /// Full structural comparison.
    pub fn compare(&self, other: &Path) -> bool {
        self.depth() == other.depth() && self.ncompare(other, self.depth())
    }
}

fn split_index<'a>(path: &str, token: &'a str) -> Result<(&'a str, Option<PathIndex>), Error> {
    let Some(open) = token.find('(') else {
        if token.is_empty() {
            return Err(Error::path(path, "empty element"));
        }
        return Ok((token, None));
    };

    if !token.ends_with(')') {
        return Err(Error::path(path, format!("unterminated index in '{}'", token)));
    }

    let name = &token[..open];
    let inner = token[open + 1..token.len() - 1].trim();

    if name.is_empty() {
        return Err(Error::path(path, "empty element"));
    }

    if inner == "*" {
        return Ok((name, Some(PathIndex::Undefined)));
    }

    let index: i32 = inner
        .parse()
        .map_err(|_| Error::path(path, format!("invalid index '{}'", inner)))?;
    if index < -1 {
        return Err(Error::path(path, format!("invalid index '{}'", index)));
    }

    Ok((name, Some(PathIndex::Index(index))))
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.name)?;
            if let PathIndex::Index(index) = segment.index {
                write!(f, "({})", index)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Path::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let path = Path::parse("alert.classification.text").unwrap();
        assert_eq!(path.depth(), 3);
        assert_eq!(path.class_at(0), Some(IdmefClass::Alert));
        assert_eq!(path.class_at(1), Some(IdmefClass::Classification));
        assert_eq!(path.class_at(2), None);
        assert_eq!(path.leaf_name(), "text");
        assert_eq!(path.value_type(), Some(ValueType::String));
    }

    #[test]
    fn test_parse_indexes() {
        let path = Path::parse("alert.source(0).node.address(*).address").unwrap();
        assert_eq!(path.depth(), 5);
        assert_eq!(path.index_at(0), PathIndex::Forbidden);
        assert_eq!(path.index_at(1), PathIndex::Index(0));
        assert_eq!(path.index_at(2), PathIndex::Forbidden);
        assert_eq!(path.index_at(3), PathIndex::Undefined);
        assert_eq!(path.index_at(4), PathIndex::Forbidden);
        assert_eq!(path.index_at(42), PathIndex::Forbidden);
    }

    #[test]
    fn test_listed_without_index_is_undefined() {
        let path = Path::parse("alert.target.file.name").unwrap();
        assert_eq!(path.index_at(1), PathIndex::Undefined);
        assert_eq!(path.index_at(2), PathIndex::Undefined);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Path::parse("").is_err());
        assert!(Path::parse("foo.bar").is_err());
        assert!(Path::parse("alert.nosuchfield").is_err());
        assert!(Path::parse("alert.classification(0).text").is_err());
        assert!(Path::parse("alert.classification.text.more").is_err());
        assert!(Path::parse("alert.source(abc).ident").is_err());
        assert!(Path::parse("alert.source(0.ident").is_err());
        assert!(Path::parse("alert..messageid").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let text = "alert.source(0).node.address(1).address";
        let path = Path::parse(text).unwrap();
        assert_eq!(path.to_string(), text);

        let path = Path::parse("alert.source(*).ident").unwrap();
        assert_eq!(path.to_string(), "alert.source.ident");
    }

    #[test]
    fn test_compare() {
        let a = Path::parse("alert.source(0).node.name").unwrap();
        let b = Path::parse("alert.source(0).node.name").unwrap();
        let c = Path::parse("alert.source(1).node.name").unwrap();
        let d = Path::parse("alert.source(0).node.location").unwrap();

        assert!(a.compare(&b));
        assert!(!a.compare(&c));
        assert!(!a.compare(&d));
        assert!(a.ncompare(&d, 3));
        assert!(!a.ncompare(&c, 3));
    }

    #[test]
    fn test_serde_as_string() {
        let path = Path::parse("heartbeat.analyzer(0).name").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"heartbeat.analyzer(0).name\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
