//! Nested read model: document → group → leaf.
//!
//! # Responsibility
//! - Hold the result of a hierarchical fetch as an explicit tree.
//! - Serialize to the wire shape
//!   `{document: {"__version": "<N>", group: {leaf: value}}}`.
//!
//! # Invariants
//! - `__version` is always serialized as a decimal string.
//! - A group with zero leaves is kept; emptiness is answered by
//!   `has_content`, not by dropping nodes.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Metadata key carrying the document version in serialized output.
pub const VERSION_KEY: &str = "__version";

/// Result of a read: documents keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropsTree {
    pub documents: BTreeMap<String, DocumentNode>,
}

/// One document with its version and linked groups.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNode {
    pub version: u64,
    pub groups: BTreeMap<String, GroupNode>,
}

/// One group with its decoded leaf values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupNode {
    pub leaves: BTreeMap<String, Value>,
}

impl PropsTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the document node, creating it with `version` on first sight.
    pub fn document_mut(&mut self, name: &str, version: u64) -> &mut DocumentNode {
        self.documents
            .entry(name.to_string())
            .or_insert_with(|| DocumentNode {
                version,
                groups: BTreeMap::new(),
            })
    }

    pub fn document(&self, name: &str) -> Option<&DocumentNode> {
        self.documents.get(name)
    }

    /// True when no document was folded at all (maps to NotFound).
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// True when at least one group holds at least one leaf.
    ///
    /// A tree with documents and groups but no leaves exists yet has no
    /// content; callers report that as "no content", not as NotFound.
    pub fn has_content(&self) -> bool {
        self.documents.values().any(DocumentNode::has_content)
    }
}

impl DocumentNode {
    pub fn group_mut(&mut self, name: &str) -> &mut GroupNode {
        self.groups.entry(name.to_string()).or_default()
    }

    pub fn group(&self, name: &str) -> Option<&GroupNode> {
        self.groups.get(name)
    }

    pub fn has_content(&self) -> bool {
        self.groups.values().any(|group| !group.leaves.is_empty())
    }
}

impl GroupNode {
    pub fn leaf(&self, name: &str) -> Option<&Value> {
        self.leaves.get(name)
    }
}

impl Serialize for PropsTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.documents.len()))?;
        for (name, document) in &self.documents {
            map.serialize_entry(name, document)?;
        }
        map.end()
    }
}

impl Serialize for DocumentNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len() + 1))?;
        map.serialize_entry(VERSION_KEY, &self.version.to_string())?;
        for (name, group) in &self.groups {
            map.serialize_entry(name, group)?;
        }
        map.end()
    }
}

impl Serialize for GroupNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.leaves.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::PropsTree;
    use serde_json::json;

    #[test]
    fn serializes_version_as_string_metadata() {
        let mut tree = PropsTree::new();
        tree.document_mut("doc1", 3)
            .group_mut("cfg")
            .leaves
            .insert("a".to_string(), json!({"nested": [1, 2.5]}));

        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(
            value,
            json!({"doc1": {"__version": "3", "cfg": {"a": {"nested": [1, 2.5]}}}})
        );
    }

    #[test]
    fn empty_groups_are_kept_but_have_no_content() {
        let mut tree = PropsTree::new();
        tree.document_mut("doc1", 1).group_mut("empty");

        assert!(!tree.is_empty());
        assert!(!tree.has_content());
        let value = serde_json::to_value(&tree).unwrap();
        assert_eq!(value, json!({"doc1": {"__version": "1", "empty": {}}}));
    }

    #[test]
    fn first_version_seen_wins() {
        let mut tree = PropsTree::new();
        tree.document_mut("doc1", 4);
        tree.document_mut("doc1", 9).group_mut("g");
        assert_eq!(tree.document("doc1").unwrap().version, 4);
        assert!(tree.document("doc1").unwrap().group("g").is_some());
    }
}
