//! Mutation inputs accepted from the boundary layer.
//!
//! Request bodies arrive as JSON. Older clients send `collection(s)` and
//! `properties` instead of `group(s)` and `leaves`, send the version as a
//! string, and send a single object where a list is expected; all of that
//! is accepted here so the core only ever sees normalized values.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Leaves to merge into one group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupInput {
    #[serde(alias = "collection")]
    pub group: String,
    #[serde(default, alias = "properties")]
    pub leaves: BTreeMap<String, Value>,
}

impl GroupInput {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            leaves: BTreeMap::new(),
        }
    }

    pub fn with_leaf(mut self, name: impl Into<String>, value: Value) -> Self {
        self.leaves.insert(name.into(), value);
        self
    }
}

/// Leaves to remove from one group; an empty list removes the group link.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupDeletion {
    #[serde(alias = "collection")]
    pub group: String,
    #[serde(default, alias = "properties")]
    pub leaves: Vec<String>,
}

impl GroupDeletion {
    pub fn whole_group(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            leaves: Vec::new(),
        }
    }

    pub fn leaves<I, S>(group: impl Into<String>, leaves: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            group: group.into(),
            leaves: leaves.into_iter().map(Into::into).collect(),
        }
    }
}

/// Body of a set-properties request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetRequest {
    #[serde(default, deserialize_with = "version_from_number_or_string")]
    pub version: u64,
    #[serde(default, alias = "collections", deserialize_with = "one_or_many")]
    pub groups: Vec<GroupInput>,
}

/// Body of a delete-group request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VersionRequest {
    #[serde(default, deserialize_with = "version_from_number_or_string")]
    pub version: u64,
}

/// Body of a delete-properties-or-document request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteRequest {
    #[serde(default, deserialize_with = "version_from_number_or_string")]
    pub version: u64,
    #[serde(default, alias = "collections", deserialize_with = "one_or_many")]
    pub groups: Vec<GroupDeletion>,
    #[serde(default, rename = "deleteDocument", alias = "delete_document")]
    pub delete_document: bool,
}

/// Normalizes a group filter: splits comma-joined entries, trims, drops
/// blanks, removes duplicates. Returns names in sorted order.
pub fn normalize_group_filter<S: AsRef<str>>(filter: &[S]) -> Vec<String> {
    let mut unique = BTreeSet::new();
    for entry in filter {
        for name in entry.as_ref().split(',') {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                unique.insert(trimmed.to_string());
            }
        }
    }
    unique.into_iter().collect()
}

fn version_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct VersionVisitor;

    impl Visitor<'_> for VersionVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a non-negative integer or a decimal string")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| E::custom(format!("negative version {value}")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value
                .trim()
                .parse::<u64>()
                .map_err(|err| E::custom(format!("invalid version string {value:?}: {err}")))
        }
    }

    // Through `Value` so the same path works with arbitrary-precision numbers.
    match Value::deserialize(deserializer)? {
        Value::Number(number) => {
            if let Some(value) = number.as_u64() {
                VersionVisitor.visit_u64(value)
            } else if let Some(value) = number.as_i64() {
                VersionVisitor.visit_i64(value)
            } else {
                Err(de::Error::custom(format!("invalid version number {number}")))
            }
        }
        Value::String(text) => VersionVisitor.visit_str(&text),
        Value::Null => Ok(0),
        other => Err(de::Error::invalid_type(
            de::Unexpected::Other(json_kind(&other)),
            &VersionVisitor,
        )),
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(de::Error::custom))
            .collect(),
        single => serde_json::from_value(single)
            .map(|item| vec![item])
            .map_err(de::Error::custom),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
