use crate::error::{KeyValueError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A node of the upstream product-info tree.
///
/// The wire form is `{"Name": .., "Value": .., "Children": [..]}` where `Value` and
/// `Children` are meant to be mutually exclusive. A present scalar wins; anything else
/// is a branch, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireKeyValue", into = "WireKeyValue")]
pub struct KeyValue {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Leaf(String),
    Branch(Vec<KeyValue>),
}

impl KeyValue {
    pub fn leaf(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Value::Leaf(value.into()),
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<KeyValue>) -> Self {
        Self {
            name: name.into(),
            value: Value::Branch(children),
        }
    }

    /// Parses a tree from its JSON wire form.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Leaf(value) => Some(value),
            Value::Branch(_) => None,
        }
    }

    /// Children of a branch; a leaf has none.
    pub fn children(&self) -> &[KeyValue] {
        match &self.value {
            Value::Leaf(_) => &[],
            Value::Branch(children) => children,
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.value, Value::Branch(_))
    }

    /// Last child with the given name.
    pub fn get(&self, name: &str) -> Option<&KeyValue> {
        self.children().iter().rev().find(|child| child.name == name)
    }

    /// Fails when the node is a scalar, for callers that need a subtree.
    pub fn require_branch(&self) -> Result<&[KeyValue]> {
        match &self.value {
            Value::Leaf(_) => Err(KeyValueError::ExpectedBranch(self.name.clone())),
            Value::Branch(children) => Ok(children),
        }
    }

    /// Ordered scalar list from the children, names ignored.
    ///
    /// A nested child is kept in its interchange form.
    pub fn children_as_slice(&self) -> Vec<String> {
        self.children()
            .iter()
            .map(KeyValue::to_interchange_string)
            .collect()
    }

    /// Flat string map keyed by child name. Duplicate names: last write wins.
    pub fn children_as_map(&self) -> BTreeMap<String, String> {
        self.children()
            .iter()
            .map(|child| (child.name.clone(), child.to_interchange_string()))
            .collect()
    }

    /// Nested JSON object view of a branch; a leaf is a JSON string.
    pub fn to_nested_json(&self) -> serde_json::Value {
        match &self.value {
            Value::Leaf(value) => serde_json::Value::String(value.clone()),
            Value::Branch(children) => {
                let mut map = serde_json::Map::new();
                for child in children {
                    map.insert(child.name.clone(), child.to_nested_json());
                }
                serde_json::Value::Object(map)
            }
        }
    }

    /// The scalar verbatim, or the nested structure re-serialized as JSON text.
    pub fn to_interchange_string(&self) -> String {
        match &self.value {
            Value::Leaf(value) => value.clone(),
            Value::Branch(_) => self.to_nested_json().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireKeyValue {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Value", default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(rename = "Children", default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<WireKeyValue>>,
}

impl From<WireKeyValue> for KeyValue {
    fn from(wire: WireKeyValue) -> Self {
        let scalar = match wire.value {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(value)) => Some(value),
            Some(other) => Some(other.to_string()),
        };

        match scalar {
            Some(value) => KeyValue::leaf(wire.name, value),
            None => KeyValue::branch(
                wire.name,
                wire.children
                    .unwrap_or_default()
                    .into_iter()
                    .map(KeyValue::from)
                    .collect(),
            ),
        }
    }
}

impl From<KeyValue> for WireKeyValue {
    fn from(node: KeyValue) -> Self {
        match node.value {
            Value::Leaf(value) => WireKeyValue {
                name: node.name,
                value: Some(serde_json::Value::String(value)),
                children: None,
            },
            Value::Branch(children) => WireKeyValue {
                name: node.name,
                value: None,
                children: Some(children.into_iter().map(WireKeyValue::from).collect()),
            },
        }
    }
}
