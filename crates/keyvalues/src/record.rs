use crate::depots::{decode_branches, decode_depots, BranchDescriptor, Depots};
use crate::fields::text;
use crate::launch::{decode_config, decode_launch, Config, LaunchItem};
use crate::node::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Flattened `extended` section; nested values are JSON text.
pub type Extended = BTreeMap<String, String>;

/// A typed section produced by [`decode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Depots(Depots),
    Branches(Vec<BranchDescriptor>),
    Launch(Vec<LaunchItem>),
    Extended(Extended),
    Config { config: Config, launch: Vec<LaunchItem> },
    /// A section without a dedicated decoder, kept as nested JSON.
    Generic(GenericSection),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericSection {
    pub name: String,
    pub value: serde_json::Value,
}

impl GenericSection {
    pub fn from_node(node: &KeyValue) -> Self {
        Self {
            name: node.name.clone(),
            value: node.to_nested_json(),
        }
    }
}

/// Decodes a section by its name. Pure: the same tree always yields an equal record.
pub fn decode(node: &KeyValue) -> Record {
    match node.name.as_str() {
        "depots" => Record::Depots(decode_depots(node)),
        "branches" => Record::Branches(decode_branches(node)),
        "launch" => Record::Launch(decode_launch(node)),
        "extended" => Record::Extended(decode_extended(node)),
        "config" => {
            let (config, launch) = decode_config(node);
            Record::Config { config, launch }
        }
        other => {
            warn!(section = other, "unrecognized section kept as generic");
            Record::Generic(GenericSection::from_node(node))
        }
    }
}

pub fn decode_extended(node: &KeyValue) -> Extended {
    node.children()
        .iter()
        .map(|child| (child.name.clone(), text(child)))
        .collect()
}
