use crate::fields::{parse_text_or_default, text, unknown_field};
use crate::node::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened `config` section; nested values are JSON text.
pub type Config = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchItem {
    pub order: u32,
    pub executable: String,
    pub arguments: String,
    pub description: String,
    #[serde(rename = "type")]
    pub launch_type: String,
    pub os_list: String,
    pub os_arch: String,
    pub beta_key: String,
    pub working_dir: String,
    pub vac_module_filename: String,
    pub vr_mode: String,
    pub owns_dlcs: Vec<String>,
}

/// Splits the `config` section into its flat map and the typed `launch` entries.
pub fn decode_config(node: &KeyValue) -> (Config, Vec<LaunchItem>) {
    let mut config = Config::new();
    let mut launch = Vec::new();

    for child in node.children() {
        if child.name == "launch" {
            launch = decode_launch(child);
        } else {
            config.insert(child.name.clone(), text(child));
        }
    }

    (config, launch)
}

/// Each child of `launch` is one entry keyed by its order.
pub fn decode_launch(node: &KeyValue) -> Vec<LaunchItem> {
    node.children()
        .iter()
        .map(|entry| {
            let mut item = LaunchItem {
                order: parse_text_or_default(&entry.name, "order", "launch"),
                ..Default::default()
            };
            fill_launch_item(entry, &mut item);
            item
        })
        .collect()
}

// A nested `config` block carries more fields of the same entry.
fn fill_launch_item(node: &KeyValue, item: &mut LaunchItem) {
    for field in node.children() {
        match field.name.as_str() {
            "executable" => item.executable = text(field),
            "arguments" => item.arguments = text(field),
            "description" => item.description = text(field),
            "type" => item.launch_type = text(field),
            "oslist" => item.os_list = text(field),
            "osarch" => item.os_arch = text(field),
            "betakey" => item.beta_key = text(field),
            "vacmodulefilename" => item.vac_module_filename = text(field),
            "workingdir" => item.working_dir = text(field),
            "vrmode" => item.vr_mode = text(field),
            "ownsdlc" => item.owns_dlcs = split_dlcs(field.as_str().unwrap_or_default()),
            "config" => fill_launch_item(field, item),
            _ => unknown_field("launch", field),
        }
    }
}

fn split_dlcs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|dlc| !dlc.is_empty())
        .map(str::to_string)
        .collect()
}
