use crate::depots::{decode_depots, Depots};
use crate::fields::{flag, parse_text_or_default, text};
use crate::launch::{decode_config, Config, LaunchItem};
use crate::node::KeyValue;
use crate::record::{decode_extended, Extended, GenericSection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Everything the product-info tree of an app carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: Option<String>,
    pub common: BTreeMap<String, String>,
    pub store_tags: Vec<i32>,
    pub extended: Extended,
    pub config: Config,
    pub launch: Vec<LaunchItem>,
    pub depots: Depots,
    pub public_only: bool,
    pub ufs: BTreeMap<String, String>,
    pub install: Option<serde_json::Value>,
    pub localization: Option<serde_json::Value>,
    pub system_requirements: Option<serde_json::Value>,
    pub unknown: Vec<GenericSection>,
}

/// Decodes an app tree. Unknown top-level sections are logged and kept as generic JSON.
pub fn decode_app(root: &KeyValue) -> AppInfo {
    let mut app = AppInfo::default();

    for section in root.children() {
        match section.name.as_str() {
            "appid" => {}
            "common" => decode_common(section, &mut app),
            "extended" => app.extended = decode_extended(section),
            "config" => {
                let (config, launch) = decode_config(section);
                app.config = config;
                app.launch = launch;
            }
            "depots" => app.depots = decode_depots(section),
            "public_only" => app.public_only = flag(section),
            "ufs" => app.ufs = section.children_as_map(),
            "install" => app.install = Some(section.to_nested_json()),
            "localization" => app.localization = Some(section.to_nested_json()),
            "sysreqs" => app.system_requirements = Some(section.to_nested_json()),
            other => {
                warn!(section = other, "unrecognized app section kept as generic");
                app.unknown.push(GenericSection::from_node(section));
            }
        }
    }

    app
}

fn decode_common(section: &KeyValue, app: &mut AppInfo) {
    for field in section.children() {
        match field.name.as_str() {
            "store_tags" => {
                app.store_tags = field
                    .children_as_slice()
                    .iter()
                    .map(|tag| parse_text_or_default(tag, "store_tags", "common"))
                    .collect();
            }
            "name" => app.name = Some(text(field)),
            _ => {}
        }
        app.common.insert(field.name.clone(), text(field));
    }
}
