use crate::fields::parse_or_default;
use crate::node::KeyValue;
use crate::record::{decode_extended, Extended, GenericSection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub billing_type: i8,
    pub license_type: i8,
    pub status: i8,
    pub app_ids: Vec<u32>,
    pub depot_ids: Vec<u32>,
    pub app_items: BTreeMap<String, String>,
    pub extended: Extended,
    pub unknown: Vec<GenericSection>,
}

pub fn decode_package(root: &KeyValue) -> PackageInfo {
    let mut package = PackageInfo::default();

    for section in root.children() {
        match section.name.as_str() {
            "packageid" => {}
            "billingtype" => package.billing_type = parse_or_default(section, "package"),
            "licensetype" => package.license_type = parse_or_default(section, "package"),
            "status" => package.status = parse_or_default(section, "package"),
            "appids" => package.app_ids = id_list(section),
            "depotids" => package.depot_ids = id_list(section),
            "appitems" => {
                // Only entries with exactly one child carry an item.
                package.app_items = section
                    .children()
                    .iter()
                    .filter_map(|item| match item.children() {
                        [only] => Some((item.name.clone(), only.to_interchange_string())),
                        _ => None,
                    })
                    .collect();
            }
            "extended" => package.extended = decode_extended(section),
            other => {
                warn!(section = other, "unrecognized package section kept as generic");
                package.unknown.push(GenericSection::from_node(section));
            }
        }
    }

    package
}

fn id_list(section: &KeyValue) -> Vec<u32> {
    section
        .children()
        .iter()
        .map(|id| parse_or_default(id, "package"))
        .collect()
}
