use crate::fields::{flag, parse_or_default, text, unknown_field};
use crate::node::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depots {
    pub depots: Vec<DepotDescriptor>,
    pub branches: Vec<BranchDescriptor>,
    /// Depot-level keys that are not depot ids, scalar verbatim or nested as JSON.
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotDescriptor {
    pub id: u32,
    pub name: String,
    pub configs: BTreeMap<String, String>,
    /// Branch name to manifest id.
    pub manifests: BTreeMap<String, String>,
    /// Encrypted manifests, kept as JSON text.
    pub encrypted_manifests: String,
    pub max_size: u64,
    pub dlc_app_id: u32,
    pub depot_from_app: u32,
    pub system_defined: bool,
    pub optional: bool,
    pub shared_install: bool,
    pub shared_depot_type: bool,
    pub lv_cache: bool,
    pub allow_add_remove_while_running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchDescriptor {
    pub name: String,
    pub description: String,
    pub build_id: u32,
    pub time_updated: i64,
    pub password_required: bool,
    pub lcs_required: bool,
    pub default_for_subs: String,
    pub unlock_for_subs: String,
}

/// Decodes the `depots` section of an app.
pub fn decode_depots(node: &KeyValue) -> Depots {
    let mut depots = Depots::default();

    for child in node.children() {
        if child.name == "branches" {
            depots.branches = decode_branches(child);
            continue;
        }

        match child.name.parse::<u32>() {
            Ok(id) => depots.depots.push(decode_depot(id, child)),
            Err(_) => {
                depots.extra.insert(child.name.clone(), text(child));
            }
        }
    }

    depots
}

fn decode_depot(id: u32, node: &KeyValue) -> DepotDescriptor {
    let mut depot = DepotDescriptor {
        id,
        ..Default::default()
    };

    for field in node.children() {
        match field.name.as_str() {
            "name" => depot.name = text(field),
            "config" => depot.configs = field.children_as_map(),
            "manifests" => depot.manifests = field.children_as_map(),
            "encryptedmanifests" => depot.encrypted_manifests = field.to_nested_json().to_string(),
            "maxsize" => depot.max_size = parse_or_default(field, "depots"),
            "dlcappid" => depot.dlc_app_id = parse_or_default(field, "depots"),
            "depotfromapp" => depot.depot_from_app = parse_or_default(field, "depots"),
            "systemdefined" => depot.system_defined = flag(field),
            "optional" => depot.optional = flag(field),
            "sharedinstall" => depot.shared_install = flag(field),
            "shareddepottype" => depot.shared_depot_type = flag(field),
            "lvcache" => depot.lv_cache = flag(field),
            "allowaddremovewhilerunning" => depot.allow_add_remove_while_running = flag(field),
            _ => unknown_field("depots", field),
        }
    }

    depot
}

/// Decodes `depots.branches`; each child is one branch named by its key.
pub fn decode_branches(node: &KeyValue) -> Vec<BranchDescriptor> {
    node.children()
        .iter()
        .map(|branch_node| {
            let mut branch = BranchDescriptor {
                name: branch_node.name.clone(),
                ..Default::default()
            };

            for field in branch_node.children() {
                match field.name.as_str() {
                    "buildid" => branch.build_id = parse_or_default(field, "branches"),
                    "timeupdated" => branch.time_updated = parse_or_default(field, "branches"),
                    "defaultforsubs" => branch.default_for_subs = text(field),
                    "unlockforsubs" => branch.unlock_for_subs = text(field),
                    "description" => branch.description = text(field),
                    "pwdrequired" => branch.password_required = flag(field),
                    "lcsrequired" => branch.lcs_required = flag(field),
                    _ => unknown_field("branches", field),
                }
            }

            branch
        })
        .collect()
}
