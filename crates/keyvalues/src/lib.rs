//! Decoder for the catalog's recursive key/value product-info format.
//!
//! Decoding never fails on field level: unparsable scalars are logged and defaulted,
//! unknown sections are logged and preserved as JSON. No I/O, no shared state.

mod app;
mod depots;
mod error;
mod fields;
mod launch;
mod node;
mod package;
mod record;

pub use app::{decode_app, AppInfo};
pub use depots::{decode_branches, decode_depots, BranchDescriptor, DepotDescriptor, Depots};
pub use error::{KeyValueError, Result};
pub use launch::{decode_config, decode_launch, Config, LaunchItem};
pub use node::{KeyValue, Value};
pub use package::{decode_package, PackageInfo};
pub use record::{decode, decode_extended, Extended, GenericSection, Record};
