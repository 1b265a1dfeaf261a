mod broker;
mod client;
mod in_flight;
mod live_update;
mod trace_context;

pub use broker::*;
pub use client::*;
pub use in_flight::*;
pub use live_update::*;
pub use trace_context::*;
