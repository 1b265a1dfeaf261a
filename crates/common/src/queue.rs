mod delay;
mod middleware;
mod reconnect;
mod registry;
mod retry;
mod runtime;
mod types;

pub use delay::*;
pub use middleware::*;
pub use reconnect::*;
pub use registry::*;
pub use retry::*;
pub use runtime::*;
pub use types::*;
