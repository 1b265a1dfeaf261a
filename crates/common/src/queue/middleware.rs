mod consume_logging;
mod consume_tracing;

pub use consume_logging::*;
pub use consume_tracing::*;
