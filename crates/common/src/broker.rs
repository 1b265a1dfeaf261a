mod envelope;
#[cfg(any(test, feature = "testing"))]
mod in_memory;
mod traits;

pub use envelope::*;
#[cfg(any(test, feature = "testing"))]
pub use in_memory::*;
pub use traits::*;
